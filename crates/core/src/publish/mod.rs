//! Per-target publish lifecycle.
//!
//! An [`AdapterSpec`] declares where a platform's editor keeps its fields and
//! how success shows up; a [`PublishMachine`] executes that declaration
//! against one surface and returns a [`PublishOutcome`].
//!
//! # Example
//!
//! ```ignore
//! use multipost_core::publish::{PublishMachine, TargetRef};
//!
//! let machine = PublishMachine::new(target, adapter, surface, media);
//! let outcome = machine.run(&content, true).await;
//! if let Some(reason) = outcome.failure_reason {
//!     println!("failed with {} ({})", reason, reason.code());
//! }
//! ```

mod adapter;
mod machine;
mod types;

pub use adapter::{
    ActionLocator, AdapterRegistry, AdapterSpec, FieldSpec, MediaStrategy, SuccessSignal,
};
pub use machine::{PublishMachine, TransitionCallback};
pub use types::{
    FailureReason, PublishContent, PublishOutcome, PublishState, TargetRef, TargetStatus,
};
