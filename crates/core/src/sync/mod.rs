//! Synchronization primitives for cooperating with a foreign UI.
//!
//! These two functions are the only sanctioned way to inspect surface state:
//! - [`wait_for_appearance`]: event driven, resolves on the first mutation
//!   batch that makes a selector match.
//! - [`wait_for_text_match`]: bounded polling for text that may change
//!   without a structural mutation.

mod wait;

pub use wait::{wait_for_appearance, wait_for_text_match, WaitError};
