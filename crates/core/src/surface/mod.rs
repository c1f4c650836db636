//! Execution surface abstraction.
//!
//! A surface is one isolated, live instance of a foreign web UI (a browser
//! tab in production). The publisher never touches a foreign page except
//! through the [`Surface`] trait, which keeps the state machine and the
//! waiting primitives independent of the browser backend.

mod registry;
mod traits;
mod types;
mod webdriver;

pub use registry::{ElementRegistry, RegisteredElement};
pub use traits::{Surface, SurfaceHost};
pub use types::{ElementHandle, MutationObserver, NativeFile, PageUpload, SurfaceError};
pub use webdriver::{WebDriverHost, WebDriverSurface};
