pub mod handlers;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod surfaces;
pub mod trust;
pub mod ws;

pub use routes::create_router;
pub use ws::{WsBroadcaster, WsMessage};
