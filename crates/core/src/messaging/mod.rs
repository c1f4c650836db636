//! Correlated request/response messaging.

mod correlation;
mod envelope;

pub use correlation::CorrelationTable;
pub use envelope::{
    Action, MessageKind, RequestEnvelope, ResponseEnvelope, CODE_BAD_REQUEST, CODE_FORBIDDEN,
    CODE_INTERNAL, CODE_OK,
};

use thiserror::Error;

/// Errors from the messaging layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MessagingError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("no response for {trace_id} within {timeout_ms}ms")]
    Timeout { trace_id: String, timeout_ms: u64 },

    #[error("channel closed before a response for {0}")]
    Disconnected(String),

    #[error("trace id already pending: {0}")]
    DuplicateTraceId(String),
}
