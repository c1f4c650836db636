//! Request/response envelopes exchanged across contexts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MessagingError;

/// Response code for a handled request.
pub const CODE_OK: i32 = 0;
/// Response code for a malformed request or unknown action.
pub const CODE_BAD_REQUEST: i32 = 400;
/// Response code for a trust gate rejection.
pub const CODE_FORBIDDEN: i32 = 403;
/// Response code for an internal failure.
pub const CODE_INTERNAL: i32 = 500;

/// Discriminator carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
}

/// Actions an inbound request may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Publish,
    TrustList,
    TrustDelete,
    RequestTrust,
    Ping,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Publish => "publish",
            Action::TrustList => "trust_list",
            Action::TrustDelete => "trust_delete",
            Action::RequestTrust => "request_trust",
            Action::Ping => "ping",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publish" => Ok(Action::Publish),
            "trust_list" => Ok(Action::TrustList),
            "trust_delete" => Ok(Action::TrustDelete),
            "request_trust" => Ok(Action::RequestTrust),
            "ping" => Ok(Action::Ping),
            other => Err(MessagingError::UnknownAction(other.to_string())),
        }
    }
}

/// An inbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub trace_id: String,
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

impl RequestEnvelope {
    /// New request with a fresh trace id.
    pub fn new(action: impl Into<String>, data: Value) -> Self {
        Self {
            kind: MessageKind::Request,
            trace_id: uuid::Uuid::new_v4().to_string(),
            action: action.into(),
            data,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Parsed action name.
    pub fn parsed_action(&self) -> Result<Action, MessagingError> {
        self.action.parse()
    }

    /// Deserialize `data` into a typed payload.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, MessagingError> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| MessagingError::InvalidPayload(format!("{}: {}", self.action, e)))
    }
}

/// A response, always carrying the trace id and action of its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub trace_id: String,
    pub action: String,
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl ResponseEnvelope {
    fn build(trace_id: &str, action: &str, code: i32, message: String, data: Value) -> Self {
        Self {
            kind: MessageKind::Response,
            trace_id: trace_id.to_string(),
            action: action.to_string(),
            code,
            message,
            data,
        }
    }

    pub fn ok(request: &RequestEnvelope, data: Value) -> Self {
        Self::build(&request.trace_id, &request.action, CODE_OK, "ok".to_string(), data)
    }

    pub fn denied(request: &RequestEnvelope, message: impl Into<String>) -> Self {
        Self::build(
            &request.trace_id,
            &request.action,
            CODE_FORBIDDEN,
            message.into(),
            Value::Null,
        )
    }

    pub fn bad_request(request: &RequestEnvelope, message: impl Into<String>) -> Self {
        Self::build(
            &request.trace_id,
            &request.action,
            CODE_BAD_REQUEST,
            message.into(),
            Value::Null,
        )
    }

    pub fn internal(request: &RequestEnvelope, message: impl Into<String>) -> Self {
        Self::build(
            &request.trace_id,
            &request.action,
            CODE_INTERNAL,
            message.into(),
            Value::Null,
        )
    }

    /// Response to a body that did not parse as a request. No trace id is known.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::build("", "", CODE_BAD_REQUEST, message.into(), Value::Null)
    }

    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}
