use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrustError {
    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Trusted domain not found: {0}")]
    NotFound(String),

    #[error("Trust store error: {0}")]
    Storage(String),

    #[error("No pending trust prompt: {0}")]
    PromptNotFound(String),
}

/// One trusted host pattern: an exact host or `*.suffix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedDomainEntry {
    pub id: String,
    pub domain_pattern: String,
}

impl TrustedDomainEntry {
    pub fn new(domain_pattern: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            domain_pattern: domain_pattern.to_string(),
        }
    }
}

/// Outcome of the trust gate. Denial is a value, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TrustDecision {
    /// The origin matched a trusted entry.
    Allowed { host: String, entry_id: String },
    /// The action does not require trust.
    Bypassed,
    /// The origin is not trusted.
    Denied {
        host: Option<String>,
        reason: String,
    },
}

impl TrustDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, TrustDecision::Denied { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrustDecision::Allowed { .. } => "allowed",
            TrustDecision::Bypassed => "bypassed",
            TrustDecision::Denied { .. } => "denied",
        }
    }
}

/// Result status of a request-trust call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustRequestStatus {
    AlreadyTrusted,
    Granted,
    Denied,
}

/// Response to a request-trust call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRequestResult {
    pub trusted: bool,
    pub status: TrustRequestStatus,
}
