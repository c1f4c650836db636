//! Trust boundary for inbound requests.
//!
//! The gate itself ([`is_authorized`]) is a pure function over the trusted
//! set. [`TrustService`] adds the store and the prompt used when an origin
//! asks to be trusted.

mod gate;
mod prompt;
mod service;
mod store;
mod types;

pub use gate::{extract_host, is_authorized, pattern_matches, validate_pattern, BYPASS_ACTIONS};
pub use prompt::{AllowListPrompt, AutoDenyPrompt, OperatorPrompt, PendingPrompt, TrustPrompt};
pub use service::TrustService;
pub use store::{JsonFileTrustStore, MemoryTrustStore, TrustStore};
pub use types::{
    TrustDecision, TrustError, TrustRequestResult, TrustRequestStatus, TrustedDomainEntry,
};

use std::sync::Arc;

use crate::config::TrustConfig;

/// Factory function to create the trust prompt from config
pub fn create_prompt(config: &TrustConfig) -> Arc<dyn TrustPrompt> {
    use crate::config::PromptMode;

    match config.prompt {
        PromptMode::Deny => Arc::new(AutoDenyPrompt::new()),
        PromptMode::AllowList => Arc::new(AllowListPrompt::new(config.auto_grant.clone())),
        PromptMode::Operator => Arc::new(OperatorPrompt::new(std::time::Duration::from_secs(
            config.prompt_timeout_secs,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptMode;

    #[test]
    fn test_create_prompt_deny() {
        let prompt = create_prompt(&TrustConfig::default());
        assert_eq!(prompt.mode_name(), "deny");
    }

    #[test]
    fn test_create_prompt_allow_list() {
        let config = TrustConfig {
            prompt: PromptMode::AllowList,
            auto_grant: vec!["localhost".to_string()],
            ..Default::default()
        };
        assert_eq!(create_prompt(&config).mode_name(), "allow_list");
    }

    #[test]
    fn test_create_prompt_operator() {
        let config = TrustConfig {
            prompt: PromptMode::Operator,
            ..Default::default()
        };
        let prompt = create_prompt(&config);
        assert_eq!(prompt.mode_name(), "operator");
        assert!(prompt.subscribe().is_some());
    }
}
