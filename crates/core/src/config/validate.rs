use std::collections::HashSet;

use super::{types::Config, ConfigError, PromptMode};
use crate::trust::validate_pattern;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Media fetch attempts is at least 1
/// - WebDriver URL is an http(s) URL
/// - Adapter ids are unique and every adapter is well formed
/// - Auto-grant patterns are valid and present when the allow-list prompt is used
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.media.fetch_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "media.fetch_attempts must be at least 1".to_string(),
        ));
    }

    match url::Url::parse(&config.webdriver.url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        _ => {
            return Err(ConfigError::ValidationError(format!(
                "webdriver.url is not an http(s) URL: {}",
                config.webdriver.url
            )))
        }
    }

    let mut seen = HashSet::new();
    for adapter in &config.adapters {
        if !seen.insert(adapter.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate adapter id: {}",
                adapter.id
            )));
        }
        adapter
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("adapter {}: {}", adapter.id, e)))?;
    }

    for pattern in &config.trust.auto_grant {
        validate_pattern(pattern).map_err(|e| {
            ConfigError::ValidationError(format!("trust.auto_grant: {}", e))
        })?;
    }
    if config.trust.prompt == PromptMode::AllowList && config.trust.auto_grant.is_empty() {
        return Err(ConfigError::ValidationError(
            "trust.prompt = \"allow_list\" requires trust.auto_grant".to_string(),
        ));
    }
    if config.trust.prompt == PromptMode::Operator && config.trust.prompt_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "trust.prompt_timeout_secs must be greater than 0".to_string(),
        ));
    }

    Ok(())
}
