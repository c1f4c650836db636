use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::media::MediaConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::publish::AdapterSpec;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub trust: TrustConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub webdriver: WebDriverConfig,
    /// Adapter declarations, one per supported platform.
    #[serde(default)]
    pub adapters: Vec<AdapterSpec>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// How a request to trust a new origin is resolved.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    /// Every request is denied; domains are added by editing the store.
    #[default]
    Deny,
    /// Requests are granted when the origin matches `auto_grant`.
    AllowList,
    /// Requests wait for an operator decision, denied after
    /// `prompt_timeout_secs`.
    Operator,
}

/// Trust gate configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrustConfig {
    /// JSON file holding the trusted-domain set.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default)]
    pub prompt: PromptMode,
    /// Host patterns granted on request when `prompt = "allow_list"`.
    #[serde(default)]
    pub auto_grant: Vec<String>,
    /// How long an operator prompt stays open before it counts as denied.
    #[serde(default = "default_prompt_timeout")]
    pub prompt_timeout_secs: u64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            prompt: PromptMode::default(),
            auto_grant: Vec::new(),
            prompt_timeout_secs: default_prompt_timeout(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("trusted_domains.json")
}

fn default_prompt_timeout() -> u64 {
    60
}

/// WebDriver surface host configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebDriverConfig {
    /// WebDriver server URL (chromedriver, geckodriver, ...)
    #[serde(default = "default_webdriver_url")]
    pub url: String,
    /// Request timeout in seconds
    #[serde(default = "default_webdriver_timeout")]
    pub timeout_secs: u64,
    /// Interval at which mutation observers are polled
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// `alwaysMatch` capabilities sent on session creation
    #[serde(default = "default_capabilities")]
    pub capabilities: Value,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: default_webdriver_url(),
            timeout_secs: default_webdriver_timeout(),
            poll_interval_ms: default_poll_interval(),
            capabilities: default_capabilities(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_webdriver_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    100
}

fn default_capabilities() -> Value {
    json!({ "browserName": "chrome" })
}

/// Sanitized config for API responses
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub trust: SanitizedTrustConfig,
    pub orchestrator: OrchestratorConfig,
    pub media: MediaConfig,
    pub webdriver: SanitizedWebDriverConfig,
    /// Ids of the configured adapters.
    pub adapters: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTrustConfig {
    pub store_path: PathBuf,
    pub prompt: PromptMode,
    pub auto_grant_count: usize,
    pub prompt_timeout_secs: u64,
}

/// Sanitized WebDriver config (capabilities may carry profile paths and
/// credentials, so only their presence is reported)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedWebDriverConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub capabilities_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            trust: SanitizedTrustConfig {
                store_path: config.trust.store_path.clone(),
                prompt: config.trust.prompt,
                auto_grant_count: config.trust.auto_grant.len(),
                prompt_timeout_secs: config.trust.prompt_timeout_secs,
            },
            orchestrator: config.orchestrator.clone(),
            media: config.media.clone(),
            webdriver: SanitizedWebDriverConfig {
                url: config.webdriver.url.clone(),
                timeout_secs: config.webdriver.timeout_secs,
                poll_interval_ms: config.webdriver.poll_interval_ms,
                capabilities_configured: config
                    .webdriver
                    .capabilities
                    .as_object()
                    .map(|o| !o.is_empty())
                    .unwrap_or(false),
            },
            adapters: config.adapters.iter().map(|a| a.id.clone()).collect(),
        }
    }
}
