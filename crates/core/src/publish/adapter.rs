//! Declarative adapter specifications.
//!
//! An adapter is data: the selectors, properties and success signal of one
//! platform's editor. A single generic state machine executes every adapter.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a text field of the foreign editor is filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub selector: String,
    /// DOM property assigned (e.g. "value", "innerHTML", "textContent").
    #[serde(default = "default_property")]
    pub property: String,
    /// Assign the HTML rendition of the body instead of plain text.
    #[serde(default)]
    pub use_html: bool,
}

fn default_property() -> String {
    "value".to_string()
}

/// How media reaches the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaStrategy {
    /// The platform takes no media.
    #[default]
    None,
    /// Files are assigned to an upload input.
    FileInput {
        selector: String,
        /// MIME prefixes accepted by the input (e.g. "image/"). Empty accepts all.
        #[serde(default)]
        accept: Vec<String>,
    },
    /// Media embedded in the HTML body is uploaded from inside the page and
    /// the references are rewritten before the body is assigned again.
    InlineRewrite {
        endpoint: String,
        #[serde(default = "default_form_field")]
        form_field: String,
        /// JSON pointer to the hosted URL in the upload response.
        url_pointer: String,
        #[serde(default)]
        extra_fields: BTreeMap<String, String>,
    },
}

fn default_form_field() -> String {
    "file".to_string()
}

/// Locates a clickable action (publish, save draft).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionLocator {
    /// First element matching a selector.
    Selector { selector: String },
    /// First element matching a selector whose text contains `text`.
    Text {
        selector: String,
        text: String,
        #[serde(default = "default_action_attempts")]
        attempts: u32,
        #[serde(default = "default_action_interval")]
        interval_ms: u64,
    },
}

fn default_action_attempts() -> u32 {
    10
}

fn default_action_interval() -> u64 {
    500
}

/// Observable evidence that the platform accepted the submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuccessSignal {
    /// An element appears; `result_attribute` is read into the result.
    Selector {
        selector: String,
        #[serde(default)]
        result_attribute: Option<String>,
    },
    /// An element's text contains `text`.
    Text { selector: String, text: String },
    /// The surface navigates to a URL containing `url_contains`.
    Navigation { url_contains: String },
    /// The platform exposes no signal; success is reported unverified.
    Unverified,
}

/// Full declaration of one platform's editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterSpec {
    pub id: String,
    pub target_kind: String,
    /// Element whose presence means the editor is usable.
    pub ready_selector: String,
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_ms: u64,
    #[serde(default)]
    pub title: Option<FieldSpec>,
    #[serde(default)]
    pub body: Option<FieldSpec>,
    #[serde(default)]
    pub media: MediaStrategy,
    pub publish_action: ActionLocator,
    #[serde(default)]
    pub draft_action: Option<ActionLocator>,
    pub success: SuccessSignal,
    /// Signal confirming a draft save. Without one, drafts are unverified.
    #[serde(default)]
    pub draft_success: Option<SuccessSignal>,
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_ms: u64,
    /// Timeout for fields, upload inputs and selector actions.
    #[serde(default = "default_field_timeout")]
    pub field_timeout_ms: u64,
    /// Pause after a confirmed transition before the next step.
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
    /// Polling interval for text and navigation signals.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_ready_timeout() -> u64 {
    30_000
}

fn default_confirm_timeout() -> u64 {
    60_000
}

fn default_field_timeout() -> u64 {
    10_000
}

fn default_settle() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    500
}

impl AdapterSpec {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn field_timeout(&self) -> Duration {
        Duration::from_millis(self.field_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check the declaration for values the machine cannot execute.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id cannot be empty".to_string());
        }
        if self.ready_selector.trim().is_empty() {
            return Err("ready_selector cannot be empty".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms cannot be 0".to_string());
        }
        for action in std::iter::once(&self.publish_action).chain(self.draft_action.as_ref()) {
            if let ActionLocator::Text { attempts: 0, .. } = action {
                return Err("action attempts cannot be 0".to_string());
            }
        }
        if let MediaStrategy::InlineRewrite { url_pointer, .. } = &self.media {
            if !url_pointer.is_empty() && !url_pointer.starts_with('/') {
                return Err(format!("url_pointer must be a JSON pointer: {}", url_pointer));
            }
            if !self.body.as_ref().map(|b| b.use_html).unwrap_or(false) {
                return Err("inline_rewrite requires an HTML body field".to_string());
            }
        }
        Ok(())
    }
}

/// Adapters keyed by id.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<AdapterSpec>>,
}

impl AdapterRegistry {
    pub fn new(specs: Vec<AdapterSpec>) -> Self {
        Self {
            adapters: specs
                .into_iter()
                .map(|spec| (spec.id.clone(), Arc::new(spec)))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<AdapterSpec>> {
        self.adapters.get(id).cloned()
    }

    pub fn insert(&mut self, spec: AdapterSpec) {
        self.adapters.insert(spec.id.clone(), Arc::new(spec));
    }

    /// Sorted adapter ids.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
