//! Persisted settings document and command-line overrides.
//!
//! Every field is optional so the resolver can tell "set in the document" from
//! "fall back to the built-in default". Unknown keys are ignored.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

/// The settings document (`settings.json` or a YAML equivalent).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub task: TaskSection,
    pub defaults: DefaultsSection,
    pub timeout: TimeoutSection,
    pub display: DisplaySection,
    pub polling: PollingSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSection {
    pub function: Option<String>,
    pub file: Option<PathBuf>,
    pub task_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    pub grouper: Option<String>,
    pub min_similarity: Option<f64>,
    pub range: Option<u32>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub numbers: Option<u32>,
    pub force_group: Option<bool>,
    pub force_group_min_similarity: Option<f64>,
}

/// Both values are in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSection {
    pub request_timeout: Option<u64>,
    pub max_wait_time: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    pub show_debug: Option<bool>,
    pub show_progress: Option<bool>,
}

/// Poll pacing. Without `respect_estimate_time: false` the adaptive bands are used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    pub respect_estimate_time: Option<bool>,
    pub custom_interval_seconds: Option<u64>,
    pub min_interval_seconds: Option<u64>,
    pub max_interval_seconds: Option<u64>,
    /// Caps the number of fixed-interval polls at `max_retries`.
    pub limited_retry_strategy: Option<bool>,
    pub max_retries: Option<u32>,
    pub retry_on_error: Option<bool>,
}

impl Settings {
    pub fn trace_loaded(&self) {
        info!(
            api_key_set = self.api_key.as_deref().is_some_and(|k| !k.is_empty()),
            base_url = self.base_url.as_deref().unwrap_or("<default>"),
            function = self.task.function.as_deref().unwrap_or("<unset>"),
            "Loaded settings"
        );
        debug!(
            defaults = ?self.defaults,
            timeout = ?self.timeout,
            display = ?self.display,
            polling = ?self.polling,
            "Settings sections"
        );
    }
}

/// Values given explicitly on the command line. `None` means "not given".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub function: Option<String>,
    pub file: Option<PathBuf>,
    pub task_name: Option<String>,
    pub wait: Option<bool>,
    pub grouper: Option<String>,
    pub min_similarity: Option<f64>,
    pub range: Option<u32>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub numbers: Option<u32>,
    pub force_group: Option<bool>,
    pub force_group_min_similarity: Option<f64>,
    pub request_timeout: Option<u64>,
    pub max_wait_time: Option<u64>,
    pub show_debug: Option<bool>,
}
