/// `load_config` module: reads the settings document and overlays the environment.
///
/// This is the only place where the user-supplied settings file is parsed. The
/// result is a plain [`Settings`] value; validation happens later in
/// [`semagi_core::resolve`].
///
/// # Sources, lowest precedence first
/// 1. The settings document: JSON by default, YAML when the file ends in
///    `.yaml` or `.yml`.
/// 2. Environment variables (`.env` is loaded by `main` through `dotenvy`):
///    `SEMAGI_API_KEY` and `SEMAGI_BASE_URL`.
///
/// Command-line overrides are applied on top by the resolver.
use semagi_core::error::ConfigError;
use semagi_core::settings::Settings;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Settings document used when neither `--settings` nor `SEMAGI_SETTINGS` is given.
pub const DEFAULT_SETTINGS_PATH: &str = "settings.json";

pub const SETTINGS_ENV: &str = "SEMAGI_SETTINGS";
pub const API_KEY_ENV: &str = "SEMAGI_API_KEY";
pub const BASE_URL_ENV: &str = "SEMAGI_BASE_URL";

/// Picks the settings path: explicit flag, then `SEMAGI_SETTINGS`, then the default.
pub fn settings_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(SETTINGS_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH))
}

/// Loads the settings document and overlays the process environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let mut settings = load_settings(path)?;
    apply_environment(&mut settings, |key| std::env::var(key).ok());
    settings.trace_loaded();
    Ok(settings)
}

/// Parses the settings document without looking at the environment.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path_ref = path.as_ref();
    info!(settings_path = ?path_ref, "Loading settings from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, settings_path = ?path_ref, "Failed to read settings file");
            return Err(ConfigError::SettingsUnreadable {
                path: path_ref.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    let parsed = if is_yaml(path_ref) {
        serde_yaml::from_str::<Settings>(&content).map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<Settings>(&content).map_err(|e| e.to_string())
    };

    match parsed {
        Ok(settings) => {
            info!(settings_path = ?path_ref, "Parsed settings successfully");
            Ok(settings)
        }
        Err(reason) => {
            error!(error = %reason, settings_path = ?path_ref, "Failed to parse settings file");
            Err(ConfigError::SettingsInvalid {
                path: path_ref.to_path_buf(),
                reason,
            })
        }
    }
}

/// Overlays `SEMAGI_API_KEY` and `SEMAGI_BASE_URL` onto the document values.
///
/// Empty environment values are ignored.
pub fn apply_environment<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(api_key) = non_empty(API_KEY_ENV) {
        info!(variable = API_KEY_ENV, "API key taken from environment");
        settings.api_key = Some(api_key);
    }
    if let Some(base_url) = non_empty(BASE_URL_ENV) {
        info!(variable = BASE_URL_ENV, base_url = %base_url, "Base URL taken from environment");
        settings.base_url = Some(base_url);
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
}
