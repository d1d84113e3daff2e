//! `resolve` module: merges the settings document with command-line overrides into one validated request.
//!
//! # Responsibilities
//! - Apply precedence: command line > settings document > built-in defaults
//! - Validate in a fixed order so the first reported problem is predictable
//! - Stay pure: the only outside information consulted is whether the input file exists
//!
//! Environment variables are folded into the [`Settings`] by the loader before
//! they reach this module.
use std::path::Path;
use std::time::Duration;

use tracing::{debug, error};

use crate::error::ConfigError;
use crate::schedule::{Cadence, PollingPolicy, DEFAULT_FIXED_MAX, DEFAULT_FIXED_MIN};
use crate::settings::{Overrides, Settings};
use crate::task::{Credentials, DisplayOptions, FunctionKind, Grouper, TaskSpec};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_GROUPER: Grouper = Grouper::HierarchicalClustering;
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.5;
pub const DEFAULT_RANGE: u32 = 10;
pub const DEFAULT_COUNTRY: &str = "us";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_NUMBERS: u32 = 10;
pub const DEFAULT_FORCE_GROUP: bool = true;
pub const DEFAULT_FORCE_GROUP_MIN_SIMILARITY: f64 = 0.2;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_WAIT_SECS: u64 = 1800;
pub const DEFAULT_CUSTOM_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_MAX_POLLS: u32 = 3;

const SIMILARITY_BOUNDS: (f64, f64) = (0.0, 1.0);
const RANGE_BOUNDS: (u32, u32) = (1, 100);
const NUMBERS_BOUNDS: (u32, u32) = (1, 100);
const REQUEST_TIMEOUT_BOUNDS: (u64, u64) = (1, 600);
const MAX_WAIT_BOUNDS: (u64, u64) = (1, 86_400);
const POLL_INTERVAL_BOUNDS: (u64, u64) = (2, 3_600);
const MAX_POLLS_BOUNDS: (u32, u32) = (1, 1_000);

/// Everything needed to create and follow one task.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub credentials: Credentials,
    pub spec: TaskSpec,
    pub display: DisplayOptions,
}

/// Credentials and per-call settings for commands that target an existing task.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub credentials: Credentials,
    pub request_timeout_secs: u64,
    pub max_wait_secs: u64,
    pub polling: PollingPolicy,
    pub display: DisplayOptions,
}

impl Connection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// Resolves a full task creation request.
pub fn resolve(settings: &Settings, overrides: &Overrides) -> Result<Resolved, ConfigError> {
    let result = resolve_inner(settings, overrides);
    match &result {
        Ok(resolved) => debug!(
            function = %resolved.spec.function,
            file = %resolved.spec.file.display(),
            task_name = %resolved.spec.task_name,
            wait = resolved.spec.wait,
            "Resolved task specification"
        ),
        Err(e) => error!(error = %e, "Failed to resolve task specification"),
    }
    result
}

fn resolve_inner(settings: &Settings, overrides: &Overrides) -> Result<Resolved, ConfigError> {
    // (a)
    let credentials = resolve_credentials(settings, overrides)?;

    // (b)
    let function: FunctionKind = pick(&overrides.function, &settings.task.function)
        .ok_or(ConfigError::MissingField("task.function"))?
        .parse()?;

    // (c)
    let file = pick(&overrides.file, &settings.task.file)
        .ok_or(ConfigError::MissingField("task.file"))?;
    if !file.is_file() {
        return Err(ConfigError::FileNotFound(file));
    }

    // (d)
    check_extension(function, &file)?;

    // (e)
    let d = &settings.defaults;
    let min_similarity = pick(&overrides.min_similarity, &d.min_similarity)
        .unwrap_or(DEFAULT_MIN_SIMILARITY);
    check_f64("min_similarity", min_similarity, SIMILARITY_BOUNDS)?;
    let range = pick(&overrides.range, &d.range).unwrap_or(DEFAULT_RANGE);
    check_ord("range", range, RANGE_BOUNDS)?;
    let numbers = pick(&overrides.numbers, &d.numbers).unwrap_or(DEFAULT_NUMBERS);
    check_ord("numbers", numbers, NUMBERS_BOUNDS)?;
    let force_group_min_similarity = pick(
        &overrides.force_group_min_similarity,
        &d.force_group_min_similarity,
    )
    .unwrap_or(DEFAULT_FORCE_GROUP_MIN_SIMILARITY);
    check_f64(
        "force_group_min_similarity",
        force_group_min_similarity,
        SIMILARITY_BOUNDS,
    )?;
    let (request_timeout_secs, max_wait_secs) = resolve_timeouts(settings, overrides)?;
    let polling = resolve_polling(settings)?;

    // (f)
    let task_name = pick(&overrides.task_name, &settings.task.task_name)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or(ConfigError::MissingField("task.task_name"))?;

    // (g)
    let grouper = match pick(&overrides.grouper, &d.grouper) {
        Some(name) => name.parse()?,
        None => DEFAULT_GROUPER,
    };

    let spec = TaskSpec {
        function,
        file,
        task_name,
        grouper,
        min_similarity,
        range,
        numbers,
        country: pick(&overrides.country, &d.country)
            .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
        language: pick(&overrides.language, &d.language)
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        force_group: pick(&overrides.force_group, &d.force_group).unwrap_or(DEFAULT_FORCE_GROUP),
        force_group_min_similarity,
        request_timeout_secs,
        max_wait_secs,
        wait: overrides.wait.unwrap_or(true),
        polling,
    };

    Ok(Resolved {
        credentials,
        spec,
        display: resolve_display(settings, overrides),
    })
}

/// Resolves only what the status/results commands need.
pub fn resolve_connection(
    settings: &Settings,
    overrides: &Overrides,
) -> Result<Connection, ConfigError> {
    let credentials = resolve_credentials(settings, overrides)?;
    let (request_timeout_secs, max_wait_secs) = resolve_timeouts(settings, overrides)?;
    Ok(Connection {
        credentials,
        request_timeout_secs,
        max_wait_secs,
        polling: resolve_polling(settings)?,
        display: resolve_display(settings, overrides),
    })
}

fn resolve_credentials(
    settings: &Settings,
    overrides: &Overrides,
) -> Result<Credentials, ConfigError> {
    let api_key = pick(&overrides.api_key, &settings.api_key)
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or(ConfigError::MissingCredential)?;
    let base_url = pick(&overrides.base_url, &settings.base_url)
        .map(|url| url.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    Ok(Credentials { api_key, base_url })
}

fn resolve_timeouts(settings: &Settings, overrides: &Overrides) -> Result<(u64, u64), ConfigError> {
    let t = &settings.timeout;
    let request_timeout = pick(&overrides.request_timeout, &t.request_timeout)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    check_ord("request_timeout", request_timeout, REQUEST_TIMEOUT_BOUNDS)?;
    let max_wait = pick(&overrides.max_wait_time, &t.max_wait_time).unwrap_or(DEFAULT_MAX_WAIT_SECS);
    check_ord("max_wait_time", max_wait, MAX_WAIT_BOUNDS)?;
    Ok((request_timeout, max_wait))
}

/// Builds the poll policy from the `polling` section.
///
/// `respect_estimate_time: false` switches to a fixed cadence clamped to
/// [2s, 30s] unless explicit bounds are given, capped at `max_retries` polls
/// while `limited_retry_strategy` holds. Explicit bounds also clamp the
/// adaptive bands.
fn resolve_polling(settings: &Settings) -> Result<PollingPolicy, ConfigError> {
    let p = &settings.polling;
    let min_interval = interval_secs("min_interval_seconds", p.min_interval_seconds)?;
    let max_interval = interval_secs("max_interval_seconds", p.max_interval_seconds)?;
    if let (Some(min), Some(max)) = (min_interval, max_interval) {
        if min > max {
            return Err(out_of_range(
                "min_interval_seconds",
                min.as_secs(),
                POLL_INTERVAL_BOUNDS.0,
                max.as_secs(),
            ));
        }
    }
    let retry_transient = p.retry_on_error.unwrap_or(true);

    if p.respect_estimate_time.unwrap_or(true) {
        return Ok(PollingPolicy {
            cadence: Cadence::Adaptive,
            min_interval,
            max_interval,
            retry_transient,
            max_polls: None,
        });
    }

    let every = p
        .custom_interval_seconds
        .unwrap_or(DEFAULT_CUSTOM_INTERVAL_SECS);
    check_ord("custom_interval_seconds", every, POLL_INTERVAL_BOUNDS)?;
    let max_polls = if p.limited_retry_strategy.unwrap_or(true) {
        let limit = p.max_retries.unwrap_or(DEFAULT_MAX_POLLS);
        check_ord("max_retries", limit, MAX_POLLS_BOUNDS)?;
        Some(limit)
    } else {
        None
    };
    Ok(PollingPolicy {
        cadence: Cadence::Fixed(Duration::from_secs(every)),
        min_interval: Some(min_interval.unwrap_or(DEFAULT_FIXED_MIN)),
        max_interval: Some(max_interval.unwrap_or(DEFAULT_FIXED_MAX)),
        retry_transient,
        max_polls,
    })
}

fn interval_secs(field: &'static str, secs: Option<u64>) -> Result<Option<Duration>, ConfigError> {
    match secs {
        Some(secs) => {
            check_ord(field, secs, POLL_INTERVAL_BOUNDS)?;
            Ok(Some(Duration::from_secs(secs)))
        }
        None => Ok(None),
    }
}

fn resolve_display(settings: &Settings, overrides: &Overrides) -> DisplayOptions {
    let defaults = DisplayOptions::default();
    DisplayOptions {
        show_debug: pick(&overrides.show_debug, &settings.display.show_debug)
            .unwrap_or(defaults.show_debug),
        show_progress: settings
            .display
            .show_progress
            .unwrap_or(defaults.show_progress),
    }
}

/// Command-line value if given, else the document value.
fn pick<T: Clone>(cli: &Option<T>, document: &Option<T>) -> Option<T> {
    cli.clone().or_else(|| document.clone())
}

fn check_extension(function: FunctionKind, file: &Path) -> Result<(), ConfigError> {
    let ext = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if function.allowed_extensions().contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(ConfigError::FormatMismatch {
            function: function.as_str(),
            expected: function.expected_format(),
            found: if ext.is_empty() {
                "<none>".to_string()
            } else {
                format!(".{ext}")
            },
        })
    }
}

fn check_f64(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<(), ConfigError> {
    // NaN fails both comparisons and lands here too.
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(out_of_range(field, value, min, max))
    }
}

fn check_ord<T>(field: &'static str, value: T, (min, max): (T, T)) -> Result<(), ConfigError>
where
    T: PartialOrd + ToString,
{
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(out_of_range(field, value, min, max))
    }
}

fn out_of_range<T: ToString>(field: &'static str, value: T, min: T, max: T) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
        min: min.to_string(),
        max: max.to_string(),
    }
}
