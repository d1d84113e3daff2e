//! `semagi env-check`: reports whether this machine is ready to submit tasks.
//!
//! Checks run in order and later checks are skipped when the ones they depend
//! on failed: settings document, API key, task input, service reachability.

use std::fmt::Write as _;
use std::path::Path;

use semagi_core::keywords::TaskRequest;
use semagi_core::resolve::{resolve, resolve_connection};
use semagi_core::settings::{Overrides, Settings};
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::load_config::{apply_environment, load_config};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Pass,
    Fail,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: &'static str,
    pub state: CheckState,
    pub detail: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvReport {
    pub checks: Vec<Check>,
}

impl EnvReport {
    fn push(&mut self, name: &'static str, state: CheckState, detail: impl Into<String>) {
        let detail = detail.into();
        match state {
            CheckState::Fail => warn!(check = name, detail = %detail, "[ENV] Check failed"),
            _ => info!(check = name, ?state, detail = %detail, "[ENV] Check done"),
        }
        self.checks.push(Check {
            name,
            state,
            detail,
        });
    }

    /// True when no check failed. Skipped checks do not count as failures.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.state != CheckState::Fail)
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Environment check\n");
        for check in &self.checks {
            let mark = match check.state {
                CheckState::Pass => "ok  ",
                CheckState::Fail => "FAIL",
                CheckState::Skip => "skip",
            };
            let _ = writeln!(out, "  [{mark}] {:<12} {}", check.name, check.detail);
        }
        let verdict = if self.passed() {
            "Ready to submit tasks."
        } else {
            "Fix the failed checks above and run again."
        };
        let _ = writeln!(out, "{verdict}");
        out
    }
}

pub async fn check_environment(settings_path: &Path, overrides: &Overrides) -> EnvReport {
    let mut report = EnvReport::default();

    let settings = match load_config(settings_path) {
        Ok(settings) => {
            report.push(
                "settings",
                CheckState::Pass,
                format!("loaded {}", settings_path.display()),
            );
            settings
        }
        Err(e) => {
            report.push("settings", CheckState::Fail, e.to_string());
            // The key and base URL may still come from the environment and flags.
            let mut fallback = Settings::default();
            apply_environment(&mut fallback, |k| std::env::var(k).ok());
            fallback
        }
    };

    let connection = match resolve_connection(&settings, overrides) {
        Ok(connection) => {
            report.push(
                "api key",
                CheckState::Pass,
                format!("configured, base URL {}", connection.credentials.base_url),
            );
            Some(connection)
        }
        Err(e) => {
            report.push("api key", CheckState::Fail, e.to_string());
            None
        }
    };

    check_task_input(&mut report, &settings, overrides);

    match connection {
        None => report.push("service", CheckState::Skip, "needs a valid API key"),
        Some(connection) => {
            match ApiClient::new(&connection.credentials, connection.request_timeout()) {
                Err(e) => report.push("service", CheckState::Fail, e.to_string()),
                Ok(client) => match client.probe().await {
                    Ok(status) => report.push(
                        "service",
                        CheckState::Pass,
                        format!("{} answered with HTTP {}", client.base_url(), status.as_u16()),
                    ),
                    Err(e) => report.push("service", CheckState::Fail, e.to_string()),
                },
            }
        }
    }

    report
}

fn check_task_input(report: &mut EnvReport, settings: &Settings, overrides: &Overrides) {
    let configured = overrides.function.is_some()
        || overrides.file.is_some()
        || settings.task.function.is_some()
        || settings.task.file.is_some();
    if !configured {
        report.push(
            "task input",
            CheckState::Skip,
            "no task.function or task.file configured",
        );
        return;
    }

    let outcome =
        resolve(settings, overrides).and_then(|resolved| TaskRequest::prepare(resolved.spec));
    match outcome {
        Ok(request) => report.push(
            "task input",
            CheckState::Pass,
            format!(
                "{} ({} keywords, {} bytes)",
                request.file_name,
                request.keyword_count,
                request.content.len()
            ),
        ),
        Err(e) => report.push("task input", CheckState::Fail, e.to_string()),
    }
}
