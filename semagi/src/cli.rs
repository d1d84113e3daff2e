//! # semagi CLI interface
//!
//! Command parsing and orchestration for the `semagi` binary. All task logic
//! (resolution, input inspection, polling) lives in `semagi-core`; this module
//! wires it to the settings loader, the HTTP client and the terminal.
//!
//! ## Commands
//! - `create`: submit a task from the settings document plus overrides, then
//!   wait for it unless `--no-wait` is given
//! - `wait <task-id>`: follow an existing task to completion
//! - `status <task-id>` / `results <task-id>`: one-shot queries
//! - `env-check`: report whether settings, key, input and service are usable
//!
//! For programmatic or test use call [`run_with_cancel`] with a constructed
//! [`Cli`] and your own cancellation token.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use semagi_core::controller::{self, WaitOptions};
use semagi_core::keywords::TaskRequest;
use semagi_core::resolve::{resolve, resolve_connection};
use semagi_core::settings::{Overrides, Settings};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::env_check::check_environment;
use crate::exit::ExitStatus;
use crate::load_config::{load_config, settings_path};
use crate::report;

/// Command-line client for SEMagi keyword grouping tasks.
#[derive(Parser, Debug)]
#[clap(
    name = "semagi",
    version,
    about = "Submit keyword grouping tasks to SEMagi and follow them to completion"
)]
pub struct Cli {
    /// Settings document (JSON, or YAML by extension). Defaults to $SEMAGI_SETTINGS or ./settings.json
    #[clap(long, global = true)]
    pub settings: Option<PathBuf>,

    /// API base URL, overriding the settings document and $SEMAGI_BASE_URL
    #[clap(long, global = true)]
    pub base_url: Option<String>,

    /// Debug logging
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a task and wait for its results
    Create(CreateArgs),
    /// Wait for an existing task to finish and show its results
    Wait {
        task_id: String,
        /// Give up waiting after this many seconds
        #[clap(long)]
        max_wait_time: Option<u64>,
        /// Per-request timeout in seconds
        #[clap(long)]
        request_timeout: Option<u64>,
        /// Expected total processing time in seconds, if known
        #[clap(long)]
        estimate: Option<f64>,
    },
    /// Show the current status of a task
    Status { task_id: String },
    /// Fetch and show the results of a completed task
    Results { task_id: String },
    /// Check settings, API key, input file and service reachability
    EnvCheck,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Create(_) => "create",
            Commands::Wait { .. } => "wait",
            Commands::Status { .. } => "status",
            Commands::Results { .. } => "results",
            Commands::EnvCheck => "env-check",
        }
    }
}

/// Values that override the `task`, `defaults` and `timeout` settings.
#[derive(Args, Debug, Default, Clone)]
pub struct CreateArgs {
    /// `group-only` (JSON input) or `scrap-and-group` (CSV/TXT input)
    #[clap(long)]
    pub function: Option<String>,
    /// Keyword input file
    #[clap(long)]
    pub file: Option<PathBuf>,
    #[clap(long)]
    pub task_name: Option<String>,
    /// Return right after the task is created
    #[clap(long)]
    pub no_wait: bool,
    /// `hierarchical_clustering` or `jaccard`
    #[clap(long)]
    pub grouper: Option<String>,
    #[clap(long)]
    pub min_similarity: Option<f64>,
    #[clap(long)]
    pub range: Option<u32>,
    #[clap(long)]
    pub country: Option<String>,
    #[clap(long)]
    pub language: Option<String>,
    #[clap(long)]
    pub numbers: Option<u32>,
    /// Give up waiting after this many seconds
    #[clap(long)]
    pub max_wait_time: Option<u64>,
    /// Per-request timeout in seconds
    #[clap(long)]
    pub request_timeout: Option<u64>,
}

impl Cli {
    /// Overrides shared by every command.
    fn base_overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            show_debug: self.verbose.then_some(true),
            ..Default::default()
        }
    }

    pub fn overrides(&self) -> Overrides {
        let base = self.base_overrides();
        match &self.command {
            Commands::Create(args) => Overrides {
                function: args.function.clone(),
                file: args.file.clone(),
                task_name: args.task_name.clone(),
                wait: args.no_wait.then_some(false),
                grouper: args.grouper.clone(),
                min_similarity: args.min_similarity,
                range: args.range,
                country: args.country.clone(),
                language: args.language.clone(),
                numbers: args.numbers,
                max_wait_time: args.max_wait_time,
                request_timeout: args.request_timeout,
                ..base
            },
            Commands::Wait {
                max_wait_time,
                request_timeout,
                ..
            } => Overrides {
                max_wait_time: *max_wait_time,
                request_timeout: *request_timeout,
                ..base
            },
            _ => base,
        }
    }
}

/// Runs the CLI with Ctrl-C wired to cancellation.
pub async fn run(cli: Cli) -> Result<ExitStatus> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("[CLI] Interrupt received, cancelling");
            on_signal.cancel();
        }
    });
    run_with_cancel(cli, cancel).await
}

pub async fn run_with_cancel(cli: Cli, cancel: CancellationToken) -> Result<ExitStatus> {
    info!(command = cli.command.name(), "[CLI] Command started");
    let path = settings_path(cli.settings.clone());
    let overrides = cli.overrides();

    let status = match &cli.command {
        Commands::EnvCheck => {
            let env = check_environment(&path, &overrides).await;
            print!("{}", env.render());
            if env.passed() {
                ExitStatus::Success
            } else {
                ExitStatus::Config
            }
        }
        Commands::Create(_) => create(&load_config(&path)?, &overrides, &cancel).await?,
        Commands::Wait {
            task_id, estimate, ..
        } => wait(&load_config(&path)?, &overrides, task_id, *estimate, &cancel).await?,
        Commands::Status { task_id } => {
            let client = connect(&load_config(&path)?, &overrides)?;
            let snapshot = controller::check_status(&client, task_id).await?;
            print!("{}", report::render_snapshot(task_id, &snapshot));
            ExitStatus::Success
        }
        Commands::Results { task_id } => {
            let client = connect(&load_config(&path)?, &overrides)?;
            let result = controller::fetch_results(&client, task_id).await?;
            print!("{}", report::render_result(&result));
            ExitStatus::Success
        }
    };

    info!(
        command = cli.command.name(),
        exit_code = status.code(),
        "[CLI] Command finished"
    );
    Ok(status)
}

async fn create(
    settings: &Settings,
    overrides: &Overrides,
    cancel: &CancellationToken,
) -> Result<ExitStatus> {
    let resolved = resolve(settings, overrides)?;
    let request = TaskRequest::prepare(resolved.spec)?;
    let client = ApiClient::new(&resolved.credentials, request.spec.request_timeout())?;
    let show_progress = resolved.display.show_progress;

    let outcome = controller::run(&client, &request, cancel, |event| {
        if show_progress {
            println!("{}", report::render_event(event));
        }
    })
    .await
    .context("task creation failed")?;

    print!("{}", report::render_outcome(&outcome));
    Ok(ExitStatus::from(&outcome))
}

async fn wait(
    settings: &Settings,
    overrides: &Overrides,
    task_id: &str,
    estimate: Option<f64>,
    cancel: &CancellationToken,
) -> Result<ExitStatus> {
    let connection = resolve_connection(settings, overrides)?;
    let client = ApiClient::new(&connection.credentials, connection.request_timeout())?;
    let options = WaitOptions {
        max_wait: connection.max_wait(),
        initial_estimate: estimate,
        polling: connection.polling.clone(),
    };
    let show_progress = connection.display.show_progress;

    let outcome = controller::wait_for_completion(&client, task_id, &options, cancel, |event| {
        if show_progress {
            println!("{}", report::render_event(event));
        }
    })
    .await;

    print!("{}", report::render_outcome(&outcome));
    Ok(ExitStatus::from(&outcome))
}

fn connect(settings: &Settings, overrides: &Overrides) -> Result<ApiClient> {
    let connection = resolve_connection(settings, overrides)?;
    Ok(ApiClient::new(
        &connection.credentials,
        connection.request_timeout(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_flags_become_overrides() {
        let cli = Cli::parse_from([
            "semagi",
            "--base-url",
            "http://api.example",
            "create",
            "--function",
            "scrap-and-group",
            "--file",
            "k.csv",
            "--no-wait",
            "--range",
            "25",
            "--min-similarity",
            "0.7",
        ]);
        let o = cli.overrides();
        assert_eq!(o.base_url.as_deref(), Some("http://api.example"));
        assert_eq!(o.function.as_deref(), Some("scrap-and-group"));
        assert_eq!(o.file, Some(PathBuf::from("k.csv")));
        assert_eq!(o.wait, Some(false));
        assert_eq!(o.range, Some(25));
        assert_eq!(o.min_similarity, Some(0.7));
        assert_eq!(o.task_name, None);
        assert_eq!(o.show_debug, None);
    }

    #[test]
    fn wait_without_no_wait_keeps_document_choice() {
        let cli = Cli::parse_from(["semagi", "create"]);
        assert_eq!(cli.overrides().wait, None);
    }

    #[test]
    fn global_flags_work_after_the_subcommand() {
        let cli = Cli::parse_from(["semagi", "status", "t-1", "--verbose"]);
        assert!(cli.verbose);
        assert_eq!(cli.overrides().show_debug, Some(true));
        assert_eq!(cli.command.name(), "status");
    }
}
