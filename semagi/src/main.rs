use clap::Parser;
use semagi::cli::{run, Cli};
use semagi::exit::ExitStatus;
use semagi::load_config::{load_settings, settings_path};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load SEMAGI_* variables from .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Debug logging comes from --verbose or display.show_debug; RUST_LOG wins otherwise.
    let show_debug = cli.verbose
        || load_settings(settings_path(cli.settings.clone()))
            .ok()
            .and_then(|s| s.display.show_debug)
            .unwrap_or(false);
    let filter = if show_debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("CLI startup: tracing initialised, environment loaded");

    let status = match run(cli).await {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("Error: {e:#}");
            ExitStatus::for_error(&e)
        }
    };
    std::process::exit(status.code());
}
