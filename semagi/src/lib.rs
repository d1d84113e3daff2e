pub mod cli;
pub mod client;
pub mod env_check;
pub mod exit;
pub mod load_config;
pub mod report;

pub use cli::{run, run_with_cancel, Cli, Commands};
pub use exit::ExitStatus;
