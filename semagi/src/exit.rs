//! Process exit codes.
//!
//! Scripts can tell "fix your input" (1) from "the service is having trouble"
//! (2), "the job itself failed" (3) and "stopped waiting, check later" (4).

use semagi_core::contract::TransportError;
use semagi_core::controller::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// Bad settings, bad input or a broken environment.
    Config,
    Transport,
    /// The server reported the task as failed.
    TaskFailed,
    /// The wait budget ran out; the task may still finish.
    TimedOut,
    Cancelled,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Config => 1,
            ExitStatus::Transport => 2,
            ExitStatus::TaskFailed => 3,
            ExitStatus::TimedOut => 4,
            ExitStatus::Cancelled => 130,
        }
    }

    /// Exit status for an error that escaped the command.
    ///
    /// Transport errors keep their code; configuration errors and anything untyped
    /// count as an environment problem.
    pub fn for_error(error: &anyhow::Error) -> Self {
        if error.downcast_ref::<TransportError>().is_some() {
            ExitStatus::Transport
        } else {
            ExitStatus::Config
        }
    }
}

impl From<&Outcome> for ExitStatus {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::ReturnedWithoutWait { .. } | Outcome::Completed { .. } => ExitStatus::Success,
            Outcome::Failed { .. } => ExitStatus::TaskFailed,
            Outcome::TimedOut { .. } => ExitStatus::TimedOut,
            Outcome::Cancelled { .. } => ExitStatus::Cancelled,
            Outcome::TransportFailure { .. } => ExitStatus::Transport,
        }
    }
}
