//! Task lifecycle: create → adaptive poll → fetch results.
//!
//! This module drives one task from creation to a terminal [`Outcome`]:
//!   - Creates the task (a create failure is returned as an error; polling never starts)
//!   - Returns straight away when the request asked not to wait
//!   - Polls status on the cadence of the task's [`PollingPolicy`] (adaptive bands
//!     by default), re-reading the server estimate on every answer
//!   - Fetches results exactly once the server reports `completed`
//!
//! # Terminal states
//! [`Outcome::Completed`], [`Outcome::Failed`] (reported by the server),
//! [`Outcome::TimedOut`] (wait budget or poll limit spent, task may still finish),
//! [`Outcome::Cancelled`] (cancellation token fired, remote task untouched) and
//! [`Outcome::TransportFailure`] (status or results call failed for good).
//!
//! # Retries
//! `Network` and `Server` errors on a status or results call are retried up to
//! three times after 1s, 2s and 4s unless the policy disables retrying. Other
//! transport errors end the run at once.
//! A `NotReady` answer to the results call is retried on the slower
//! estimate-based cadence in [`results_not_ready_delay`].
//!
//! Every sleep and every in-flight call races the cancellation token, so a
//! cancel is observed without waiting out the current interval.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::contract::{TaskApi, TransportError};
use crate::keywords::TaskRequest;
use crate::schedule::PollingPolicy;
use crate::task::{CreatedTask, TaskResult, TaskSnapshot, TaskStatus};

/// Delays before each retry of a transient status/results failure.
pub const TRANSIENT_BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Number of extra results calls made while the server answers `NotReady`.
pub const RESULTS_NOT_READY_RETRIES: u32 = 3;

/// How a task run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The task was created and the caller asked not to wait.
    ReturnedWithoutWait {
        task_id: String,
        estimated_seconds: Option<f64>,
        message: Option<String>,
    },
    Completed {
        task_id: String,
        elapsed: Duration,
        attempts: u32,
        result: TaskResult,
    },
    /// The server reported the task as failed.
    Failed {
        task_id: String,
        elapsed: Duration,
        message: Option<String>,
    },
    /// The wait budget ran out. The task may still complete on the server.
    TimedOut {
        task_id: String,
        elapsed: Duration,
        last_status: TaskStatus,
    },
    /// Cancelled locally. The remote task is left running.
    Cancelled {
        task_id: String,
        elapsed: Duration,
        last_status: Option<TaskStatus>,
    },
    /// A status or results call failed and could not be recovered.
    TransportFailure {
        task_id: String,
        elapsed: Duration,
        error: TransportError,
    },
}

impl Outcome {
    pub fn task_id(&self) -> &str {
        match self {
            Outcome::ReturnedWithoutWait { task_id, .. }
            | Outcome::Completed { task_id, .. }
            | Outcome::Failed { task_id, .. }
            | Outcome::TimedOut { task_id, .. }
            | Outcome::Cancelled { task_id, .. }
            | Outcome::TransportFailure { task_id, .. } => task_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Outcome::Completed { .. } | Outcome::ReturnedWithoutWait { .. }
        )
    }
}

/// Progress after one status poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollProgress {
    /// One-based poll count.
    pub attempt: u32,
    pub elapsed: Duration,
    pub status: TaskStatus,
    pub estimated_seconds: Option<f64>,
    /// `max(E - t, 0)` when an estimate is known.
    pub remaining: Option<Duration>,
    /// Interval until the next poll, when another poll will follow.
    pub next_poll_in: Option<Duration>,
}

/// Everything the controller reports while it works.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Created(CreatedTask),
    Polled(PollProgress),
    Retrying {
        operation: &'static str,
        retry: u32,
        delay: Duration,
        error: TransportError,
    },
    AwaitingResults {
        retry: u32,
        delay: Duration,
    },
}

/// Wait parameters for an already created task.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitOptions {
    pub max_wait: Duration,
    /// Estimate returned by the create call, if any.
    pub initial_estimate: Option<f64>,
    pub polling: PollingPolicy,
}

/// Controller-local polling state. Dropped when polling ends.
#[derive(Debug)]
struct PollState {
    started: Instant,
    attempts: u32,
    last_status: Option<TaskStatus>,
    estimated_seconds: Option<f64>,
}

impl PollState {
    fn new(initial_estimate: Option<f64>) -> Self {
        Self {
            started: Instant::now(),
            attempts: 0,
            last_status: None,
            estimated_seconds: initial_estimate.filter(|e| *e > 0.0),
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.estimated_seconds
            .map(|e| Duration::from_secs_f64((e - elapsed.as_secs_f64()).max(0.0)))
    }
}

/// Why a call loop stopped without a value.
enum Abort {
    Cancelled,
    Transport(TransportError),
}

/// Runs one task end to end.
///
/// Returns `Err` only when the create call fails; every later problem is
/// reported as an [`Outcome`].
pub async fn run<A, F>(
    api: &A,
    request: &TaskRequest,
    cancel: &CancellationToken,
    mut on_event: F,
) -> Result<Outcome, TransportError>
where
    A: TaskApi + ?Sized,
    F: FnMut(&LifecycleEvent),
{
    let spec = &request.spec;
    info!(
        task_name = %spec.task_name,
        function = %spec.function,
        file = %request.file_name,
        keywords = request.keyword_count,
        "[TASK] Creating task"
    );

    let created = match api.create(request).await {
        Ok(created) => created,
        Err(e) => {
            error!(error = %e, "[TASK][ERROR] Task creation failed");
            return Err(e);
        }
    };
    info!(
        task_id = %created.task_id,
        estimated_seconds = ?created.estimated_seconds,
        "[TASK] Task created"
    );
    on_event(&LifecycleEvent::Created(created.clone()));

    if !spec.wait {
        info!(task_id = %created.task_id, "[TASK] Not waiting for completion");
        return Ok(Outcome::ReturnedWithoutWait {
            task_id: created.task_id,
            estimated_seconds: created.estimated_seconds,
            message: created.message,
        });
    }

    let options = WaitOptions {
        max_wait: spec.max_wait(),
        initial_estimate: created.estimated_seconds,
        polling: spec.polling.clone(),
    };
    Ok(wait_for_completion(api, &created.task_id, &options, cancel, on_event).await)
}

/// Polls an existing task until it reaches a terminal state.
pub async fn wait_for_completion<A, F>(
    api: &A,
    task_id: &str,
    options: &WaitOptions,
    cancel: &CancellationToken,
    mut on_event: F,
) -> Outcome
where
    A: TaskApi + ?Sized,
    F: FnMut(&LifecycleEvent),
{
    let policy = &options.polling;
    let mut state = PollState::new(options.initial_estimate);
    info!(
        task_id,
        max_wait_secs = options.max_wait.as_secs(),
        estimated_seconds = ?state.estimated_seconds,
        cadence = ?policy.cadence,
        max_polls = ?policy.max_polls,
        "[POLL] Waiting for task completion"
    );

    let mut interval = policy.interval(state.estimated_seconds, Duration::ZERO, 0);
    loop {
        let budget_left = options.max_wait.saturating_sub(state.elapsed());
        let sleep_for = interval.min(budget_left);
        debug!(task_id, sleep_ms = sleep_for.as_millis() as u64, "[POLL] Sleeping");
        if sleep_or_cancel(sleep_for, cancel).await.is_err() {
            return cancelled(task_id, &state);
        }

        let snapshot = match call_with_retry(
            "status",
            policy.retry_transient,
            cancel,
            &mut on_event,
            || api.status(task_id),
        )
        .await
        {
            Ok(snapshot) => snapshot,
            Err(Abort::Cancelled) => return cancelled(task_id, &state),
            Err(Abort::Transport(error)) => {
                error!(task_id, error = %error, "[POLL][ERROR] Status polling aborted");
                return Outcome::TransportFailure {
                    task_id: task_id.to_string(),
                    elapsed: state.elapsed(),
                    error,
                };
            }
        };

        state.attempts += 1;
        state.last_status = Some(snapshot.status);
        if let Some(estimate) = snapshot.estimated_seconds.filter(|e| *e > 0.0) {
            state.estimated_seconds = Some(estimate);
        }
        let elapsed = state.elapsed();
        let limit_reached = policy.poll_limit_reached(state.attempts);
        let continues =
            !snapshot.status.is_terminal() && elapsed < options.max_wait && !limit_reached;
        interval = policy.interval(state.estimated_seconds, elapsed, state.attempts);

        let progress = PollProgress {
            attempt: state.attempts,
            elapsed,
            status: snapshot.status,
            estimated_seconds: state.estimated_seconds,
            remaining: state.remaining(elapsed),
            next_poll_in: continues.then_some(interval),
        };
        info!(
            task_id,
            attempt = progress.attempt,
            elapsed_secs = elapsed.as_secs_f64(),
            status = %snapshot.status,
            remaining_secs = ?progress.remaining.map(|r| r.as_secs()),
            "[POLL] Status received"
        );
        on_event(&LifecycleEvent::Polled(progress));

        match snapshot.status {
            TaskStatus::Completed => {
                return finish_completed(api, task_id, &state, policy, cancel, &mut on_event)
                    .await;
            }
            TaskStatus::Failed => {
                warn!(task_id, message = ?snapshot.message, "[POLL] Server reported task failure");
                return Outcome::Failed {
                    task_id: task_id.to_string(),
                    elapsed,
                    message: snapshot.message,
                };
            }
            status if elapsed >= options.max_wait => {
                warn!(
                    task_id,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "[POLL] Wait budget exhausted, task may still be running"
                );
                return Outcome::TimedOut {
                    task_id: task_id.to_string(),
                    elapsed,
                    last_status: status,
                };
            }
            status if limit_reached => {
                warn!(
                    task_id,
                    attempts = state.attempts,
                    "[POLL] Poll limit reached, task may still be running"
                );
                return Outcome::TimedOut {
                    task_id: task_id.to_string(),
                    elapsed,
                    last_status: status,
                };
            }
            _ => {}
        }
    }
}

async fn finish_completed<A, F>(
    api: &A,
    task_id: &str,
    state: &PollState,
    policy: &PollingPolicy,
    cancel: &CancellationToken,
    on_event: &mut F,
) -> Outcome
where
    A: TaskApi + ?Sized,
    F: FnMut(&LifecycleEvent),
{
    info!(task_id, "[RESULTS] Task completed, fetching results");
    let mut not_ready = 0;
    loop {
        let fetched = call_with_retry(
            "results",
            policy.retry_transient,
            cancel,
            &mut *on_event,
            || api.results(task_id),
        )
        .await;
        match fetched {
            Ok(result) => {
                info!(
                    task_id,
                    groups = ?result.group_count,
                    elapsed_secs = state.elapsed().as_secs_f64(),
                    "[RESULTS] Results received"
                );
                return Outcome::Completed {
                    task_id: task_id.to_string(),
                    elapsed: state.elapsed(),
                    attempts: state.attempts,
                    result: result.bounded(TaskResult::PREVIEW_LIMIT),
                };
            }
            Err(Abort::Transport(TransportError::NotReady(_)))
                if not_ready < RESULTS_NOT_READY_RETRIES =>
            {
                not_ready += 1;
                let delay = results_not_ready_delay(not_ready, state.estimated_seconds);
                info!(
                    task_id,
                    retry = not_ready,
                    delay_secs = delay.as_secs(),
                    "[RESULTS] Results not ready yet"
                );
                on_event(&LifecycleEvent::AwaitingResults {
                    retry: not_ready,
                    delay,
                });
                if sleep_or_cancel(delay, cancel).await.is_err() {
                    return cancelled(task_id, state);
                }
            }
            Err(Abort::Cancelled) => return cancelled(task_id, state),
            Err(Abort::Transport(error)) => {
                error!(task_id, error = %error, "[RESULTS][ERROR] Fetching results failed");
                return Outcome::TransportFailure {
                    task_id: task_id.to_string(),
                    elapsed: state.elapsed(),
                    error,
                };
            }
        }
    }
}

/// Delay before the `retry`-th (one-based) results call after a `NotReady` answer.
pub fn results_not_ready_delay(retry: u32, estimated_seconds: Option<f64>) -> Duration {
    let e = estimated_seconds.unwrap_or(0.0).max(0.0);
    let secs = match retry {
        1 => (e / 2.0).max(5.0),
        2 => e.max(10.0),
        _ => (e * 1.5).max(15.0),
    };
    Duration::from_secs(secs.round() as u64)
}

/// Repeats `call` on transient errors with [`TRANSIENT_BACKOFF`] when `retry_transient` holds.
async fn call_with_retry<T, C, Fut, F>(
    operation: &'static str,
    retry_transient: bool,
    cancel: &CancellationToken,
    on_event: &mut F,
    mut call: C,
) -> Result<T, Abort>
where
    C: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
    F: FnMut(&LifecycleEvent),
{
    let mut retry = 0;
    loop {
        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Abort::Cancelled),
            res = call() => res,
        };
        match attempt {
            Ok(value) => return Ok(value),
            Err(error)
                if retry_transient && error.is_retryable() && retry < TRANSIENT_BACKOFF.len() =>
            {
                let delay = TRANSIENT_BACKOFF[retry];
                retry += 1;
                warn!(
                    operation,
                    retry,
                    delay_secs = delay.as_secs(),
                    error = %error,
                    "[RETRY] Transient failure, retrying"
                );
                on_event(&LifecycleEvent::Retrying {
                    operation,
                    retry: retry as u32,
                    delay,
                    error,
                });
                sleep_or_cancel(delay, cancel)
                    .await
                    .map_err(|_| Abort::Cancelled)?;
            }
            Err(error) => return Err(Abort::Transport(error)),
        }
    }
}

/// Sleeps for `duration` unless the token fires first.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<(), ()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(()),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

fn cancelled(task_id: &str, state: &PollState) -> Outcome {
    warn!(
        task_id,
        attempts = state.attempts,
        "[POLL] Cancelled locally, task keeps running on the server"
    );
    Outcome::Cancelled {
        task_id: task_id.to_string(),
        elapsed: state.elapsed(),
        last_status: state.last_status,
    }
}

/// Fetches one status snapshot, without retries.
pub async fn check_status<A>(api: &A, task_id: &str) -> Result<TaskSnapshot, TransportError>
where
    A: TaskApi + ?Sized,
{
    info!(task_id, "[STATUS] Checking task status");
    let snapshot = api.status(task_id).await?;
    debug!(task_id, status = %snapshot.status, "[STATUS] Status received");
    Ok(snapshot)
}

/// Fetches results of a task, without retries, bounded to the preview limit.
pub async fn fetch_results<A>(api: &A, task_id: &str) -> Result<TaskResult, TransportError>
where
    A: TaskApi + ?Sized,
{
    info!(task_id, "[RESULTS] Fetching task results");
    let result = api.results(task_id).await?;
    Ok(result.bounded(TaskResult::PREVIEW_LIMIT))
}
