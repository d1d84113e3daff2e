//! # contract: the transport seam between the controller and the SEMagi API
//!
//! The controller only ever talks to the service through [`TaskApi`]. The HTTP
//! implementation lives in the binary crate; tests use the generated
//! `MockTaskApi`.
//!
//! Implementations own the credentials and the per-call timeout, and must map
//! every failure onto a [`TransportError`] kind so the controller can decide
//! between retrying and giving up.

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

pub use crate::error::TransportError;
use crate::keywords::TaskRequest;
use crate::task::{CreatedTask, TaskResult, TaskSnapshot};

/// Stateless request/response operations against the remote service.
///
/// Each call is a single request bounded by the implementation's request
/// timeout; none of them retries on its own.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Create a task from a prepared request.
    async fn create(&self, request: &TaskRequest) -> Result<CreatedTask, TransportError>;

    /// Fetch the current status of a task.
    async fn status(&self, task_id: &str) -> Result<TaskSnapshot, TransportError>;

    /// Fetch the results of a completed task.
    async fn results(&self, task_id: &str) -> Result<TaskResult, TransportError>;
}
