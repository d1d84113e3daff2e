//! Domain types shared by the resolver, the controller and transport adapters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::schedule::PollingPolicy;

/// Which server-side pipeline a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    /// Group an existing keyword list (JSON input).
    #[serde(rename = "group-only")]
    GroupOnly,
    /// Scrape search results for each keyword, then group (CSV/TXT input).
    #[serde(rename = "scrap-and-group")]
    ScrapAndGroup,
}

impl FunctionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionKind::GroupOnly => "group-only",
            FunctionKind::ScrapAndGroup => "scrap-and-group",
        }
    }

    /// Lower-case extensions (without the dot) accepted for the input file.
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            FunctionKind::GroupOnly => &["json"],
            FunctionKind::ScrapAndGroup => &["csv", "txt"],
        }
    }

    pub(crate) fn expected_format(&self) -> &'static str {
        match self {
            FunctionKind::GroupOnly => ".json",
            FunctionKind::ScrapAndGroup => ".csv or .txt",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "group-only" => Ok(FunctionKind::GroupOnly),
            "scrap-and-group" => Ok(FunctionKind::ScrapAndGroup),
            other => Err(ConfigError::InvalidFunction(other.to_string())),
        }
    }
}

/// Server-side clustering algorithm. Opaque to the client beyond its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouper {
    HierarchicalClustering,
    Jaccard,
}

impl Grouper {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grouper::HierarchicalClustering => "hierarchical_clustering",
            Grouper::Jaccard => "jaccard",
        }
    }
}

impl fmt::Display for Grouper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grouper {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "hierarchical_clustering" => Ok(Grouper::HierarchicalClustering),
            "jaccard" => Ok(Grouper::Jaccard),
            other => Err(ConfigError::InvalidGrouper(other.to_string())),
        }
    }
}

/// Fully resolved, validated description of one task creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSpec {
    pub function: FunctionKind,
    pub file: PathBuf,
    pub task_name: String,
    pub grouper: Grouper,
    pub min_similarity: f64,
    pub range: u32,
    pub numbers: u32,
    pub country: String,
    pub language: String,
    pub force_group: bool,
    pub force_group_min_similarity: f64,
    pub request_timeout_secs: u64,
    pub max_wait_secs: u64,
    /// When false the controller returns right after the task is created.
    pub wait: bool,
    pub polling: PollingPolicy,
}

impl TaskSpec {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// API key and service location.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub base_url: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Output preferences from the settings `display` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayOptions {
    pub show_debug: bool,
    pub show_progress: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_debug: false,
            show_progress: true,
        }
    }
}

/// Task status as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[serde(alias = "queued")]
    Pending,
    #[serde(alias = "processing")]
    Running,
    Completed,
    #[serde(alias = "error", alias = "cancelled")]
    Failed,
    /// Any status string this client does not know. Treated as still in progress.
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to a successful create call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedTask {
    pub task_id: String,
    /// Server estimate of the total processing time; `None` when unknown.
    pub estimated_seconds: Option<f64>,
    pub message: Option<String>,
}

/// One observed status of a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    /// Latest server estimate; may be revised between polls.
    pub estimated_seconds: Option<f64>,
    pub message: Option<String>,
}

/// Group identifiers arrive as numbers or strings depending on the server version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupId {
    Number(u64),
    Text(String),
}

impl Default for GroupId {
    fn default() -> Self {
        GroupId::Text(String::new())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupId::Number(n) => write!(f, "{n}"),
            GroupId::Text(s) => f.write_str(s),
        }
    }
}

/// Summary of one keyword group in the results preview.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupPreview {
    #[serde(alias = "id")]
    pub group_id: GroupId,
    #[serde(alias = "main_keyword", alias = "group_name")]
    pub primary_keyword: String,
    #[serde(alias = "size", alias = "keyword_count")]
    pub member_count: u64,
    #[serde(alias = "keywords", alias = "examples")]
    pub example_members: Vec<String>,
    #[serde(alias = "total_search_volume", alias = "volume")]
    pub search_volume: Option<u64>,
}

/// Final output of a completed task.
///
/// Flat fields deserialize directly from both the current flat layout and the
/// legacy space-separated keys. The maps below them are filled by the transport
/// from whichever layout the server used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskResult {
    #[serde(alias = "task name", alias = "name")]
    pub task_name: Option<String>,
    pub function: Option<String>,
    #[serde(alias = "processing_time_seconds", alias = "processing time")]
    pub processing_time: Option<f64>,
    #[serde(alias = "credit cost", alias = "credits_consumed")]
    pub credit_cost: Option<f64>,
    #[serde(alias = "credit new", alias = "credits_remaining")]
    pub credit_remaining: Option<f64>,
    #[serde(alias = "total_keywords", alias = "keywords_count")]
    pub keyword_count: Option<u64>,
    #[serde(alias = "grouped_keywords")]
    pub grouped_keyword_count: Option<u64>,
    #[serde(alias = "total_groups", alias = "groups_count")]
    pub group_count: Option<u64>,
    #[serde(alias = "csv download link", alias = "csv_url")]
    pub csv_download_link: Option<String>,
    #[serde(alias = "json download link", alias = "json_url")]
    pub json_download_link: Option<String>,
    #[serde(alias = "csv file name")]
    pub csv_file_name: Option<String>,
    #[serde(alias = "json file name")]
    pub json_file_name: Option<String>,
    /// Download links for file types other than CSV and JSON.
    #[serde(skip_deserializing)]
    pub other_downloads: BTreeMap<String, String>,
    /// Grouping quality scores by metric name.
    #[serde(skip_deserializing)]
    pub quality: BTreeMap<String, f64>,
    /// Processing parameters echoed by the server, keyed `section.name`.
    #[serde(skip_deserializing)]
    pub parameters: BTreeMap<String, String>,
    /// Top-level keys of a body in no known layout. Empty for recognised bodies.
    #[serde(skip_deserializing)]
    pub unrecognized_fields: Vec<String>,
    #[serde(alias = "preview", alias = "top_groups")]
    pub groups: Vec<GroupPreview>,
}

impl TaskResult {
    /// Maximum number of groups kept in the preview.
    pub const PREVIEW_LIMIT: usize = 10;

    /// Drops preview groups beyond `limit`.
    pub fn bounded(mut self, limit: usize) -> Self {
        self.groups.truncate(limit);
        self
    }

    pub fn has_downloads(&self) -> bool {
        self.csv_download_link.is_some()
            || self.json_download_link.is_some()
            || !self.other_downloads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_aliases_map_to_known_states() {
        let parse = |s: &str| serde_json::from_str::<TaskStatus>(&format!("\"{s}\"")).unwrap();
        assert_eq!(parse("queued"), TaskStatus::Pending);
        assert_eq!(parse("processing"), TaskStatus::Running);
        assert_eq!(parse("error"), TaskStatus::Failed);
        assert_eq!(parse("cancelled"), TaskStatus::Failed);
        assert_eq!(parse("completed"), TaskStatus::Completed);
        assert_eq!(parse("rebalancing"), TaskStatus::Unknown);
        assert!(!TaskStatus::Unknown.is_terminal());
    }

    #[test]
    fn legacy_result_keys_are_accepted() {
        let json = r#"{
            "task name": "shoes",
            "credit cost": 12,
            "csv download link": "https://files.example/r.csv",
            "json download link": "https://files.example/r.json",
            "total_groups": 3,
            "preview": [{"id": 7, "main_keyword": "running shoes", "size": 4,
                         "keywords": ["trail shoes"], "volume": 5400}]
        }"#;
        let result: TaskResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.task_name.as_deref(), Some("shoes"));
        assert_eq!(result.credit_cost, Some(12.0));
        assert_eq!(result.group_count, Some(3));
        assert_eq!(result.groups[0].group_id, GroupId::Number(7));
        assert_eq!(result.groups[0].primary_keyword, "running shoes");
        assert_eq!(result.groups[0].search_volume, Some(5400));
    }

    #[test]
    fn bounded_truncates_preview() {
        let result = TaskResult {
            groups: vec![GroupPreview::default(); 25],
            ..Default::default()
        };
        assert_eq!(result.bounded(TaskResult::PREVIEW_LIMIT).groups.len(), 10);
    }

    #[test]
    fn credentials_debug_hides_key() {
        let creds = Credentials {
            api_key: "sk-secret".into(),
            base_url: "http://localhost:8000".into(),
        };
        let shown = format!("{creds:?}");
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("localhost"));
    }
}
