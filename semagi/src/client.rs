//! # HTTP transport for the SEMagi task API
//!
//! [`ApiClient`] implements [`TaskApi`] on top of `reqwest`. It owns the API key,
//! the base URL and the per-call timeout, and maps every HTTP failure onto a
//! [`TransportError`] kind:
//!
//! | answer                         | kind              |
//! |--------------------------------|-------------------|
//! | 401 / 403                      | `Auth`            |
//! | 404                            | `NotFound`        |
//! | 409 on create                  | `Conflict`        |
//! | 409 on results                 | `NotReady`        |
//! | other 4xx                      | `Rejected`        |
//! | 5xx                            | `Server`          |
//! | connect error / timeout        | `Network`         |
//! | body that does not decode      | `InvalidResponse` |
//!
//! Error messages are taken from the `detail`, `error` or `message` field of a
//! JSON error body when present.
//!
//! Results arrive in one of three layouts: a flat object, the same object
//! wrapped in a one-element array (older servers), or the nested `2.0` layout
//! with `task`, `files`, `parameters` and `quality` sections.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use semagi_core::contract::{TaskApi, TransportError};
use semagi_core::error::ConfigError;
use semagi_core::keywords::TaskRequest;
use semagi_core::task::{CreatedTask, Credentials, TaskResult, TaskSnapshot, TaskStatus};

pub const USER_AGENT: &str = concat!("semagi-client/", env!("CARGO_PKG_VERSION"));

/// Which call an HTTP answer belongs to; 409 means different things per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Create,
    Status,
    Results,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl ApiClient {
    pub fn new(credentials: &Credentials, request_timeout: Duration) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&credentials.base_url)
            .map_err(|e| invalid_base(credentials, e.to_string()))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(invalid_base(credentials, "expected an http(s) URL".into()));
        }

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| invalid_base(credentials, format!("cannot build HTTP client: {e}")))?;

        info!(
            base_url = %base_url,
            request_timeout_secs = request_timeout.as_secs(),
            "Initialized SEMagi API client"
        );
        Ok(ApiClient {
            http,
            base_url,
            api_key: credentials.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `segments` appended to the base URL path, each one percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Sends a GET to the base URL and reports whether anything answered.
    ///
    /// Any HTTP status counts as reachable; only connection failures do not.
    pub async fn probe(&self) -> Result<StatusCode, TransportError> {
        let response = self
            .http
            .get(self.base_url.clone())
            .send()
            .await
            .map_err(send_error)?;
        Ok(response.status())
    }
}

fn invalid_base(credentials: &Credentials, reason: String) -> ConfigError {
    ConfigError::InvalidBaseUrl {
        url: credentials.base_url.clone(),
        reason,
    }
}

#[derive(Serialize)]
struct CreateTaskBody<'a> {
    function: &'a str,
    task_name: &'a str,
    file_name: &'a str,
    file_content: String,
    grouper: &'a str,
    min_similarity: f64,
    range_: u32,
    country: &'a str,
    language: &'a str,
    numbers: u32,
    force_group: bool,
    force_group_min_similarity: f64,
}

impl<'a> CreateTaskBody<'a> {
    fn from_request(request: &'a TaskRequest) -> Self {
        let spec = &request.spec;
        CreateTaskBody {
            function: spec.function.as_str(),
            task_name: &spec.task_name,
            file_name: &request.file_name,
            file_content: STANDARD.encode(&request.content),
            grouper: spec.grouper.as_str(),
            min_similarity: spec.min_similarity,
            range_: spec.range,
            country: &spec.country,
            language: &spec.language,
            numbers: spec.numbers,
            force_group: spec.force_group,
            force_group_min_similarity: spec.force_group_min_similarity,
        }
    }
}

#[derive(Deserialize)]
struct CreateTaskResponse {
    task_id: String,
    #[serde(default)]
    estimate_time: Option<f64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: TaskStatus,
    #[serde(default)]
    estimate_time: Option<f64>,
    #[serde(default)]
    message: Option<String>,
}

/// The `2.0` results layout.
#[derive(Deserialize, Default)]
#[serde(default)]
struct NestedResults {
    task: TaskResult,
    files: BTreeMap<String, Value>,
    parameters: BTreeMap<String, Value>,
    quality: BTreeMap<String, Value>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct NestedFile {
    filename: Option<String>,
    download_link: Option<String>,
}

/// Keys that carry no result data in any layout.
const ENVELOPE_KEYS: [&str; 2] = ["status", "response_version"];

fn parse_results(body: Value) -> Result<TaskResult, TransportError> {
    let fields = match body {
        Value::Object(fields) => fields,
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(fields)) => fields,
            Some(_) => return Err(invalid_results("results list holds a non-object")),
            None => return Err(invalid_results("empty results list")),
        },
        other => return Err(invalid_results(format!("unexpected results body: {other}"))),
    };

    let nested = fields.get("response_version").and_then(Value::as_str) == Some("2.0")
        || fields.get("task").is_some_and(Value::is_object);
    if nested {
        nested_result(fields)
    } else {
        flat_result(fields)
    }
}

fn invalid_results(message: impl Into<String>) -> TransportError {
    let message = message.into();
    error!(error = %message, "Failed to decode task results");
    TransportError::InvalidResponse(message)
}

fn nested_result(fields: Map<String, Value>) -> Result<TaskResult, TransportError> {
    let body: NestedResults =
        serde_json::from_value(Value::Object(fields)).map_err(|e| invalid_results(e.to_string()))?;
    let mut result = body.task;

    for (kind, info) in body.files {
        let file: NestedFile = match serde_json::from_value(info) {
            Ok(file) => file,
            Err(e) => {
                debug!(kind = %kind, error = %e, "Skipping unreadable file entry");
                continue;
            }
        };
        let Some(link) = file.download_link else {
            continue;
        };
        match kind.to_ascii_lowercase().as_str() {
            "csv" => {
                result.csv_download_link = Some(link);
                result.csv_file_name = file.filename;
            }
            "json" => {
                result.json_download_link = Some(link);
                result.json_file_name = file.filename;
            }
            _ => {
                result.other_downloads.insert(kind, link);
            }
        }
    }

    result.quality = body
        .quality
        .into_iter()
        .filter_map(|(metric, score)| score.as_f64().map(|s| (metric, s)))
        .collect();

    for (section, value) in body.parameters {
        match value {
            Value::Object(params) => {
                for (name, value) in params {
                    result
                        .parameters
                        .insert(format!("{section}.{name}"), parameter_text(value));
                }
            }
            other => {
                result.parameters.insert(section, parameter_text(other));
            }
        }
    }
    Ok(result)
}

fn parameter_text(value: Value) -> String {
    match value {
        Value::Bool(true) => "enabled".to_string(),
        Value::Bool(false) => "disabled".to_string(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn flat_result(fields: Map<String, Value>) -> Result<TaskResult, TransportError> {
    // Legacy bodies carry scores as `grouping_<metric>_score`.
    let quality: BTreeMap<String, f64> = fields
        .iter()
        .filter(|(key, _)| key.ends_with("_score"))
        .filter_map(|(key, value)| {
            let metric = key.strip_prefix("grouping_")?;
            Some((metric.to_string(), value.as_f64()?))
        })
        .collect();
    let keys: Vec<String> = fields
        .keys()
        .filter(|key| !ENVELOPE_KEYS.contains(&key.as_str()))
        .cloned()
        .collect();

    let mut result: TaskResult =
        serde_json::from_value(Value::Object(fields)).map_err(|e| invalid_results(e.to_string()))?;
    result.quality = quality;
    if result == TaskResult::default() && !keys.is_empty() {
        warn!(fields = ?keys, "Results body is in an unrecognised layout");
        result.unrecognized_fields = keys;
    }
    Ok(result)
}

/// `0` and negative estimates mean "unknown".
fn known_estimate(estimate: Option<f64>) -> Option<f64> {
    estimate.filter(|e| e.is_finite() && *e > 0.0)
}

#[async_trait]
impl TaskApi for ApiClient {
    async fn create(&self, request: &TaskRequest) -> Result<CreatedTask, TransportError> {
        let url = self.endpoint(&["api", "tasks"]);
        info!(
            url = %url,
            file = %request.file_name,
            bytes = request.content.len(),
            "Submitting task"
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&CreateTaskBody::from_request(request))
            .send()
            .await
            .map_err(send_error)?;

        let body: CreateTaskResponse = decode(response, Call::Create, "").await?;
        Ok(CreatedTask {
            task_id: body.task_id,
            estimated_seconds: known_estimate(body.estimate_time),
            message: body.message,
        })
    }

    async fn status(&self, task_id: &str) -> Result<TaskSnapshot, TransportError> {
        let url = self.endpoint(&["api", "tasks", task_id, "status"]);
        debug!(url = %url, "Requesting task status");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(send_error)?;

        let body: StatusResponse = decode(response, Call::Status, task_id).await?;
        Ok(TaskSnapshot {
            status: body.status,
            estimated_seconds: known_estimate(body.estimate_time),
            message: body.message,
        })
    }

    async fn results(&self, task_id: &str) -> Result<TaskResult, TransportError> {
        let url = self.endpoint(&["api", "tasks", task_id, "results"]);
        debug!(url = %url, "Requesting task results");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(send_error)?;

        let body: Value = decode(response, Call::Results, task_id).await?;
        parse_results(body)
    }
}

fn send_error(e: reqwest::Error) -> TransportError {
    let message = if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    };
    error!(error = %message, "HTTP request failed");
    TransportError::Network(message)
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    call: Call,
    task_id: &str,
) -> Result<T, TransportError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| TransportError::Network(format!("failed to read response body: {e}")))?;

    if !status.is_success() {
        let message = error_message(status, &bytes);
        let err = classify(status, call, task_id, message);
        error!(status = status.as_u16(), ?call, error = %err, "API returned an error");
        return Err(err);
    }

    serde_json::from_slice(&bytes).map_err(|e| {
        error!(?call, error = %e, "Failed to decode API response");
        TransportError::InvalidResponse(e.to_string())
    })
}

fn classify(status: StatusCode, call: Call, task_id: &str, message: String) -> TransportError {
    match status.as_u16() {
        401 | 403 => TransportError::Auth(message),
        404 if task_id.is_empty() => TransportError::NotFound(message),
        404 => TransportError::NotFound(task_id.to_string()),
        409 if call == Call::Create => TransportError::Conflict(message),
        409 if call == Call::Results => TransportError::NotReady(task_id.to_string()),
        code @ 500..=599 => TransportError::Server {
            status: code,
            message,
        },
        code => TransportError::Rejected {
            status: code,
            message,
        },
    }
}

/// Pulls a readable message out of an error body.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    let from_json = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "error", "message"]
                .iter()
                .find_map(|key| value.get(*key).cloned())
        })
        .map(|field| match field {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

    from_json.unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> Result<ApiClient, ConfigError> {
        ApiClient::new(
            &Credentials {
                api_key: "k".into(),
                base_url: base.into(),
            },
            Duration::from_secs(5),
        )
    }

    #[test]
    fn endpoint_keeps_base_path_and_encodes_task_id() {
        let api = client("http://host:8000/v1").unwrap();
        assert_eq!(
            api.endpoint(&["api", "tasks", "a b/c", "status"]).as_str(),
            "http://host:8000/v1/api/tasks/a%20b%2Fc/status"
        );
        let root = client("http://host:8000").unwrap();
        assert_eq!(
            root.endpoint(&["api", "tasks"]).as_str(),
            "http://host:8000/api/tasks"
        );
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(matches!(
            client("localhost:8000"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            client("not a url"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn error_message_prefers_detail_then_error_then_message() {
        let status = StatusCode::BAD_REQUEST;
        assert_eq!(error_message(status, br#"{"detail": "bad file"}"#), "bad file");
        assert_eq!(
            error_message(status, br#"{"error": "e", "message": "m"}"#),
            "e"
        );
        assert_eq!(error_message(status, b"<html>"), "HTTP 400");
    }

    #[test]
    fn conflict_means_busy_on_create_and_not_ready_on_results() {
        let conflict = classify(StatusCode::CONFLICT, Call::Create, "", "busy".into());
        assert_eq!(conflict, TransportError::Conflict("busy".into()));
        let not_ready = classify(StatusCode::CONFLICT, Call::Results, "t-1", "x".into());
        assert_eq!(not_ready, TransportError::NotReady("t-1".into()));
    }

    #[test]
    fn body_serializes_with_server_field_names() {
        use semagi_core::schedule::PollingPolicy;
        use semagi_core::task::{FunctionKind, Grouper, TaskSpec};
        let request = TaskRequest {
            spec: TaskSpec {
                function: FunctionKind::ScrapAndGroup,
                file: "k.csv".into(),
                task_name: "n".into(),
                grouper: Grouper::Jaccard,
                min_similarity: 0.4,
                range: 20,
                numbers: 30,
                country: "de".into(),
                language: "de".into(),
                force_group: false,
                force_group_min_similarity: 0.1,
                request_timeout_secs: 30,
                max_wait_secs: 60,
                wait: true,
                polling: PollingPolicy::default(),
            },
            file_name: "k.csv".into(),
            content: b"keyword\nshoes\n".to_vec(),
            keyword_count: 1,
        };
        let json = serde_json::to_value(CreateTaskBody::from_request(&request)).unwrap();
        assert_eq!(json["function"], "scrap-and-group");
        assert_eq!(json["grouper"], "jaccard");
        assert_eq!(json["range_"], 20);
        assert_eq!(json["file_content"], "a2V5d29yZApzaG9lcwo=");
    }

    #[test]
    fn nested_layout_fills_links_scores_and_parameters() {
        let body = serde_json::json!({
            "response_version": "2.0",
            "status": "completed",
            "task": {"name": "shoes", "function": "group-only", "created_time": 1718000000000u64},
            "files": {
                "csv": {"filename": "shoes.csv", "download_link": "https://files.example/r.csv"},
                "JSON": {"filename": "shoes.json", "download_link": "https://files.example/r.json"},
                "xlsx": {"download_link": "https://files.example/r.xlsx"},
                "pdf": {"filename": "pending.pdf"}
            },
            "parameters": {"grouping": {"grouper": "jaccard", "force_group": true}},
            "quality": {"overall": 87.25, "label": "good"}
        });

        let result = parse_results(body).unwrap();
        assert_eq!(result.task_name.as_deref(), Some("shoes"));
        assert_eq!(result.function.as_deref(), Some("group-only"));
        assert_eq!(result.csv_download_link.as_deref(), Some("https://files.example/r.csv"));
        assert_eq!(result.csv_file_name.as_deref(), Some("shoes.csv"));
        assert_eq!(result.json_download_link.as_deref(), Some("https://files.example/r.json"));
        assert_eq!(
            result.other_downloads.get("xlsx").map(String::as_str),
            Some("https://files.example/r.xlsx")
        );
        assert_eq!(result.other_downloads.len(), 1);
        assert_eq!(result.quality.get("overall"), Some(&87.25));
        assert!(!result.quality.contains_key("label"));
        assert_eq!(
            result.parameters.get("grouping.force_group").map(String::as_str),
            Some("enabled")
        );
        assert_eq!(
            result.parameters.get("grouping.grouper").map(String::as_str),
            Some("jaccard")
        );
        assert!(result.unrecognized_fields.is_empty());
    }

    #[test]
    fn task_object_alone_marks_the_nested_layout() {
        let body = serde_json::json!({
            "task": {"task_name": "boots"},
            "files": {"csv": {"download_link": "https://files.example/b.csv"}}
        });
        let result = parse_results(body).unwrap();
        assert_eq!(result.task_name.as_deref(), Some("boots"));
        assert!(result.has_downloads());
    }

    #[test]
    fn legacy_list_keeps_file_name_and_grouping_scores() {
        let body = serde_json::json!([{
            "task name": "shoes",
            "csv download link": "https://files.example/r.csv",
            "csv file name": "shoes.csv",
            "grouping_quality_score": 91.5,
            "grouping_coverage_score": 78.0,
            "grouping_note_score": "n/a"
        }]);
        let result = parse_results(body).unwrap();
        assert_eq!(result.csv_file_name.as_deref(), Some("shoes.csv"));
        assert_eq!(result.quality.get("quality_score"), Some(&91.5));
        assert_eq!(result.quality.get("coverage_score"), Some(&78.0));
        assert_eq!(result.quality.len(), 2);
    }

    #[test]
    fn unknown_layout_lists_its_fields() {
        let body = serde_json::json!({
            "status": "completed",
            "outputs": [{"href": "https://files.example/x"}],
            "summary": "done"
        });
        let result = parse_results(body).unwrap();
        assert!(!result.has_downloads());
        assert_eq!(result.unrecognized_fields, vec!["outputs", "summary"]);
    }

    #[test]
    fn non_object_bodies_are_invalid() {
        assert!(matches!(
            parse_results(serde_json::json!([])),
            Err(TransportError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_results(serde_json::json!("done")),
            Err(TransportError::InvalidResponse(_))
        ));
    }
}
