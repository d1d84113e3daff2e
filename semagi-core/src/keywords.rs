//! Reads and checks the keyword input file before anything is sent to the server.
//!
//! Accepted layouts:
//! - group-only (`.json`): `{"keywords": ["...", ...]}` or `[{"keyword": "..."}, ...]`
//! - scrap-and-group (`.csv`/`.txt`): a header row with a `keyword` column
//!   (an optional `category` column is passed through untouched). A `.txt`
//!   file without a header is read as one keyword per line.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::task::{FunctionKind, TaskSpec};

/// A validated task specification together with the file to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub spec: TaskSpec,
    /// Base name of the input file, as sent to the server.
    pub file_name: String,
    pub content: Vec<u8>,
    pub keyword_count: usize,
}

impl TaskRequest {
    /// Reads `spec.file` and checks that it holds at least one keyword in the
    /// layout required by `spec.function`.
    pub fn prepare(spec: TaskSpec) -> Result<Self, ConfigError> {
        let path = spec.file.clone();
        let content = fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.clone()),
            _ => invalid(&path, format!("cannot read file: {e}")),
        })?;

        let keywords = match spec.function {
            FunctionKind::GroupOnly => json_keywords(&path, &content)?,
            FunctionKind::ScrapAndGroup => tabular_keywords(&path, &content)?,
        };
        if keywords == 0 {
            return Err(invalid(&path, "no keywords found".to_string()));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(
            file = %file_name,
            bytes = content.len(),
            keywords,
            "Prepared task input"
        );
        Ok(TaskRequest {
            spec,
            file_name,
            content,
            keyword_count: keywords,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonKeywords {
    Wrapped { keywords: Vec<String> },
    Records(Vec<KeywordRecord>),
}

#[derive(Deserialize)]
struct KeywordRecord {
    keyword: String,
}

fn json_keywords(path: &Path, content: &[u8]) -> Result<usize, ConfigError> {
    let parsed: JsonKeywords = serde_json::from_slice(content).map_err(|e| {
        invalid(
            path,
            format!(
                "expected {{\"keywords\": [...]}} or an array of objects with a `keyword` field ({e})"
            ),
        )
    })?;
    let count = match parsed {
        JsonKeywords::Wrapped { keywords } => count_non_blank(keywords.iter().map(String::as_str)),
        JsonKeywords::Records(records) => {
            count_non_blank(records.iter().map(|r| r.keyword.as_str()))
        }
    };
    debug!(count, "Counted JSON keywords");
    Ok(count)
}

fn tabular_keywords(path: &Path, content: &[u8]) -> Result<usize, ConfigError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);
    let headers = reader
        .headers()
        .map_err(|e| invalid(path, format!("cannot read header row: {e}")))?
        .clone();
    let keyword_column = headers
        .iter()
        .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case("keyword"));

    let is_txt = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("txt"));

    match keyword_column {
        Some(column) => {
            let mut count = 0;
            for record in reader.records() {
                let record = record.map_err(|e| invalid(path, format!("malformed row: {e}")))?;
                if record.get(column).is_some_and(|k| !k.trim().is_empty()) {
                    count += 1;
                }
            }
            debug!(count, column, "Counted keywords from header column");
            Ok(count)
        }
        None if is_txt => {
            let text = String::from_utf8_lossy(content);
            let count = count_non_blank(text.lines());
            debug!(count, "Counted plain-text keywords");
            Ok(count)
        }
        None => Err(invalid(path, "missing `keyword` column".to_string())),
    }
}

fn count_non_blank<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values.filter(|v| !v.trim().is_empty()).count()
}

fn invalid(path: &Path, reason: String) -> ConfigError {
    ConfigError::InvalidInput {
        path: path.to_path_buf(),
        reason,
    }
}
