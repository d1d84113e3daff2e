//! Human-readable rendering of task state for the terminal.
//!
//! Every function returns a `String`; printing is left to the caller so the
//! output can be asserted on in tests.

use std::fmt::Write as _;
use std::time::Duration;

use semagi_core::controller::{LifecycleEvent, Outcome, PollProgress};
use semagi_core::task::{CreatedTask, TaskResult, TaskSnapshot};

const RULE: &str = "============================================================";

fn secs(d: Duration) -> String {
    format!("{:.1}s", d.as_secs_f64())
}

pub fn render_created(created: &CreatedTask) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Task created: {}", created.task_id);
    if let Some(message) = &created.message {
        let _ = writeln!(out, "  {message}");
    }
    if let Some(estimate) = created.estimated_seconds {
        let _ = writeln!(out, "  Estimated processing time: {estimate:.0}s");
    }
    out
}

/// One line per poll, e.g. `[03] running (waited 47.5s) - about 72s left, next check in 10.2s`.
pub fn render_progress(progress: &PollProgress) -> String {
    let mut line = format!(
        "[{:02}] {} (waited {})",
        progress.attempt,
        progress.status,
        secs(progress.elapsed)
    );
    if let Some(remaining) = progress.remaining {
        let _ = write!(line, " - about {:.0}s left", remaining.as_secs_f64());
    }
    if let Some(next) = progress.next_poll_in {
        let _ = write!(line, ", next check in {}", secs(next));
    }
    line
}

/// Terminal line for a controller event.
pub fn render_event(event: &LifecycleEvent) -> String {
    match event {
        LifecycleEvent::Created(created) => render_created(created).trim_end().to_string(),
        LifecycleEvent::Polled(progress) => render_progress(progress),
        LifecycleEvent::Retrying {
            operation,
            retry,
            delay,
            error,
        } => format!(
            "  {operation} failed ({error}); retry {retry} in {}",
            secs(*delay)
        ),
        LifecycleEvent::AwaitingResults { retry, delay } => format!(
            "  Results are being prepared; retry {retry} in {}",
            secs(*delay)
        ),
    }
}

pub fn render_snapshot(task_id: &str, snapshot: &TaskSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Task {task_id}: {}", snapshot.status);
    if let Some(message) = &snapshot.message {
        let _ = writeln!(out, "  Message: {message}");
    }
    if let Some(estimate) = snapshot.estimated_seconds {
        let _ = writeln!(out, "  Estimated time: {estimate:.0}s");
    }
    out
}

pub fn render_result(result: &TaskResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Task results");
    let _ = writeln!(out, "{RULE}");

    if let Some(name) = &result.task_name {
        let _ = writeln!(out, "Task name:        {name}");
    }
    if let Some(function) = &result.function {
        let _ = writeln!(out, "Function:         {function}");
    }
    if let Some(t) = result.processing_time {
        let _ = writeln!(out, "Processing time:  {t:.1}s");
    }
    if let Some(n) = result.keyword_count {
        let _ = writeln!(out, "Keywords:         {n}");
    }
    if let Some(n) = result.grouped_keyword_count {
        let _ = writeln!(out, "Grouped keywords: {n}");
    }
    if let Some(n) = result.group_count {
        let _ = writeln!(out, "Groups:           {n}");
    }
    if let Some(cost) = result.credit_cost {
        let _ = writeln!(out, "Credits used:     {cost}");
    }
    if let Some(left) = result.credit_remaining {
        let _ = writeln!(out, "Credits left:     {left}");
    }

    if !result.unrecognized_fields.is_empty() {
        let _ = writeln!(
            out,
            "\nUnrecognised result format. Fields received: {}",
            result.unrecognized_fields.join(", ")
        );
    }

    let _ = writeln!(out, "\nDownloads:");
    if result.has_downloads() {
        let files = [
            ("CSV", &result.csv_download_link, &result.csv_file_name),
            ("JSON", &result.json_download_link, &result.json_file_name),
        ];
        for (kind, link, name) in files {
            if let Some(link) = link {
                let _ = writeln!(out, "  {kind:<5}{link}");
                if let Some(name) = name {
                    let _ = writeln!(out, "       file: {name}");
                }
            }
        }
        for (kind, link) in &result.other_downloads {
            let _ = writeln!(out, "  {:<5}{link}", kind.to_uppercase());
        }
    } else if result.unrecognized_fields.is_empty() {
        let _ = writeln!(out, "  Download links are still being generated.");
    } else {
        let _ = writeln!(out, "  No download links found in this response.");
    }

    if !result.quality.is_empty() {
        let _ = writeln!(out, "\nQuality scores:");
        for (metric, score) in &result.quality {
            let _ = writeln!(out, "  {metric}: {score:.1}");
        }
    }

    if !result.parameters.is_empty() {
        let _ = writeln!(out, "\nParameters:");
        for (name, value) in &result.parameters {
            let _ = writeln!(out, "  {name}: {value}");
        }
    }

    if !result.groups.is_empty() {
        let _ = writeln!(out, "\nTop groups:");
        for group in &result.groups {
            let _ = write!(
                out,
                "  #{} {} ({} keywords",
                group.group_id, group.primary_keyword, group.member_count
            );
            if let Some(volume) = group.search_volume {
                let _ = write!(out, ", volume {volume}");
            }
            let _ = writeln!(out, ")");
            if !group.example_members.is_empty() {
                let _ = writeln!(out, "      e.g. {}", group.example_members.join(", "));
            }
        }
    }
    let _ = writeln!(out, "{RULE}");
    out
}

/// Final summary for a run, with a hint on what to do next.
pub fn render_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::ReturnedWithoutWait { task_id, .. } => format!(
            "Task {task_id} submitted. Check it later with:\n  semagi status {task_id}\n"
        ),
        Outcome::Completed {
            task_id,
            elapsed,
            attempts,
            result,
        } => format!(
            "Task {task_id} completed in {} after {attempts} status checks.\n{}",
            secs(*elapsed),
            render_result(result)
        ),
        Outcome::Failed {
            task_id, message, ..
        } => format!(
            "Task {task_id} failed on the server: {}\n",
            message.as_deref().unwrap_or("no details given")
        ),
        Outcome::TimedOut {
            task_id,
            elapsed,
            last_status,
        } => format!(
            "Stopped waiting after {} (last status: {last_status}). The task may still finish.\n\
             Check again later with:\n  semagi wait {task_id}\n",
            secs(*elapsed)
        ),
        Outcome::Cancelled { task_id, .. } => format!(
            "Interrupted. Task {task_id} keeps running on the server.\n\
             Check it later with:\n  semagi status {task_id}\n"
        ),
        Outcome::TransportFailure { task_id, error, .. } => format!(
            "Lost contact with the service while tracking task {task_id}: {error}\n\
             Check it later with:\n  semagi status {task_id}\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semagi_core::task::{GroupId, GroupPreview, TaskStatus};

    #[test]
    fn result_lists_counts_links_and_groups() {
        let result = TaskResult {
            task_name: Some("shoes".into()),
            keyword_count: Some(120),
            group_count: Some(2),
            credit_cost: Some(12.0),
            csv_download_link: Some("https://files.example/r.csv".into()),
            groups: vec![GroupPreview {
                group_id: GroupId::Number(1),
                primary_keyword: "running shoes".into(),
                member_count: 4,
                example_members: vec!["trail shoes".into(), "jogging shoes".into()],
                search_volume: Some(5400),
            }],
            ..Default::default()
        };
        let text = render_result(&result);
        assert!(text.contains("Task name:        shoes"));
        assert!(text.contains("Keywords:         120"));
        assert!(text.contains("CSV  https://files.example/r.csv"));
        assert!(!text.contains("JSON:"));
        assert!(text.contains("#1 running shoes (4 keywords, volume 5400)"));
        assert!(text.contains("e.g. trail shoes, jogging shoes"));
    }

    #[test]
    fn missing_links_are_reported_as_pending() {
        let text = render_result(&TaskResult::default());
        assert!(text.contains("still being generated"));
    }

    #[test]
    fn nested_layout_result_shows_files_scores_and_parameters() {
        let mut result = TaskResult {
            task_name: Some("shoes".into()),
            csv_download_link: Some("https://files.example/r.csv".into()),
            csv_file_name: Some("shoes.csv".into()),
            json_download_link: Some("https://files.example/r.json".into()),
            ..Default::default()
        };
        result
            .other_downloads
            .insert("xlsx".into(), "https://files.example/r.xlsx".into());
        result.quality.insert("overall".into(), 87.4);
        result
            .parameters
            .insert("grouping.force_group".into(), "enabled".into());

        let text = render_result(&result);
        assert!(text.contains("  CSV  https://files.example/r.csv"));
        assert!(text.contains("       file: shoes.csv"));
        assert!(text.contains("  JSON https://files.example/r.json"));
        assert!(text.contains("  XLSX https://files.example/r.xlsx"));
        assert!(text.contains("Quality scores:\n  overall: 87.4"));
        assert!(text.contains("  grouping.force_group: enabled"));
        assert!(!text.contains("still being generated"));
    }

    #[test]
    fn unrecognised_layout_is_not_reported_as_pending() {
        let result = TaskResult {
            unrecognized_fields: vec!["outputs".into(), "summary".into()],
            ..Default::default()
        };
        let text = render_result(&result);
        assert!(text.contains("Fields received: outputs, summary"));
        assert!(text.contains("No download links found"));
        assert!(!text.contains("still being generated"));
    }

    #[test]
    fn timeout_suggests_requerying_by_id() {
        let text = render_outcome(&Outcome::TimedOut {
            task_id: "t-9".into(),
            elapsed: Duration::from_secs(1800),
            last_status: TaskStatus::Running,
        });
        assert!(text.contains("last status: running"));
        assert!(text.contains("semagi wait t-9"));
    }

    #[test]
    fn progress_line_shows_remaining_and_next_interval() {
        let line = render_progress(&PollProgress {
            attempt: 3,
            elapsed: Duration::from_millis(47_500),
            status: TaskStatus::Running,
            estimated_seconds: Some(120.0),
            remaining: Some(Duration::from_millis(72_300)),
            next_poll_in: Some(Duration::from_millis(10_208)),
        });
        assert_eq!(
            line,
            "[03] running (waited 47.5s) - about 72s left, next check in 10.2s"
        );
    }
}
