use serde::Serialize;
use unicode_width::UnicodeWidthChar;

use crate::model::task::{TaskStatus, TaskSet};
use crate::ops::check::{CheckError, CheckResult, CheckWarning};
use crate::ops::hierarchy::FlatRow;
use crate::ops::positioning::Placement;
use crate::sync::reconcile::Drift;

/// Titles longer than this many terminal columns are cut with an ellipsis
pub const TITLE_WIDTH: usize = 60;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct RowJson<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub status: TaskStatus,
    pub parent_id: Option<&'a str>,
    pub position: u32,
    pub depth: usize,
    pub has_subtasks: bool,
    pub is_expanded: bool,
}

#[derive(Serialize)]
pub struct ListJson<'a> {
    pub job: &'a str,
    pub rows: Vec<RowJson<'a>>,
}

#[derive(Serialize)]
pub struct ReorderJson<'a> {
    pub job: &'a str,
    pub applied: bool,
    pub operations: &'a [Placement],
    #[serde(skip_serializing_if = "no_drift")]
    pub drift: &'a [Drift],
}

fn no_drift(drift: &&[Drift]) -> bool {
    drift.is_empty()
}

#[derive(Serialize)]
pub struct JobInfoJson<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub file: &'a str,
}

pub fn row_to_json<'a>(row: &FlatRow<'a>) -> RowJson<'a> {
    RowJson {
        id: &row.task.id,
        title: &row.task.title,
        status: row.task.status,
        parent_id: row.parent_id,
        position: row.task.position,
        depth: row.depth,
        has_subtasks: row.has_subtasks,
        is_expanded: row.is_expanded,
    }
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

/// Cut `s` to at most `max` terminal columns, ending in `…` when cut
pub fn truncate_to_width(s: &str, max: usize) -> String {
    let total: usize = s.chars().map(|c| c.width().unwrap_or(0)).sum();
    if total <= max {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

/// One listing line: indentation, fold marker, status, id and title
pub fn format_row(row: &FlatRow<'_>) -> String {
    let fold = match (row.has_subtasks, row.is_expanded) {
        (true, true) => "▾ ",
        (true, false) => "▸ ",
        (false, _) => "  ",
    };
    format!(
        "{}{}[{}] {} {}",
        "  ".repeat(row.depth),
        fold,
        row.task.status.marker(),
        row.task.id,
        truncate_to_width(&row.task.title, TITLE_WIDTH)
    )
}

pub fn format_listing(header: &str, rows: &[FlatRow<'_>]) -> Vec<String> {
    let mut lines = vec![header.to_string(), String::new()];
    if rows.is_empty() {
        lines.push("(no tasks)".to_string());
    }
    lines.extend(rows.iter().map(format_row));
    lines
}

pub fn format_placement(tasks: &TaskSet, placement: &Placement) -> String {
    let scope = match &placement.parent_id {
        Some(pid) => match tasks.get(pid) {
            Some(parent) => format!("under {} {}", pid, parent.title),
            None => format!("under {}", pid),
        },
        None => "at root".to_string(),
    };
    format!("{} -> #{} {}", placement.id, placement.position, scope)
}

pub fn format_drift(drift: &Drift) -> String {
    let slot = |s: &Option<crate::sync::reconcile::Slot>| match s {
        Some(s) => format!(
            "#{} under {}",
            s.position,
            s.parent_id.as_deref().unwrap_or("root")
        ),
        None => "missing".to_string(),
    };
    format!(
        "{}: predicted {}, stored {}",
        drift.task_id,
        slot(&drift.predicted),
        slot(&drift.actual)
    )
}

pub fn format_check(result: &CheckResult) -> Vec<String> {
    let mut lines = Vec::new();
    if !result.errors.is_empty() {
        lines.push("Errors:".to_string());
        for err in &result.errors {
            match err {
                CheckError::NonDenseScope {
                    parent_id,
                    positions,
                } => {
                    let list: Vec<String> = positions.iter().map(u32::to_string).collect();
                    lines.push(format!(
                        "  scope {} has positions [{}]",
                        parent_id.as_deref().unwrap_or("root"),
                        list.join(", ")
                    ));
                }
                CheckError::Cycle { task_id } => {
                    lines.push(format!("  {} is its own ancestor", task_id));
                }
            }
        }
    }
    if !result.warnings.is_empty() {
        if !result.errors.is_empty() {
            lines.push(String::new());
        }
        lines.push("Warnings:".to_string());
        for warn in &result.warnings {
            match warn {
                CheckWarning::DanglingParent { task_id, parent_id } => {
                    lines.push(format!(
                        "  {} has missing parent {} (shown at root)",
                        task_id, parent_id
                    ));
                }
            }
        }
    }
    if result.valid {
        lines.push("✓ job is valid".to_string());
    } else {
        lines.push("✗ job has errors".to_string());
    }
    lines
}

/// Parse a status name given on the command line
pub fn parse_status(s: &str) -> Result<TaskStatus, String> {
    TaskStatus::from_name(s).ok_or_else(|| {
        format!(
            "unknown status '{}' (expected: open, in_progress, on_hold, completed, cancelled)",
            s
        )
    })
}
