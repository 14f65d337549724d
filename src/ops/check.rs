use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::model::task::{TaskId, TaskSet};

/// Structured result from `jt check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// An invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckError {
    /// Positions in a scope are not exactly 1..N
    #[serde(rename = "non_dense_scope")]
    NonDenseScope {
        parent_id: Option<TaskId>,
        positions: Vec<u32>,
    },
    /// Following parent_id from this task comes back to it
    #[serde(rename = "cycle")]
    Cycle { task_id: TaskId },
}

/// A non-critical issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckWarning {
    /// parent_id names a task that is not in the job; shown as a root
    #[serde(rename = "dangling_parent")]
    DanglingParent { task_id: TaskId, parent_id: TaskId },
}

/// Validate the density and acyclicity invariants of one job.
///
/// This is a read-only operation.
pub fn check_tasks(tasks: &TaskSet) -> CheckResult {
    let mut result = CheckResult::default();

    check_density(tasks, &mut result);
    check_cycles(tasks, &mut result);

    for task in tasks.iter() {
        if let Some(pid) = &task.parent_id
            && !tasks.contains(pid)
        {
            result.warnings.push(CheckWarning::DanglingParent {
                task_id: task.id.clone(),
                parent_id: pid.clone(),
            });
        }
    }

    result.valid = result.errors.is_empty();
    result
}

fn check_density(tasks: &TaskSet, result: &mut CheckResult) {
    // BTreeMap keeps error order stable: root scope first, then by parent id
    let mut scopes: BTreeMap<Option<&str>, Vec<u32>> = BTreeMap::new();
    for task in tasks.iter() {
        scopes
            .entry(tasks.effective_parent(task))
            .or_default()
            .push(task.position);
    }
    for (parent, mut positions) in scopes {
        positions.sort_unstable();
        let dense = positions
            .iter()
            .enumerate()
            .all(|(i, p)| *p == i as u32 + 1);
        if !dense {
            result.errors.push(CheckError::NonDenseScope {
                parent_id: parent.map(str::to_string),
                positions,
            });
        }
    }
}

fn check_cycles(tasks: &TaskSet, result: &mut CheckResult) {
    for task in tasks.iter() {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = tasks.effective_parent(task);
        while let Some(pid) = current {
            if pid == task.id {
                result.errors.push(CheckError::Cycle {
                    task_id: task.id.clone(),
                });
                break;
            }
            // a loop further up that does not include this task
            if !seen.insert(pid) {
                break;
            }
            current = tasks.get(pid).and_then(|t| tasks.effective_parent(t));
        }
    }
}
