use std::collections::HashMap;

use serde::Serialize;

use crate::model::task::{TaskId, TaskSet};
use crate::model::update::{Anchor, RelativePositionUpdate};

/// Structural errors. Any of these rejects the whole batch before the
/// caller's collection is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("cannot nest {task_id} under {parent_id}: it would become its own ancestor")]
    CircularNesting { task_id: TaskId, parent_id: TaskId },
    #[error("invalid anchor for {task_id} ({anchor}): {reason}")]
    InvalidAnchor {
        task_id: TaskId,
        anchor: Anchor,
        reason: String,
    },
    #[error("task not found: {0}")]
    UnknownTask(TaskId),
    #[error("parent task not found: {0}")]
    UnknownParent(TaskId),
}

/// Concrete placement produced by one applied update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub id: TaskId,
    pub parent_id: Option<TaskId>,
    pub position: u32,
}

/// Result of an optimistic apply: the new collection plus what each update
/// resolved to
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub tasks: TaskSet,
    pub operations: Vec<Placement>,
}

/// Apply relative updates one at a time, each against the state left by the
/// previous one, renumbering the touched scopes densely after every step.
///
/// The input is never modified. On error nothing is returned but the error.
pub fn apply(
    tasks: &TaskSet,
    updates: &[RelativePositionUpdate],
) -> Result<ApplyOutcome, EngineError> {
    validate(tasks, updates)?;

    let start = ApplyOutcome {
        tasks: tasks.clone(),
        operations: Vec::with_capacity(updates.len()),
    };
    let mut outcome = updates.iter().try_fold(start, |mut acc, update| {
        let placement = apply_one(&mut acc.tasks, update)?;
        acc.operations.push(placement);
        Ok(acc)
    })?;

    // later steps can shift tasks placed earlier in the batch
    for placement in &mut outcome.operations {
        if let Some(task) = outcome.tasks.get(&placement.id) {
            placement.parent_id = task.parent_id.clone();
            placement.position = task.position;
        }
    }
    Ok(outcome)
}

/// Check every update for unknown ids, self-anchoring and cycles. Parent
/// changes from earlier updates in the batch are simulated, so a batch whose
/// updates are each fine alone but cyclic together is rejected.
pub fn validate(tasks: &TaskSet, updates: &[RelativePositionUpdate]) -> Result<(), EngineError> {
    let mut parents: HashMap<&str, Option<&str>> = tasks
        .iter()
        .map(|t| (t.id.as_str(), tasks.effective_parent(t)))
        .collect();

    for update in updates {
        if !tasks.contains(&update.id) {
            return Err(EngineError::UnknownTask(update.id.clone()));
        }
        if let Some(anchor_id) = update.anchor.task_id() {
            if anchor_id == update.id {
                return Err(EngineError::InvalidAnchor {
                    task_id: update.id.clone(),
                    anchor: update.anchor.clone(),
                    reason: "a task cannot be positioned relative to itself".into(),
                });
            }
            if !tasks.contains(anchor_id) {
                return Err(EngineError::InvalidAnchor {
                    task_id: update.id.clone(),
                    anchor: update.anchor.clone(),
                    reason: format!("anchor task {} does not exist", anchor_id),
                });
            }
        }

        if let Some(parent_id) = update.parent_id.as_deref() {
            if !tasks.contains(parent_id) {
                return Err(EngineError::UnknownParent(parent_id.to_string()));
            }
            if creates_cycle(&parents, &update.id, parent_id) {
                return Err(EngineError::CircularNesting {
                    task_id: update.id.clone(),
                    parent_id: parent_id.to_string(),
                });
            }
        }
        parents.insert(update.id.as_str(), update.parent_id.as_deref());
    }
    Ok(())
}

/// Walk up from `parent_id`; meeting `task_id` means the move closes a loop
fn creates_cycle(parents: &HashMap<&str, Option<&str>>, task_id: &str, parent_id: &str) -> bool {
    let mut current = Some(parent_id);
    let mut steps = 0usize;
    while let Some(id) = current {
        if id == task_id {
            return true;
        }
        // Pre-existing corrupt loops must not hang the walk
        steps += 1;
        if steps > parents.len() {
            return false;
        }
        current = parents.get(id).copied().flatten();
    }
    false
}

fn apply_one(tasks: &mut TaskSet, update: &RelativePositionUpdate) -> Result<Placement, EngineError> {
    let task = tasks
        .get(&update.id)
        .ok_or_else(|| EngineError::UnknownTask(update.id.clone()))?;
    let old_parent = tasks.effective_parent(task).map(str::to_string);
    let new_parent = update.parent_id.clone();

    // 1. leave the old scope
    let mut old_scope = tasks.scope(old_parent.as_deref());
    old_scope.retain(|id| id != &update.id);
    tasks.assign_positions(&old_scope);

    // 2. resolve the anchor against the scope as it is right now
    let mut new_scope = if new_parent == old_parent {
        old_scope
    } else {
        tasks.scope(new_parent.as_deref())
    };
    new_scope.retain(|id| id != &update.id);
    let index = insertion_index(&new_scope, update)?;

    // 3. insert and renumber
    new_scope.insert(index, update.id.clone());
    if let Some(task) = tasks.get_mut(&update.id) {
        task.parent_id = new_parent.clone();
    }
    tasks.assign_positions(&new_scope);

    // 4. record
    Ok(Placement {
        id: update.id.clone(),
        parent_id: new_parent,
        position: index as u32 + 1,
    })
}

fn insertion_index(scope: &[TaskId], update: &RelativePositionUpdate) -> Result<usize, EngineError> {
    let locate = |anchor_id: &str| {
        scope
            .iter()
            .position(|id| id == anchor_id)
            .ok_or_else(|| EngineError::InvalidAnchor {
                task_id: update.id.clone(),
                anchor: update.anchor.clone(),
                reason: match &update.parent_id {
                    Some(pid) => format!("anchor task {} is not a child of {}", anchor_id, pid),
                    None => format!("anchor task {} is not in the root scope", anchor_id),
                },
            })
    };
    match &update.anchor {
        Anchor::AfterTaskId(anchor_id) => locate(anchor_id).map(|i| i + 1),
        Anchor::BeforeTaskId(anchor_id) => locate(anchor_id),
        Anchor::First => Ok(0),
        Anchor::Last => Ok(scope.len()),
    }
}

/// Every task whose parent or position differs between two versions of a job
pub fn diff_positions(before: &TaskSet, after: &TaskSet) -> Vec<Placement> {
    after
        .iter()
        .filter(|t| {
            before
                .get(&t.id)
                .is_none_or(|b| b.position != t.position || b.parent_id != t.parent_id)
        })
        .map(|t| Placement {
            id: t.id.clone(),
            parent_id: t.parent_id.clone(),
            position: t.position,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::Task;
    use crate::ops::check::check_tasks;

    fn roots(ids: &[&str]) -> TaskSet {
        TaskSet::new(
            "J-1",
            ids.iter()
                .enumerate()
                .map(|(i, id)| Task::new(*id, *id, i as u32 + 1)),
        )
    }

    fn order(tasks: &TaskSet, parent: Option<&str>) -> Vec<(String, u32)> {
        tasks
            .scope(parent)
            .into_iter()
            .map(|id| {
                let pos = tasks.get(&id).unwrap().position;
                (id, pos)
            })
            .collect()
    }

    fn after(id: &str, anchor: &str) -> RelativePositionUpdate {
        RelativePositionUpdate::new(id, None, Anchor::AfterTaskId(anchor.into()))
    }

    #[test]
    fn move_first_after_last() {
        let tasks = roots(&["A", "B", "C"]);
        let out = apply(&tasks, &[after("A", "C")]).unwrap();
        assert_eq!(
            order(&out.tasks, None),
            vec![("B".into(), 1), ("C".into(), 2), ("A".into(), 3)]
        );
        assert_eq!(
            out.operations,
            vec![Placement {
                id: "A".into(),
                parent_id: None,
                position: 3
            }]
        );
        // input untouched
        assert_eq!(order(&tasks, None)[0], ("A".into(), 1));
    }

    #[test]
    fn before_first_and_last_anchors() {
        let tasks = roots(&["A", "B", "C", "D"]);
        let out = apply(
            &tasks,
            &[
                RelativePositionUpdate::new("D", None, Anchor::BeforeTaskId("B".into())),
                RelativePositionUpdate::new("C", None, Anchor::First),
                RelativePositionUpdate::new("A", None, Anchor::Last),
            ],
        )
        .unwrap();
        let ids: Vec<String> = out.tasks.scope(None);
        assert_eq!(ids, vec!["C", "D", "B", "A"]);
        assert!(check_tasks(&out.tasks).valid);
    }

    #[test]
    fn after_own_predecessor_is_noop() {
        let tasks = roots(&["A", "B", "C"]);
        let out = apply(&tasks, &[after("B", "A")]).unwrap();
        assert_eq!(out.tasks, tasks);
        assert!(diff_positions(&tasks, &out.tasks).is_empty());
    }

    #[test]
    fn nest_under_childless_sibling() {
        let tasks = roots(&["A", "B"]);
        let out = apply(
            &tasks,
            &[RelativePositionUpdate::new("B", Some("A"), Anchor::Last)],
        )
        .unwrap();
        let b = out.tasks.get("B").unwrap();
        assert_eq!(b.parent_id.as_deref(), Some("A"));
        assert_eq!(b.position, 1);
        assert_eq!(out.tasks.get("A").unwrap().position, 1);
    }

    #[test]
    fn old_scope_is_closed_up() {
        let tasks = TaskSet::new(
            "J-1",
            vec![
                Task::new("P", "p", 1),
                Task::new("Q", "q", 2),
                Task::new("P1", "p1", 1).with_parent("P"),
                Task::new("P2", "p2", 2).with_parent("P"),
                Task::new("P3", "p3", 3).with_parent("P"),
            ],
        );
        let out = apply(
            &tasks,
            &[RelativePositionUpdate::new("P2", None, Anchor::AfterTaskId("P".into()))],
        )
        .unwrap();
        assert_eq!(
            order(&out.tasks, Some("P")),
            vec![("P1".into(), 1), ("P3".into(), 2)]
        );
        assert_eq!(
            order(&out.tasks, None),
            vec![("P".into(), 1), ("P2".into(), 2), ("Q".into(), 3)]
        );
    }

    #[test]
    fn chained_updates_see_earlier_moves() {
        // C then A chained after it, both landing after E
        let tasks = roots(&["A", "B", "C", "D", "E"]);
        let out = apply(&tasks, &[after("C", "E"), after("A", "C")]).unwrap();
        assert_eq!(out.tasks.scope(None), vec!["B", "D", "E", "C", "A"]);
        assert_eq!(out.operations[0].position, 4);
        assert_eq!(out.operations[1].position, 5);
        assert_eq!(out.tasks.get("C").unwrap().position, 4);
    }

    #[test]
    fn placements_report_final_positions() {
        let tasks = roots(&["A", "B", "C", "D"]);
        let batch = vec![
            RelativePositionUpdate::new("D", None, Anchor::First),
            RelativePositionUpdate::new("B", Some("D"), Anchor::Last),
            RelativePositionUpdate::new("C", None, Anchor::BeforeTaskId("D".into())),
        ];
        let out = apply(&tasks, &batch).unwrap();
        for placement in &out.operations {
            let task = out.tasks.get(&placement.id).unwrap();
            assert_eq!(placement.position, task.position, "{}", placement.id);
            assert_eq!(placement.parent_id, task.parent_id, "{}", placement.id);
        }
        assert_eq!(out.operations[0].position, 2);
    }

    #[test]
    fn cycle_rejected_without_mutation() {
        let tasks = TaskSet::new(
            "J-1",
            vec![Task::new("A", "a", 1), Task::new("B", "b", 1).with_parent("A")],
        );
        let err = apply(
            &tasks,
            &[RelativePositionUpdate::new("A", Some("B"), Anchor::Last)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            EngineError::CircularNesting {
                task_id: "A".into(),
                parent_id: "B".into()
            }
        );
    }

    #[test]
    fn self_parent_rejected() {
        let tasks = roots(&["A"]);
        let err = apply(
            &tasks,
            &[RelativePositionUpdate::new("A", Some("A"), Anchor::Last)],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::CircularNesting { .. }));
    }

    #[test]
    fn cycle_across_batch_rejected() {
        // each update is fine against the starting state; together they loop
        let tasks = roots(&["X", "Y"]);
        let err = apply(
            &tasks,
            &[
                RelativePositionUpdate::new("X", Some("Y"), Anchor::Last),
                RelativePositionUpdate::new("Y", Some("X"), Anchor::Last),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            EngineError::CircularNesting {
                task_id: "Y".into(),
                parent_id: "X".into()
            }
        );
    }

    #[test]
    fn anchor_errors() {
        let tasks = TaskSet::new(
            "J-1",
            vec![
                Task::new("A", "a", 1),
                Task::new("B", "b", 2),
                Task::new("A1", "a1", 1).with_parent("A"),
            ],
        );
        assert!(matches!(
            apply(&tasks, &[after("A", "A")]),
            Err(EngineError::InvalidAnchor { .. })
        ));
        assert!(matches!(
            apply(&tasks, &[after("A", "nope")]),
            Err(EngineError::InvalidAnchor { .. })
        ));
        // anchor exists but lives in another scope
        assert!(matches!(
            apply(&tasks, &[after("B", "A1")]),
            Err(EngineError::InvalidAnchor { .. })
        ));
        assert_eq!(
            apply(&tasks, &[after("Z", "A")]).unwrap_err(),
            EngineError::UnknownTask("Z".into())
        );
        assert_eq!(
            apply(
                &tasks,
                &[RelativePositionUpdate::new("B", Some("nope"), Anchor::Last)]
            )
            .unwrap_err(),
            EngineError::UnknownParent("nope".into())
        );
    }

    #[test]
    fn late_failure_leaves_no_partial_state() {
        let tasks = roots(&["A", "B", "C"]);
        let result = apply(
            &tasks,
            &[
                after("A", "C"),
                // B is a root, not a child of C
                RelativePositionUpdate::new("B", Some("C"), Anchor::AfterTaskId("A".into())),
            ],
        );
        assert!(matches!(result, Err(EngineError::InvalidAnchor { .. })));
        assert_eq!(tasks.scope(None), vec!["A", "B", "C"]);
    }

    #[test]
    fn gaps_in_input_are_repaired_in_touched_scopes() {
        let tasks = TaskSet::new(
            "J-1",
            vec![Task::new("A", "a", 3), Task::new("B", "b", 7), Task::new("C", "c", 9)],
        );
        let out = apply(&tasks, &[after("A", "B")]).unwrap();
        assert_eq!(
            order(&out.tasks, None),
            vec![("B".into(), 1), ("A".into(), 2), ("C".into(), 3)]
        );
    }

    #[test]
    fn diff_lists_changed_tasks() {
        let tasks = roots(&["A", "B", "C"]);
        let out = apply(&tasks, &[after("A", "B")]).unwrap();
        let changed: Vec<String> = diff_positions(&tasks, &out.tasks)
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(changed, vec!["A", "B"]);
    }
}
