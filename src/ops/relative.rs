use std::collections::HashSet;

use crate::model::task::{TaskId, TaskSet};
use crate::model::update::{Anchor, DropMode, RelativePositionUpdate};
use crate::ops::drop_zone::ResolvedDrop;
use crate::ops::hierarchy::{FlatRow, visual_order};

/// Turn a resolved drop into anchor-relative updates.
///
/// The first dragged task (in visual order) is anchored on its nearest
/// non-dragged neighbour at the drop point; every further task is anchored
/// after the one before it, so the selection lands as one contiguous run.
pub fn calculate(
    drop: &ResolvedDrop,
    dragged_ids: &[TaskId],
    rows: &[FlatRow<'_>],
    tasks: &TaskSet,
) -> Vec<RelativePositionUpdate> {
    let ordered = in_visual_order(dragged_ids, tasks);
    let Some((first, rest)) = ordered.split_first() else {
        return Vec::new();
    };

    let dragged: HashSet<&str> = ordered.iter().map(|id| id.as_str()).collect();
    let parent = drop.parent_id.as_deref();
    let anchor = match drop.mode {
        DropMode::Nest => Anchor::Last,
        DropMode::Reorder => neighbour_anchor(drop.insert_index, parent, &dragged, rows, tasks),
    };

    let mut updates = Vec::with_capacity(ordered.len());
    updates.push(RelativePositionUpdate::new(first.clone(), parent, anchor));
    let mut previous = first;
    for id in rest {
        updates.push(RelativePositionUpdate::new(
            id.clone(),
            parent,
            Anchor::AfterTaskId(previous.clone()),
        ));
        previous = id;
    }
    updates
}

/// De-duplicate and sort by pre-order index. Ids the job does not know keep
/// their given order at the end; the engine rejects them later.
fn in_visual_order(dragged_ids: &[TaskId], tasks: &TaskSet) -> Vec<TaskId> {
    let order = visual_order(tasks);
    let mut seen = HashSet::new();
    let mut ids: Vec<TaskId> = dragged_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();
    ids.sort_by_key(|id| order.get(id).copied().unwrap_or(usize::MAX));
    ids
}

/// Nearest sibling in the target scope around the insertion point
fn neighbour_anchor(
    insert_index: usize,
    parent: Option<&str>,
    dragged: &HashSet<&str>,
    rows: &[FlatRow<'_>],
    tasks: &TaskSet,
) -> Anchor {
    let split = insert_index.min(rows.len());
    let (above, below) = rows.split_at(split);

    // the root scope starts at the top of the list, a child scope at its parent's row
    let mut at_scope_start = parent.is_none();
    for row in above.iter().rev() {
        if let Some(pid) = parent {
            if row.id() == pid {
                at_scope_start = true;
                break;
            }
            if !tasks.is_descendant_of(row.id(), pid) {
                break;
            }
        }
        if dragged.contains(row.id()) {
            continue;
        }
        if row.parent_id == parent {
            return Anchor::AfterTaskId(row.task.id.clone());
        }
    }
    // hidden siblings may sit above the first visible one
    if at_scope_start {
        return Anchor::First;
    }

    for row in below {
        if let Some(pid) = parent
            && !tasks.is_descendant_of(row.id(), pid)
        {
            break;
        }
        if dragged.contains(row.id()) {
            continue;
        }
        if row.parent_id == parent {
            return Anchor::BeforeTaskId(row.task.id.clone());
        }
    }

    Anchor::Last
}
