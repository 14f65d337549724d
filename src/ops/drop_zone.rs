use crate::model::config::BoundaryPolicy;
use crate::model::task::TaskId;
use crate::model::update::{DropMode, DropZoneDescriptor, Edge};
use crate::ops::hierarchy::FlatRow;
use crate::ops::positioning::EngineError;

/// Error type for drop resolution
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropError {
    #[error("drop target is not in the visible list: {0}")]
    UnknownTarget(TaskId),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A drop zone with its scope worked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDrop {
    pub mode: DropMode,
    pub target_task_id: TaskId,
    /// Scope the dragged tasks will join
    pub parent_id: Option<TaskId>,
    /// Insertion point in the flattened sequence
    pub insert_index: usize,
}

/// Resolve a drop descriptor against the rows the user was looking at.
///
/// `drop_index` comes from the drag collaborator when it has one; otherwise
/// it is derived from the descriptor's edge.
pub fn resolve(
    zone: &DropZoneDescriptor,
    drop_index: Option<usize>,
    dragged_ids: &[TaskId],
    rows: &[FlatRow<'_>],
    policy: BoundaryPolicy,
) -> Result<ResolvedDrop, DropError> {
    let derived = drop_index_for(zone, rows)?;
    let insert_index = drop_index.unwrap_or(derived).min(rows.len());
    let parent_id = resolve_parent(
        insert_index,
        zone.mode,
        &zone.target_task_id,
        dragged_ids,
        rows,
        policy,
    )?;
    Ok(ResolvedDrop {
        mode: zone.mode,
        target_task_id: zone.target_task_id.clone(),
        parent_id,
        insert_index,
    })
}

/// Insertion index implied by the edge of the target row
pub fn drop_index_for(zone: &DropZoneDescriptor, rows: &[FlatRow<'_>]) -> Result<usize, DropError> {
    let target = rows
        .iter()
        .position(|r| r.id() == zone.target_task_id)
        .ok_or_else(|| DropError::UnknownTarget(zone.target_task_id.clone()))?;
    Ok(match zone.edge {
        Some(Edge::Below) => target + 1,
        Some(Edge::Above) | None => target,
    })
}

/// Which scope a drop lands in.
///
/// Nesting always targets the row itself. Reordering reads depth continuity
/// between the row above the insertion point and the row at it. A drop just
/// below a row whose children follow it is ambiguous; `policy` decides.
pub fn resolve_parent(
    drop_index: usize,
    mode: DropMode,
    target_task_id: &str,
    dragged_ids: &[TaskId],
    rows: &[FlatRow<'_>],
    policy: BoundaryPolicy,
) -> Result<Option<TaskId>, DropError> {
    if mode == DropMode::Nest {
        if !rows.iter().any(|r| r.id() == target_task_id) {
            return Err(DropError::UnknownTarget(target_task_id.to_string()));
        }
        if dragged_ids.iter().any(|id| id == target_task_id) {
            return Err(EngineError::CircularNesting {
                task_id: target_task_id.to_string(),
                parent_id: target_task_id.to_string(),
            }
            .into());
        }
        return Ok(Some(target_task_id.to_string()));
    }

    let index = drop_index.min(rows.len());
    if index == 0 {
        return Ok(None);
    }
    let prev = &rows[index - 1];
    let next = rows.get(index);
    let next_is_deeper = next.is_some_and(|n| n.depth > prev.depth);

    if next_is_deeper && policy == BoundaryPolicy::FirstChild {
        return Ok(Some(prev.task.id.clone()));
    }
    if prev.depth == 0 {
        return Ok(None);
    }
    let parent = match next {
        Some(next) if next.depth == prev.depth => next.parent_id,
        // deeper follower, end of a subtree, or end of list
        _ => prev.parent_id,
    };
    Ok(parent.map(str::to_string))
}
