use crate::model::config::BoundaryPolicy;
use crate::model::task::TaskSet;
use crate::model::update::{DropEvent, RelativePositionUpdate};
use crate::ops::drop_zone::{self, DropError};
use crate::ops::hierarchy::FlatRow;
use crate::ops::positioning::{self, ApplyOutcome};
use crate::ops::relative;

/// Turn one drag-end event into relative updates.
///
/// Returns `Ok(None)` for an aborted drag (released outside any zone, or
/// nothing dragged); nothing downstream runs in that case.
pub fn plan_drop(
    event: &DropEvent,
    rows: &[FlatRow<'_>],
    tasks: &TaskSet,
    policy: BoundaryPolicy,
) -> Result<Option<Vec<RelativePositionUpdate>>, DropError> {
    let Some(zone) = &event.zone else {
        return Ok(None);
    };
    if event.dragged_ids.is_empty() {
        return Ok(None);
    }
    let drop = drop_zone::resolve(zone, event.drop_index, &event.dragged_ids, rows, policy)?;
    Ok(Some(relative::calculate(
        &drop,
        &event.dragged_ids,
        rows,
        tasks,
    )))
}

/// Plan and apply a drop locally without talking to the authority
pub fn preview_drop(
    event: &DropEvent,
    rows: &[FlatRow<'_>],
    tasks: &TaskSet,
    policy: BoundaryPolicy,
) -> Result<Option<ApplyOutcome>, DropError> {
    match plan_drop(event, rows, tasks, policy)? {
        Some(updates) => Ok(Some(positioning::apply(tasks, &updates)?)),
        None => Ok(None),
    }
}
