//! Keyboard-driven reordering of the focused task.
//!
//! Each command turns into a single `RelativePositionUpdate` so it goes
//! through the same engine and reconciliation path as a drag. `None` means
//! the command has nothing to do at this spot (top of scope, no parent, ...).

use crate::model::task::TaskSet;
use crate::model::update::{Anchor, RelativePositionUpdate};

/// Which keyboard reorder was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMove {
    Up,
    Down,
    Indent,
    Outdent,
}

pub fn plan(tasks: &TaskSet, task_id: &str, key_move: KeyMove) -> Option<RelativePositionUpdate> {
    match key_move {
        KeyMove::Up => move_up(tasks, task_id),
        KeyMove::Down => move_down(tasks, task_id),
        KeyMove::Indent => indent(tasks, task_id),
        KeyMove::Outdent => outdent(tasks, task_id),
    }
}

/// Swap with the previous sibling
pub fn move_up(tasks: &TaskSet, task_id: &str) -> Option<RelativePositionUpdate> {
    let (parent, prev, _) = neighbours(tasks, task_id)?;
    Some(RelativePositionUpdate::new(
        task_id,
        parent.as_deref(),
        Anchor::BeforeTaskId(prev?),
    ))
}

/// Swap with the next sibling
pub fn move_down(tasks: &TaskSet, task_id: &str) -> Option<RelativePositionUpdate> {
    let (parent, _, next) = neighbours(tasks, task_id)?;
    Some(RelativePositionUpdate::new(
        task_id,
        parent.as_deref(),
        Anchor::AfterTaskId(next?),
    ))
}

/// Become the last child of the previous sibling
pub fn indent(tasks: &TaskSet, task_id: &str) -> Option<RelativePositionUpdate> {
    let (_, prev, _) = neighbours(tasks, task_id)?;
    Some(RelativePositionUpdate::new(
        task_id,
        Some(prev?.as_str()),
        Anchor::Last,
    ))
}

/// Become the next sibling of the current parent
pub fn outdent(tasks: &TaskSet, task_id: &str) -> Option<RelativePositionUpdate> {
    let task = tasks.get(task_id)?;
    let parent = tasks.get(tasks.effective_parent(task)?)?;
    Some(RelativePositionUpdate::new(
        task_id,
        tasks.effective_parent(parent),
        Anchor::AfterTaskId(parent.id.clone()),
    ))
}

/// (scope, previous sibling, next sibling)
fn neighbours(
    tasks: &TaskSet,
    task_id: &str,
) -> Option<(Option<String>, Option<String>, Option<String>)> {
    let task = tasks.get(task_id)?;
    let parent = tasks.effective_parent(task).map(str::to_string);
    let scope = tasks.scope(parent.as_deref());
    let index = scope.iter().position(|id| id == task_id)?;
    let prev = index.checked_sub(1).map(|i| scope[i].clone());
    let next = scope.get(index + 1).cloned();
    Some((parent, prev, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::Task;
    use crate::ops::positioning::apply;

    fn job() -> TaskSet {
        TaskSet::new(
            "J-1",
            vec![
                Task::new("A", "a", 1),
                Task::new("B", "b", 2),
                Task::new("B1", "b1", 1).with_parent("B"),
                Task::new("C", "c", 3),
            ],
        )
    }

    fn run(tasks: &TaskSet, id: &str, key_move: KeyMove) -> TaskSet {
        let update = plan(tasks, id, key_move).unwrap();
        apply(tasks, &[update]).unwrap().tasks
    }

    #[test]
    fn up_and_down_swap_neighbours() {
        let tasks = job();
        assert_eq!(run(&tasks, "C", KeyMove::Up).scope(None), vec!["A", "C", "B"]);
        assert_eq!(run(&tasks, "A", KeyMove::Down).scope(None), vec!["B", "A", "C"]);
    }

    #[test]
    fn edges_of_scope_do_nothing() {
        let tasks = job();
        assert!(move_up(&tasks, "A").is_none());
        assert!(move_down(&tasks, "C").is_none());
        assert!(indent(&tasks, "A").is_none());
        assert!(outdent(&tasks, "A").is_none());
        assert!(move_up(&tasks, "B1").is_none());
        assert!(plan(&tasks, "nope", KeyMove::Down).is_none());
    }

    #[test]
    fn indent_joins_previous_sibling_as_last_child() {
        let tasks = job();
        let out = run(&tasks, "C", KeyMove::Indent);
        assert_eq!(out.scope(Some("B")), vec!["B1", "C"]);
        assert_eq!(out.scope(None), vec!["A", "B"]);
    }

    #[test]
    fn outdent_lands_after_former_parent() {
        let tasks = job();
        let out = run(&tasks, "B1", KeyMove::Outdent);
        assert_eq!(out.scope(None), vec!["A", "B", "B1", "C"]);
        assert!(out.scope(Some("B")).is_empty());
    }
}
