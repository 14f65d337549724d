use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::task::{Task, TaskId, TaskSet};

/// A task with its visible children attached, borrowed from a `TaskSet`
#[derive(Debug, Clone)]
pub struct TreeNode<'a> {
    pub task: &'a Task,
    /// Scope key of the task in the set (effective parent)
    pub parent_id: Option<&'a str>,
    pub children: Vec<TreeNode<'a>>,
}

/// One row of the flattened render sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRow<'a> {
    pub task: &'a Task,
    pub parent_id: Option<&'a str>,
    pub depth: usize,
    pub has_subtasks: bool,
    pub is_expanded: bool,
}

impl FlatRow<'_> {
    pub fn id(&self) -> &str {
        &self.task.id
    }
}

/// Build the visible forest for a job. Hidden tasks take their whole
/// subtree with them.
pub fn organize<F>(tasks: &TaskSet, is_visible: F) -> Vec<TreeNode<'_>>
where
    F: Fn(&Task) -> bool,
{
    organize_with(tasks, is_visible, false)
}

/// Like `organize`, but with `promote_orphans` the visible descendants of a
/// hidden task are appended to the root level instead of being dropped.
pub fn organize_with<F>(tasks: &TaskSet, is_visible: F, promote_orphans: bool) -> Vec<TreeNode<'_>>
where
    F: Fn(&Task) -> bool,
{
    let index = tasks.children_index();
    let mut orphans = Vec::new();
    let mut roots = build_level(
        &index,
        None,
        &is_visible,
        promote_orphans,
        &mut orphans,
    );
    roots.append(&mut orphans);
    roots
}

fn build_level<'a, F>(
    index: &HashMap<Option<&'a str>, Vec<&'a Task>>,
    parent: Option<&'a str>,
    is_visible: &F,
    promote_orphans: bool,
    orphans: &mut Vec<TreeNode<'a>>,
) -> Vec<TreeNode<'a>>
where
    F: Fn(&Task) -> bool,
{
    let Some(children) = index.get(&parent) else {
        return Vec::new();
    };
    let mut nodes = Vec::new();
    for &task in children {
        let below = build_level(
            index,
            Some(task.id.as_str()),
            is_visible,
            promote_orphans,
            orphans,
        );
        if is_visible(task) {
            nodes.push(TreeNode {
                task,
                parent_id: parent,
                children: below,
            });
        } else if promote_orphans {
            orphans.extend(below);
        }
    }
    nodes
}

/// Pre-order traversal; a task's children follow it only while it is expanded
pub fn flatten<'a>(tree: &[TreeNode<'a>], expanded: &ExpansionState) -> Vec<FlatRow<'a>> {
    let mut rows = Vec::new();
    flatten_inner(tree, 0, &mut rows, &|id| expanded.is_expanded(id));
    rows
}

/// Flatten as if every task were expanded
pub fn flatten_all<'a>(tree: &[TreeNode<'a>]) -> Vec<FlatRow<'a>> {
    let mut rows = Vec::new();
    flatten_inner(tree, 0, &mut rows, &|_| true);
    rows
}

fn flatten_inner<'a>(
    nodes: &[TreeNode<'a>],
    depth: usize,
    rows: &mut Vec<FlatRow<'a>>,
    is_open: &dyn Fn(&str) -> bool,
) {
    for node in nodes {
        let has_subtasks = !node.children.is_empty();
        let is_expanded = has_subtasks && is_open(&node.task.id);
        rows.push(FlatRow {
            task: node.task,
            parent_id: node.parent_id,
            depth,
            has_subtasks,
            is_expanded,
        });
        if is_expanded {
            flatten_inner(&node.children, depth + 1, rows, is_open);
        }
    }
}

/// Ordered ids of a flattened sequence
pub fn flat_ids(rows: &[FlatRow<'_>]) -> Vec<TaskId> {
    rows.iter().map(|r| r.task.id.clone()).collect()
}

/// Pre-order index of every task reachable from a root, ignoring filters
/// and collapse state. This is the order a user reads a fully open list in.
pub fn visual_order(tasks: &TaskSet) -> HashMap<TaskId, usize> {
    let tree = organize(tasks, |_| true);
    flatten_all(&tree)
        .into_iter()
        .enumerate()
        .map(|(i, row)| (row.task.id.clone(), i))
        .collect()
}

/// Expand/collapse state for one job's list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionState {
    #[serde(default)]
    pub expanded: BTreeSet<TaskId>,
    /// Set once the one-time expand-on-load has run
    #[serde(default)]
    pub auto_expanded: bool,
}

impl ExpansionState {
    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    /// Returns true if the set changed
    pub fn expand(&mut self, id: &str) -> bool {
        self.expanded.insert(id.to_string())
    }

    /// Returns true if the set changed
    pub fn collapse(&mut self, id: &str) -> bool {
        self.expanded.remove(id)
    }

    /// Flip one task; returns the new expanded state
    pub fn toggle(&mut self, id: &str) -> bool {
        if !self.collapse(id) {
            self.expand(id);
            true
        } else {
            false
        }
    }

    /// Expand every task that has children, but only the first time this is
    /// called for this state. Returns true if it ran.
    pub fn auto_expand_once(&mut self, tasks: &TaskSet) -> bool {
        if self.auto_expanded {
            return false;
        }
        for task in tasks.iter() {
            if tasks.has_children(&task.id) {
                self.expanded.insert(task.id.clone());
            }
        }
        self.auto_expanded = true;
        true
    }

    /// Forget ids that no longer exist in the job
    pub fn retain_existing(&mut self, tasks: &TaskSet) {
        self.expanded.retain(|id| tasks.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::TaskStatus;

    fn job() -> TaskSet {
        TaskSet::new(
            "J-1",
            vec![
                Task::new("C", "Paint", 2),
                Task::new("A", "Demo", 1),
                Task::new("A2", "Haul debris", 2).with_parent("A"),
                Task::new("A1", "Remove cabinets", 1).with_parent("A"),
                Task::new("A1x", "Disconnect sink", 1).with_parent("A1"),
                Task::new("D", "Walkthrough", 3).with_status(TaskStatus::Cancelled),
                Task::new("D1", "Photos", 1).with_parent("D"),
            ],
        )
    }

    fn open_all(tasks: &TaskSet) -> ExpansionState {
        let mut state = ExpansionState::default();
        state.auto_expand_once(tasks);
        state
    }

    #[test]
    fn organize_sorts_each_scope() {
        let tasks = job();
        let tree = organize(&tasks, |_| true);
        let roots: Vec<&str> = tree.iter().map(|n| n.task.id.as_str()).collect();
        assert_eq!(roots, vec!["A", "C", "D"]);
        let kids: Vec<&str> = tree[0].children.iter().map(|n| n.task.id.as_str()).collect();
        assert_eq!(kids, vec!["A1", "A2"]);
    }

    #[test]
    fn hidden_task_hides_subtree() {
        let tasks = job();
        let tree = organize(&tasks, |t| t.status != TaskStatus::Cancelled);
        let ids = flat_ids(&flatten_all(&tree));
        assert_eq!(ids, vec!["A", "A1", "A1x", "A2", "C"]);
    }

    #[test]
    fn promote_orphans_surfaces_visible_children() {
        let tasks = job();
        let tree = organize_with(&tasks, |t| t.status != TaskStatus::Cancelled, true);
        let rows = flatten_all(&tree);
        let last = rows.last().unwrap();
        assert_eq!(last.id(), "D1");
        assert_eq!(last.depth, 0);
        assert_eq!(last.parent_id, Some("D"));
    }

    #[test]
    fn dangling_parent_becomes_root() {
        let tasks = TaskSet::new(
            "J-1",
            vec![
                Task::new("A", "a", 1),
                Task::new("Z", "z", 2).with_parent("missing"),
            ],
        );
        let rows = flatten_all(&organize(&tasks, |_| true));
        assert_eq!(flat_ids(&rows), vec!["A", "Z"]);
        assert_eq!(rows[1].depth, 0);
    }

    #[test]
    fn flatten_respects_collapse() {
        let tasks = job();
        let tree = organize(&tasks, |_| true);

        let collapsed = flatten(&tree, &ExpansionState::default());
        assert_eq!(flat_ids(&collapsed), vec!["A", "C", "D"]);
        assert!(collapsed[0].has_subtasks);
        assert!(!collapsed[0].is_expanded);

        let mut state = ExpansionState::default();
        state.expand("A");
        let rows = flatten(&tree, &state);
        assert_eq!(flat_ids(&rows), vec!["A", "A1", "A2", "C", "D"]);
        assert_eq!(rows[1].depth, 1);
        assert!(rows[1].has_subtasks);
        assert!(!rows[1].is_expanded);
    }

    #[test]
    fn leaf_is_never_expanded() {
        let tasks = job();
        let tree = organize(&tasks, |_| true);
        let mut state = ExpansionState::default();
        state.expand("C");
        let rows = flatten(&tree, &state);
        let c = rows.iter().find(|r| r.id() == "C").unwrap();
        assert!(!c.has_subtasks);
        assert!(!c.is_expanded);
    }

    #[test]
    fn toggle_and_idempotent_updates() {
        let mut state = ExpansionState::default();
        assert!(state.expand("A"));
        assert!(!state.expand("A"));
        assert!(!state.toggle("A"));
        assert!(!state.is_expanded("A"));
        assert!(!state.collapse("A"));
        assert!(state.toggle("A"));
        assert!(state.is_expanded("A"));
    }

    #[test]
    fn auto_expand_runs_once() {
        let tasks = job();
        let mut state = open_all(&tasks);
        assert!(state.is_expanded("A"));
        assert!(state.is_expanded("A1"));
        assert!(!state.is_expanded("C"));

        state.collapse("A");
        assert!(!state.auto_expand_once(&tasks));
        assert!(!state.is_expanded("A"));
    }

    #[test]
    fn retain_existing_prunes() {
        let tasks = job();
        let mut state = open_all(&tasks);
        state.expand("ghost");
        state.retain_existing(&tasks);
        assert!(!state.is_expanded("ghost"));
        assert!(state.is_expanded("A"));
    }

    #[test]
    fn visual_order_is_full_preorder() {
        let order = visual_order(&job());
        assert_eq!(order["A"], 0);
        assert_eq!(order["A1"], 1);
        assert_eq!(order["A1x"], 2);
        assert_eq!(order["A2"], 3);
        assert_eq!(order["C"], 4);
        assert_eq!(order["D"], 5);
        assert_eq!(order["D1"], 6);
    }
}
