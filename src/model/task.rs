use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Opaque, stable task identifier
pub type TaskId = String;

/// Work status of a task. Ordering ignores it; visibility filters use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Parse the snake_case name used in config files and CLI flags
    pub fn from_name(name: &str) -> Option<TaskStatus> {
        match name {
            "open" => Some(TaskStatus::Open),
            "in_progress" => Some(TaskStatus::InProgress),
            "on_hold" => Some(TaskStatus::OnHold),
            "completed" => Some(TaskStatus::Completed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Single-character marker used by the text listing
    pub fn marker(self) -> char {
        match self {
            TaskStatus::Open => ' ',
            TaskStatus::InProgress => '>',
            TaskStatus::OnHold => '~',
            TaskStatus::Completed => 'x',
            TaskStatus::Cancelled => '-',
        }
    }
}

/// A single work item under a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    /// Parent task; `None` places the task in the job's root scope
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    /// 1-based, dense within the task's scope
    pub position: u32,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>, position: u32) -> Self {
        Task {
            id: id.into(),
            title: title.into(),
            status: TaskStatus::Open,
            parent_id: None,
            position,
        }
    }

    /// Builder-style parent assignment, mostly for fixtures
    pub fn with_parent(mut self, parent_id: impl Into<TaskId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}

/// All tasks of one job, keyed by id in load order.
///
/// Children are never stored on the task; `children_index` derives them on
/// demand so the collection holds no back references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSet {
    pub job_id: String,
    #[serde(with = "task_list")]
    pub tasks: IndexMap<TaskId, Task>,
}

impl TaskSet {
    pub fn new(job_id: impl Into<String>, tasks: impl IntoIterator<Item = Task>) -> Self {
        TaskSet {
            job_id: job_id.into(),
            tasks: tasks.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Like `new`, but a repeated id is an error instead of replacing the
    /// earlier task. Returns the first repeated id.
    pub fn try_new(
        job_id: impl Into<String>,
        tasks: impl IntoIterator<Item = Task>,
    ) -> Result<Self, TaskId> {
        Ok(TaskSet {
            job_id: job_id.into(),
            tasks: index_unique(tasks)?,
        })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// The scope a task participates in. A parent id that names a task
    /// missing from the set is treated as the root scope.
    pub fn effective_parent<'a>(&'a self, task: &'a Task) -> Option<&'a str> {
        task.parent_id
            .as_deref()
            .filter(|pid| self.tasks.contains_key(*pid))
    }

    /// Ids in one scope, ordered by position. Ties (only possible in
    /// malformed input) fall back to load order.
    pub fn scope(&self, parent_id: Option<&str>) -> Vec<TaskId> {
        let mut members: Vec<(u32, usize, &TaskId)> = self
            .tasks
            .values()
            .enumerate()
            .filter(|(_, t)| self.effective_parent(t) == parent_id)
            .map(|(i, t)| (t.position, i, &t.id))
            .collect();
        members.sort_by_key(|(pos, i, _)| (*pos, *i));
        members.into_iter().map(|(_, _, id)| id.clone()).collect()
    }

    /// Parent → ordered children, recomputed from the flat collection
    pub fn children_index(&self) -> HashMap<Option<&str>, Vec<&Task>> {
        let mut index: HashMap<Option<&str>, Vec<(usize, &Task)>> = HashMap::new();
        for (i, task) in self.tasks.values().enumerate() {
            index
                .entry(self.effective_parent(task))
                .or_default()
                .push((i, task));
        }
        index
            .into_iter()
            .map(|(parent, mut children)| {
                children.sort_by_key(|(i, t)| (t.position, *i));
                (parent, children.into_iter().map(|(_, t)| t).collect())
            })
            .collect()
    }

    pub fn has_children(&self, id: &str) -> bool {
        self.tasks
            .values()
            .any(|t| t.parent_id.as_deref() == Some(id))
    }

    /// Walk `parent_id` upwards from `id`, nearest ancestor first. Stops at a
    /// root, a dangling parent, or a repeated id in corrupt data.
    pub fn ancestors(&self, id: &str) -> Vec<TaskId> {
        let mut chain: Vec<TaskId> = Vec::new();
        let mut current = self.tasks.get(id).and_then(|t| self.effective_parent(t));
        while let Some(pid) = current {
            if pid == id || chain.iter().any(|c| c == pid) {
                break;
            }
            chain.push(pid.to_string());
            current = self.tasks.get(pid).and_then(|t| self.effective_parent(t));
        }
        chain
    }

    /// True when `ancestor_id` appears on the parent chain of `id`
    pub fn is_descendant_of(&self, id: &str, ancestor_id: &str) -> bool {
        self.ancestors(id).iter().any(|a| a == ancestor_id)
    }

    /// Rewrite positions of the given scope to 1..N in its current order
    pub fn renumber_scope(&mut self, parent_id: Option<&str>) {
        let ordered = self.scope(parent_id);
        self.assign_positions(&ordered);
    }

    /// Assign 1..N to the ids in the given order
    pub(crate) fn assign_positions(&mut self, ordered: &[TaskId]) {
        for (i, id) in ordered.iter().enumerate() {
            if let Some(task) = self.tasks.get_mut(id) {
                task.position = i as u32 + 1;
            }
        }
    }
}

fn index_unique(tasks: impl IntoIterator<Item = Task>) -> Result<IndexMap<TaskId, Task>, TaskId> {
    let mut index = IndexMap::new();
    for task in tasks {
        if index.contains_key(&task.id) {
            return Err(task.id);
        }
        index.insert(task.id.clone(), task);
    }
    Ok(index)
}

/// Job files store tasks as a plain JSON array.
mod task_list {
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Task, TaskId};

    pub fn serialize<S>(tasks: &IndexMap<TaskId, Task>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(tasks.values())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<IndexMap<TaskId, Task>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<Task>::deserialize(deserializer)?;
        super::index_unique(list)
            .map_err(|id| serde::de::Error::custom(format!("duplicate task id {}", id)))
    }
}
