use serde::{Deserialize, Serialize};

use super::task::TaskStatus;

/// Configuration from `.jobtasks/config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub workspace: WorkspaceInfo,
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
    #[serde(default)]
    pub drop: DropConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl WorkspaceConfig {
    pub fn job(&self, job_id: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.id == job_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub id: String,
    pub name: String,
    /// Task file, relative to the `.jobtasks/` directory
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Expand every parent the first time a job is shown
    #[serde(default = "default_true")]
    pub auto_expand: bool,
    /// Show visible children of hidden parents as roots instead of hiding them
    #[serde(default)]
    pub promote_orphans: bool,
    /// Statuses hidden from the listing unless asked for
    #[serde(default = "default_hidden_statuses")]
    pub hide_statuses: Vec<TaskStatus>,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        HierarchyConfig {
            auto_expand: true,
            promote_orphans: false,
            hide_statuses: default_hidden_statuses(),
        }
    }
}

/// Resolution of an edge drop just below a row whose children follow it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Next sibling of the row above (nesting requires an explicit nest drop)
    #[default]
    Sibling,
    /// First child of the row above
    FirstChild,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DropConfig {
    #[serde(default)]
    pub boundary: BoundaryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Re-fetch after each successful submission and diff predicted positions
    #[serde(default)]
    pub verify_positions: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            verify_positions: false,
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_hidden_statuses() -> Vec<TaskStatus> {
    vec![TaskStatus::Cancelled]
}

fn default_timeout_ms() -> u64 {
    10_000
}
