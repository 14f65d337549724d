use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ops::hierarchy::ExpansionState;

/// Persisted view state (`.jobtasks/.state.json`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    /// Expansion state per job id
    #[serde(default)]
    pub jobs: BTreeMap<String, ExpansionState>,
}

impl ViewState {
    pub fn job_mut(&mut self, job_id: &str) -> &mut ExpansionState {
        self.jobs.entry(job_id.to_string()).or_default()
    }
}

/// Missing or unreadable state is treated as empty; it is only a view cache
pub fn read_view_state(data_dir: &Path) -> ViewState {
    let path = data_dir.join(".state.json");
    let Ok(content) = fs::read_to_string(&path) else {
        return ViewState::default();
    };
    match serde_json::from_str(&content) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed view state");
            ViewState::default()
        }
    }
}

pub fn write_view_state(data_dir: &Path, state: &ViewState) -> Result<(), std::io::Error> {
    let path = data_dir.join(".state.json");
    let content = serde_json::to_string_pretty(state)?;
    crate::io::job_io::atomic_write(&path, content.as_bytes())
}
