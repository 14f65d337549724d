use std::path::PathBuf;

use super::config::WorkspaceConfig;

/// A loaded workspace: config plus where it lives. Job task sets are loaded
/// on demand, one per command.
#[derive(Debug)]
pub struct Workspace {
    /// Directory containing `.jobtasks/`
    pub root: PathBuf,
    /// Path to the `.jobtasks/` directory
    pub data_dir: PathBuf,
    /// Parsed config.toml
    pub config: WorkspaceConfig,
}
