use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::io::lock::{LockError, WorkspaceLock};
use crate::model::config::WorkspaceConfig;
use crate::model::task::{Task, TaskSet};
use crate::model::update::RelativePositionUpdate;
use crate::model::workspace::Workspace;
use crate::ops::positioning;
use crate::sync::authority::{AuthorityError, OrderingAuthority, SubmitReply};

/// Name of the per-workspace data directory
pub const DATA_DIR: &str = ".jobtasks";

/// Error type for workspace I/O
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("not a jobtasks workspace: no .jobtasks/config.toml found")]
    NotAWorkspace,
    #[error("unknown job: {0}")]
    UnknownJob(String),
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config.toml: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error("could not edit config.toml: {0}")]
    ConfigEditError(#[from] toml_edit::TomlError),
    #[error("could not parse {path}: {source}")]
    JobParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Walk up from `start` looking for a directory holding `.jobtasks/config.toml`
pub fn discover_workspace(start: &Path) -> Result<PathBuf, WorkspaceError> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(DATA_DIR).join("config.toml").is_file() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(WorkspaceError::NotAWorkspace);
        }
    }
}

pub fn load_workspace(root: &Path) -> Result<Workspace, WorkspaceError> {
    let data_dir = root.join(DATA_DIR);
    let config_path = data_dir.join("config.toml");
    if !config_path.is_file() {
        return Err(WorkspaceError::NotAWorkspace);
    }
    let text = fs::read_to_string(&config_path).map_err(|e| WorkspaceError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;
    let config: WorkspaceConfig = toml::from_str(&text)?;
    tracing::debug!(root = %root.display(), jobs = config.jobs.len(), "workspace loaded");
    Ok(Workspace {
        root: root.to_path_buf(),
        data_dir,
        config,
    })
}

/// Path of a job's task file
pub fn job_path(ws: &Workspace, job_id: &str) -> Result<PathBuf, WorkspaceError> {
    ws.config
        .job(job_id)
        .map(|job| ws.data_dir.join(&job.file))
        .ok_or_else(|| WorkspaceError::UnknownJob(job_id.to_string()))
}

/// Load a job's tasks. A job whose file does not exist yet has no tasks.
pub fn load_job(ws: &Workspace, job_id: &str) -> Result<TaskSet, WorkspaceError> {
    read_job_file(&job_path(ws, job_id)?, job_id)
}

pub fn save_job(ws: &Workspace, tasks: &TaskSet) -> Result<(), WorkspaceError> {
    write_job_file(&job_path(ws, &tasks.job_id)?, tasks)
}

fn read_job_file(path: &Path, job_id: &str) -> Result<TaskSet, WorkspaceError> {
    if !path.exists() {
        return Ok(TaskSet::new(job_id, Vec::new()));
    }
    let text = fs::read_to_string(path).map_err(|e| WorkspaceError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| WorkspaceError::JobParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_job_file(path: &Path, tasks: &TaskSet) -> Result<(), WorkspaceError> {
    let mut content = serde_json::to_string_pretty(tasks).map_err(std::io::Error::from)?;
    content.push('\n');
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    atomic_write(path, content.as_bytes()).map_err(|e| WorkspaceError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write via a temp file in the same directory, then rename over the target
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Ordering authority backed by the workspace's job files.
///
/// Each submission takes the workspace lock (waiting at most the submission
/// timeout), re-reads the job from disk, renumbers it sequentially and
/// writes it back, so concurrent `jt` processes act like clients of one
/// shared service.
pub struct FileAuthority {
    data_dir: PathBuf,
    files: Vec<(String, PathBuf)>,
}

impl FileAuthority {
    pub fn new(ws: &Workspace) -> Self {
        FileAuthority {
            data_dir: ws.data_dir.clone(),
            files: ws
                .config
                .jobs
                .iter()
                .map(|job| (job.id.clone(), ws.data_dir.join(&job.file)))
                .collect(),
        }
    }

    fn path(&self, job_id: &str) -> Result<&Path, AuthorityError> {
        self.files
            .iter()
            .find(|(id, _)| id == job_id)
            .map(|(_, path)| path.as_path())
            .ok_or_else(|| AuthorityError::Rejected(format!("unknown job {}", job_id)))
    }

    fn lock(&self, timeout: Duration) -> Result<WorkspaceLock, AuthorityError> {
        WorkspaceLock::acquire(&self.data_dir, timeout).map_err(|e| match e {
            LockError::Busy { .. } => AuthorityError::Timeout(timeout),
            other => AuthorityError::Transport(other.to_string()),
        })
    }
}

impl OrderingAuthority for FileAuthority {
    fn submit(
        &mut self,
        job_id: &str,
        updates: &[RelativePositionUpdate],
        timeout: Duration,
    ) -> Result<SubmitReply, AuthorityError> {
        let path = self.path(job_id)?;
        let _lock = self.lock(timeout)?;
        let current = read_job_file(path, job_id).map_err(transport)?;
        let outcome = positioning::apply(&current, updates)
            .map_err(|e| AuthorityError::Rejected(e.to_string()))?;
        write_job_file(path, &outcome.tasks).map_err(transport)?;
        tracing::debug!(job_id, updates = updates.len(), path = %path.display(), "job written");
        Ok(SubmitReply::Ack)
    }

    fn fetch(&mut self, job_id: &str, timeout: Duration) -> Result<Vec<Task>, AuthorityError> {
        let path = self.path(job_id)?;
        let _lock = self.lock(timeout)?;
        let tasks = read_job_file(path, job_id).map_err(transport)?;
        Ok(tasks.iter().cloned().collect())
    }
}

fn transport(e: WorkspaceError) -> AuthorityError {
    AuthorityError::Transport(e.to_string())
}
