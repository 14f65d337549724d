use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How long CLI writers wait before giving up
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

const FIRST_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_millis(80);

/// Exclusive right to rewrite job and config files in one workspace.
///
/// Every `jt` process that changes `.jobtasks/` takes this first, so a
/// reorder always re-reads the job another process just saved. The holder's
/// pid is written into `.jobtasks/.lock` so a waiter can say who it waited on.
/// The lock file is never removed, since waiters may still have it open.
#[derive(Debug)]
pub struct WorkspaceLock {
    file: File,
    path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not open workspace lock {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("workspace is busy: {path} still held{} after {waited:?}", holder_suffix(.holder))]
    Busy {
        path: PathBuf,
        waited: Duration,
        holder: Option<u32>,
    },
}

fn holder_suffix(holder: &Option<u32>) -> String {
    holder.map(|pid| format!(" by pid {}", pid)).unwrap_or_default()
}

impl WorkspaceLock {
    /// Take the lock on `<data_dir>/.lock`, retrying with growing pauses
    /// until `wait` runs out
    pub fn acquire(data_dir: &Path, wait: Duration) -> Result<Self, LockError> {
        let path = data_dir.join(".lock");
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Open {
                path: path.clone(),
                source,
            })?;

        let start = Instant::now();
        let mut backoff = FIRST_BACKOFF;
        while !try_flock(&file) {
            let waited = start.elapsed();
            if waited >= wait {
                return Err(LockError::Busy {
                    holder: read_holder(&mut file),
                    path,
                    waited,
                });
            }
            std::thread::sleep(backoff.min(wait - waited));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        if let Err(e) = record_holder(&mut file) {
            tracing::debug!(error = %e, "could not record lock holder");
        }
        tracing::trace!(path = %path.display(), "workspace lock taken");
        Ok(WorkspaceLock { file, path })
    }

    pub fn acquire_default(data_dir: &Path) -> Result<Self, LockError> {
        Self::acquire(data_dir, DEFAULT_WAIT)
    }

    /// Pid recorded by whoever holds the lock now
    pub fn holder(&mut self) -> Option<u32> {
        read_holder(&mut self.file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn record_holder(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}

fn read_holder(file: &mut File) -> Option<u32> {
    let mut text = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut text).ok()?;
    text.trim().parse().ok()
}

#[cfg(unix)]
fn try_flock(file: &File) -> bool {
    use std::os::unix::io::AsRawFd;
    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) == 0 }
}

// Advisory only; other platforms run unserialized
#[cfg(not(unix))]
fn try_flock(_file: &File) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn holder_pid_is_recorded() {
        let tmp = TempDir::new().unwrap();
        let mut lock = WorkspaceLock::acquire_default(tmp.path()).unwrap();
        assert_eq!(lock.holder(), Some(std::process::id()));
        assert_eq!(lock.path(), tmp.path().join(".lock"));
    }

    #[test]
    fn writers_take_turns() {
        let tmp = TempDir::new().unwrap();
        let first = WorkspaceLock::acquire_default(tmp.path()).unwrap();
        drop(first);
        // the file stays behind and is simply reused
        assert!(tmp.path().join(".lock").exists());
        assert!(WorkspaceLock::acquire(tmp.path(), Duration::from_millis(50)).is_ok());
    }

    #[test]
    fn missing_workspace_dir_is_an_open_error() {
        let tmp = TempDir::new().unwrap();
        let err = WorkspaceLock::acquire_default(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, LockError::Open { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn busy_workspace_names_the_holder() {
        let tmp = TempDir::new().unwrap();
        let _saving = WorkspaceLock::acquire_default(tmp.path()).unwrap();
        let err = WorkspaceLock::acquire(tmp.path(), Duration::from_millis(30)).unwrap_err();
        match &err {
            LockError::Busy { holder, waited, .. } => {
                assert_eq!(*holder, Some(std::process::id()));
                assert!(*waited >= Duration::from_millis(30));
            }
            other => panic!("expected Busy, got {:?}", other),
        }
        assert!(err.to_string().contains("by pid"));
    }
}
