use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const STATE_DIR: &str = "git-safety";
const STATE_FILE: &str = "checkpoint.json";
const LOCK_FILE: &str = "checkpoint.lock";
const LOCK_RETRY: Duration = Duration::from_millis(25);

/// Persisted checkpoint timer. Stored as `<git-dir>/git-safety/checkpoint.json`
/// so it survives between hook processes without touching the work tree.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Milliseconds since the Unix epoch of the last successful checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_ms: Option<i64>,
}

/// Exclusive hold on a repository's checkpoint timer.
///
/// Concurrent checkpoint hooks on the same repository queue on the lock, so
/// the cooldown check and commit happen together with the timer update.
/// Released when dropped.
pub struct CheckpointGuard {
    _lock: File,
    path: PathBuf,
}

impl CheckpointGuard {
    /// Take the lock under `git_dir`, retrying for up to `wait`. `None` when
    /// another process still holds it after that.
    pub fn acquire(git_dir: &Path, wait: Duration) -> Result<Option<Self>> {
        let dir = git_dir.join(STATE_DIR);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("opening {}", lock_path.display()))?;

        let deadline = Instant::now() + wait;
        loop {
            match lock.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    thread::sleep(LOCK_RETRY);
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("locking {}", lock_path.display()));
                }
            }
        }

        Ok(Some(Self {
            _lock: lock,
            path: dir.join(STATE_FILE),
        }))
    }

    /// Current timer. A missing or corrupt file reads as "never".
    pub fn load(&self) -> Result<CheckpointState> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(serde_json::from_str(&s).unwrap_or_else(|err| {
                tracing::warn!(%err, path = %self.path.display(), "discarding unreadable checkpoint state");
                CheckpointState::default()
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(CheckpointState::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    pub fn record(&self, now_ms: i64) -> Result<()> {
        let state = CheckpointState {
            last_checkpoint_ms: Some(now_ms),
        };
        let json = serde_json::to_string_pretty(&state).context("serializing checkpoint state")?;
        fs::write(&self.path, json).with_context(|| format!("writing {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(1);

    #[test]
    fn missing_state_reads_as_never() {
        let dir = tempfile::tempdir().unwrap();
        let guard = CheckpointGuard::acquire(dir.path(), WAIT).unwrap().unwrap();
        assert_eq!(guard.load().unwrap(), CheckpointState::default());
    }

    #[test]
    fn record_survives_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        {
            let guard = CheckpointGuard::acquire(dir.path(), WAIT).unwrap().unwrap();
            guard.record(1_234).unwrap();
        }
        let guard = CheckpointGuard::acquire(dir.path(), WAIT).unwrap().unwrap();
        assert_eq!(guard.load().unwrap().last_checkpoint_ms, Some(1_234));
        assert!(dir.path().join("git-safety/checkpoint.json").is_file());
    }

    #[test]
    fn corrupt_state_reads_as_never() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(STATE_DIR)).unwrap();
        fs::write(dir.path().join(STATE_DIR).join(STATE_FILE), "{not json").unwrap();
        let guard = CheckpointGuard::acquire(dir.path(), WAIT).unwrap().unwrap();
        assert_eq!(guard.load().unwrap().last_checkpoint_ms, None);
    }

    #[test]
    fn lock_is_exclusive_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let guard = CheckpointGuard::acquire(dir.path(), WAIT).unwrap().unwrap();

        let other = OpenOptions::new()
            .read(true)
            .write(true)
            .open(dir.path().join(STATE_DIR).join(LOCK_FILE))
            .unwrap();
        assert!(other.try_lock_exclusive().is_err());

        drop(guard);
        assert!(other.try_lock_exclusive().is_ok());
    }

    #[test]
    fn busy_lock_gives_up_after_wait() {
        let dir = tempfile::tempdir().unwrap();
        let held = CheckpointGuard::acquire(dir.path(), WAIT).unwrap().unwrap();

        let started = Instant::now();
        let second = CheckpointGuard::acquire(dir.path(), Duration::from_millis(100)).unwrap();
        assert!(second.is_none());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < WAIT, "{:?}", started.elapsed());

        drop(held);
        assert!(CheckpointGuard::acquire(dir.path(), WAIT).unwrap().is_some());
    }
}
