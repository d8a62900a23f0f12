use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Upper bound on any single git invocation.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(10);

pub const IDENTITY_NAME: &str = "git-safety";
pub const IDENTITY_EMAIL: &str = "git-safety@localhost";

#[derive(Debug, Error)]
enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("git {0} timed out after {1:?}")]
    Timeout(String, Duration),
    #[error("{0}")]
    Failed(String),
}

/// Result of one git invocation. Never an `Err`: failures are folded into
/// `success == false` with whatever text explains them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub success: bool,
    /// Trimmed stdout on success, trimmed stderr (or the error) on failure.
    pub output: String,
}

impl GitOutput {
    fn ok(output: String) -> Self {
        Self { success: true, output }
    }

    fn failed(err: GitError) -> Self {
        Self {
            success: false,
            output: err.to_string(),
        }
    }
}

/// Handle on one working directory. Every call shells out to `git` with
/// that directory as `current_dir`.
#[derive(Debug, Clone)]
pub struct Git {
    dir: PathBuf,
    timeout: Duration,
}

impl Git {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            timeout: GIT_TIMEOUT,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ---------------------------------------------------------------
    // Command executor
    // ---------------------------------------------------------------

    pub fn run(&self, args: &[&str]) -> GitOutput {
        let result = match self.try_run(args) {
            Ok(stdout) => GitOutput::ok(stdout),
            Err(err) => GitOutput::failed(err),
        };
        debug!(
            dir = %self.dir.display(),
            args = ?args,
            success = result.success,
            "git {}",
            args.first().copied().unwrap_or_default()
        );
        result
    }

    fn try_run(&self, args: &[&str]) -> Result<String, GitError> {
        let mut child = Command::new("git")
            .args(args)
            .current_dir(&self.dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(GitError::Spawn)?;

        // Drain both pipes on their own threads so a chatty command can't
        // fill a pipe buffer and stall until the timeout.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match child.wait_timeout(self.timeout).map_err(GitError::Spawn)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(GitError::Timeout(args.join(" "), self.timeout));
            }
        };

        let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();

        if status.success() {
            Ok(stdout.trim().to_string())
        } else {
            let stderr = stderr.trim();
            if stderr.is_empty() {
                Err(GitError::Failed(format!("git {} exited with {status}", args.join(" "))))
            } else {
                Err(GitError::Failed(stderr.to_string()))
            }
        }
    }

    // ---------------------------------------------------------------
    // Repository inspector (read-only)
    // ---------------------------------------------------------------

    pub fn is_repo(&self) -> bool {
        self.run(&["rev-parse", "--git-dir"]).success
    }

    /// Branch HEAD points at, or `None` when detached or unreadable.
    pub fn current_branch(&self) -> Option<String> {
        let out = self.run(&["symbolic-ref", "--short", "-q", "HEAD"]);
        (out.success && !out.output.is_empty()).then_some(out.output)
    }

    pub fn has_changes(&self) -> bool {
        let out = self.status_porcelain();
        out.success && !out.output.is_empty()
    }

    pub fn has_staged_changes(&self) -> bool {
        // Before the first commit there is no HEAD to diff against.
        if !self.run(&["rev-parse", "--verify", "-q", "HEAD"]).success {
            let out = self.run(&["ls-files", "--cached"]);
            return out.success && !out.output.is_empty();
        }
        let out = self.run(&["diff", "--cached", "--name-only"]);
        out.success && !out.output.is_empty()
    }

    pub fn has_origin_remote(&self) -> bool {
        let out = self.run(&["remote"]);
        out.success && out.output.lines().any(|r| r.trim() == "origin")
    }

    pub fn branch_exists(&self, name: &str) -> bool {
        let reference = format!("refs/heads/{name}");
        self.run(&["rev-parse", "--verify", "-q", &reference]).success
    }

    pub fn status_porcelain(&self) -> GitOutput {
        self.run(&["status", "--porcelain"])
    }

    /// Absolute path of the repository's metadata directory.
    pub fn git_dir(&self) -> Option<PathBuf> {
        let out = self.run(&["rev-parse", "--absolute-git-dir"]);
        out.success.then(|| PathBuf::from(out.output))
    }

    /// The last `count` commits with the files each one touched.
    pub fn recent_log(&self, count: usize) -> Option<String> {
        let limit = format!("-{count}");
        let out = self.run(&["log", &limit, "--name-only", "--format=%h %s"]);
        if !out.success {
            return None;
        }
        // --name-only separates each subject from its file list with a blank line.
        let lines: Vec<&str> = out.output.lines().filter(|l| !l.trim().is_empty()).collect();
        (!lines.is_empty()).then(|| lines.join("\n"))
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    pub fn init(&self) -> GitOutput {
        self.run(&["init"])
    }

    pub fn configure_identity(&self) -> bool {
        let name = self.run(&["config", "user.name", IDENTITY_NAME]);
        let email = self.run(&["config", "user.email", IDENTITY_EMAIL]);
        if !(name.success && email.success) {
            warn!("could not configure commit identity");
        }
        name.success && email.success
    }

    pub fn stage_all(&self) -> GitOutput {
        self.run(&["add", "-A"])
    }

    pub fn commit(&self, message: &str) -> GitOutput {
        self.run(&["commit", "-q", "-m", message])
    }

    pub fn pull_ff_only(&self, branch: &str) -> GitOutput {
        self.run(&["pull", "--ff-only", "origin", branch])
    }

    pub fn checkout_new_branch(&self, name: &str) -> GitOutput {
        self.run(&["checkout", "-b", name])
    }

    pub fn push_upstream(&self, branch: &str) -> GitOutput {
        self.run(&["push", "-u", "origin", branch])
    }

    /// Commit id HEAD resolves to, if any.
    pub fn head(&self) -> Option<String> {
        let out = self.run(&["rev-parse", "-q", "--verify", "HEAD"]);
        out.success.then_some(out.output)
    }
}

fn drain(mut pipe: impl Read + Send + 'static) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}
