#![allow(dead_code)]

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};

const CONFIG_VARS: &[&str] = &[
    "GIT_SAFETY_PROTECTED_BRANCHES",
    "GIT_SAFETY_BRANCH_PREFIX",
    "GIT_SAFETY_AUTO_PUSH",
    "GIT_SAFETY_AUTO_PULL",
    "GIT_SAFETY_CHECKPOINT",
    "GIT_SAFETY_VERBOSE",
    "GIT_SAFETY_CHECKPOINT_COOLDOWN_MS",
    "GIT_SAFETY_COMMIT_TEMPLATE",
    "GIT_SAFETY_CHECKPOINT_TEMPLATE",
    "RUST_LOG",
];

pub struct Run {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Run {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(self.stdout.trim())
            .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {:?}", self.stdout))
    }

    /// `systemMessage` for session modes.
    pub fn message(&self) -> Option<String> {
        self.json()["systemMessage"].as_str().map(String::from)
    }

    /// `additionalContext` for the checkpoint mode.
    pub fn context(&self) -> Option<String> {
        self.json()["hookSpecificOutput"]["additionalContext"]
            .as_str()
            .map(String::from)
    }
}

/// Run the binary with `args`, feeding `stdin`, with a scrubbed environment
/// plus `env`. Global and system git config are ignored so the host's
/// settings can't leak into commits.
pub fn run_cli_in(args: &[&str], stdin: &str, env: &[(&str, &str)], cwd: Option<&Path>) -> Run {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_git-safety"));
    cmd.args(args)
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for var in CONFIG_VARS {
        cmd.env_remove(var);
    }
    for (k, v) in env {
        cmd.env(k, v);
    }
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let mut child = cmd.spawn().expect("failed to spawn binary");

    // Usage errors exit before reading stdin, so the write may hit a closed pipe.
    // Dropping the handle closes our end.
    if let Err(e) = child.stdin.take().unwrap().write_all(stdin.as_bytes()) {
        assert_eq!(e.kind(), io::ErrorKind::BrokenPipe, "writing stdin: {e}");
    }

    let output = child.wait_with_output().unwrap();
    Run {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}

pub fn run_cli(args: &[&str], stdin: &str) -> Run {
    run_cli_in(args, stdin, &[], None)
}

pub fn run_with_env(args: &[&str], stdin: &str, env: &[(&str, &str)]) -> Run {
    run_cli_in(args, stdin, env, None)
}

pub fn session_input(cwd: &Path) -> String {
    serde_json::json!({
        "session_id": "test-session",
        "cwd": cwd.to_str().unwrap(),
    })
    .to_string()
}

pub fn tool_input(cwd: &Path, tool_name: &str, tool_input: serde_json::Value) -> String {
    serde_json::json!({
        "session_id": "test-session",
        "cwd": cwd.to_str().unwrap(),
        "tool_name": tool_name,
        "tool_input": tool_input,
    })
    .to_string()
}

/// Create a temp dir containing a git repo on `main` with one commit
/// tracking `README.md`. The `TempDir` must be kept alive for the test.
pub fn temp_git_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = git2::RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = git2::Repository::init_opts(dir.path(), &opts).unwrap();

    // Configure user identity for commits.
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test").unwrap();
    config.set_str("user.email", "test@test.com").unwrap();

    fs::write(dir.path().join("README.md"), "# test repo\n").unwrap();
    commit_all(dir.path(), "initial");
    dir
}

/// Stage everything and commit with git2.
pub fn commit_all(path: &Path, message: &str) -> git2::Oid {
    let repo = git2::Repository::open(path).unwrap();
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree_oid = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let sig = repo.signature().unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// Run the git CLI in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Create a bare repository, register it as `origin` of `repo`, and push
/// `main` to it.
pub fn add_origin(repo: &Path) -> tempfile::TempDir {
    let bare = tempfile::tempdir().unwrap();
    let mut opts = git2::RepositoryInitOptions::new();
    opts.bare(true).initial_head("main");
    git2::Repository::init_opts(bare.path(), &opts).unwrap();
    git(repo, &["remote", "add", "origin", bare.path().to_str().unwrap()]);
    git(repo, &["push", "-q", "origin", "main"]);
    bare
}

/// Clone `origin`, commit `file` there, and push it back to `main`.
pub fn push_from_other_clone(origin: &Path, file: &str) -> tempfile::TempDir {
    let other = tempfile::tempdir().unwrap();
    let clone_dir = other.path().join("clone");
    git(
        other.path(),
        &["clone", "-q", origin.to_str().unwrap(), clone_dir.to_str().unwrap()],
    );
    git(&clone_dir, &["config", "user.name", "Other"]);
    git(&clone_dir, &["config", "user.email", "other@test.com"]);
    git(&clone_dir, &["checkout", "-q", "main"]);
    fs::write(clone_dir.join(file), "from elsewhere\n").unwrap();
    git(&clone_dir, &["add", "-A"]);
    git(&clone_dir, &["commit", "-q", "-m", "remote change"]);
    git(&clone_dir, &["push", "-q", "origin", "main"]);
    other
}

pub fn current_branch(path: &Path) -> String {
    let repo = git2::Repository::open(path).unwrap();
    let head = repo.head().unwrap();
    head.shorthand().unwrap().to_string()
}

pub fn commit_count(path: &Path) -> usize {
    let repo = git2::Repository::open(path).unwrap();
    let mut walk = repo.revwalk().unwrap();
    walk.push_head().unwrap();
    walk.count()
}

pub fn head_message(path: &Path) -> String {
    let repo = git2::Repository::open(path).unwrap();
    let commit = repo.head().unwrap().peel_to_commit().unwrap();
    commit.message().unwrap().trim().to_string()
}

pub fn is_clean(path: &Path) -> bool {
    let repo = git2::Repository::open(path).unwrap();
    let mut opts = git2::StatusOptions::new();
    opts.include_untracked(true).include_ignored(false);
    repo.statuses(Some(&mut opts)).unwrap().is_empty()
}

pub fn checkout(path: &Path, branch: &str) {
    git(path, &["checkout", "-q", branch]);
}

pub fn today() -> String {
    chrono::Local::now().format("%Y%m%d").to_string()
}
