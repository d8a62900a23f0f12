use anyhow::Result;
use chrono::{Local, Utc};
use serde_json::json;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::{Config, DEFAULT_CHECKPOINT_TEMPLATE, DEFAULT_COMMIT_TEMPLATE};
use crate::git::{GIT_TIMEOUT, Git};
use crate::policy::{self, CheckpointTrigger};
use crate::state::CheckpointGuard;
use crate::types::{PreToolUseEvent, SessionEndEvent, SessionStartEvent};

const RECENT_COMMITS: usize = 3;
const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// One hook invocation against one working directory.
///
/// Handlers return the message for the caller, or `None` when there is
/// nothing to say. Git failures never surface as errors here; only local
/// state-file I/O can.
pub struct Session<'a> {
    git: Git,
    config: &'a Config,
}

impl<'a> Session<'a> {
    pub fn new(cwd: &Path, config: &'a Config) -> Self {
        Self {
            git: Git::new(cwd),
            config,
        }
    }

    // ---------------------------------------------------------------
    // SessionStart
    // ---------------------------------------------------------------

    pub fn handle_session_start(&self, event: &SessionStartEvent) -> Result<Option<String>> {
        if event.common.cleared {
            debug!("context cleared; skipping session start");
            return Ok(None);
        }
        if !self.git.dir().is_dir() {
            debug!(dir = %self.git.dir().display(), "working directory missing");
            return Ok(None);
        }
        if !self.git.is_repo() {
            return Ok(self.initialize());
        }

        let mut branch = self.git.current_branch();
        let dirty = self.git.has_changes();

        if let Some(current) = branch.as_deref() {
            if dirty && self.config.is_protected(current) {
                return Ok(Some(format!(
                    "Warning: on protected branch '{current}' with uncommitted changes. \
                     Skipping pull and branch creation; commit or stash these changes first."
                )));
            }
        }

        let mut notes: Vec<String> = Vec::new();

        if let Some(current) = branch.as_deref() {
            if self.config.auto_pull && !dirty && self.git.has_origin_remote() {
                notes.extend(self.pull(current));
            }
        }

        if let Some(current) = branch.clone() {
            if self.config.is_protected(&current) {
                let name = policy::branch_name(
                    &self.config.branch_prefix,
                    Local::now().date_naive(),
                    |candidate| self.git.branch_exists(candidate),
                );
                let checkout = self.git.checkout_new_branch(&name);
                if checkout.success {
                    notes.push(format!("Created working branch '{name}' from '{current}'"));
                    branch = Some(name);
                } else {
                    warn!(branch = %name, error = %checkout.output, "checkout failed");
                    notes.push(format!(
                        "Could not create working branch '{name}'; staying on '{current}'"
                    ));
                }
            }
        }

        notes.push(self.session_context(branch.as_deref()));
        Ok(Some(notes.join("\n")))
    }

    /// `git init` a plain directory and commit whatever is already there.
    fn initialize(&self) -> Option<String> {
        let init = self.git.init();
        if !init.success {
            warn!(error = %init.output, "git init failed");
            return None;
        }
        self.git.configure_identity();

        if self.git.has_changes() {
            let staged = self.git.stage_all();
            let commit = if staged.success {
                self.git.commit(INITIAL_COMMIT_MESSAGE)
            } else {
                staged
            };
            if !commit.success {
                warn!(error = %commit.output, "initial commit failed");
            }
        }

        Some(format!(
            "Initialized git repository in {}",
            self.git.dir().display()
        ))
    }

    /// Fast-forward `branch` from origin. Returns a note only when something
    /// happened worth telling the user about.
    fn pull(&self, branch: &str) -> Option<String> {
        let before = self.git.head();
        let pull = self.git.pull_ff_only(branch);
        if !pull.success {
            warn!(error = %pull.output, "pull failed");
            return Some(format!(
                "Pull from origin/{branch} failed; manual merge may be needed"
            ));
        }
        if self.git.head() != before {
            Some(format!("Pulled latest changes from origin/{branch}"))
        } else {
            debug!("already up to date");
            None
        }
    }

    fn session_context(&self, branch: Option<&str>) -> String {
        let mut lines = Vec::new();
        let mut current = format!("Current branch: {}", branch.unwrap_or("(detached HEAD)"));
        if self.git.has_changes() {
            current.push_str(" (uncommitted changes)");
        }
        lines.push(current);
        if let Some(log) = self.git.recent_log(RECENT_COMMITS) {
            lines.push("Recent commits:".into());
            lines.push(log);
        }
        lines.join("\n")
    }

    // ---------------------------------------------------------------
    // SessionEnd
    // ---------------------------------------------------------------

    pub fn handle_session_end(&self, event: &SessionEndEvent) -> Result<Option<String>> {
        if event.common.cleared {
            debug!("context cleared; skipping session end");
            return Ok(None);
        }
        if !self.git.is_repo() {
            debug!("not a git repository");
            return Ok(None);
        }
        if !self.git.has_changes() {
            debug!("working tree clean; nothing to commit");
            return Ok(None);
        }

        let summary = policy::summarize_changes(&self.git.status_porcelain().output);
        let branch = self.git.current_branch();

        let staged = self.git.stage_all();
        if !staged.success {
            warn!(error = %staged.output, "staging failed");
            return Ok(None);
        }
        if !self.git.has_staged_changes() {
            debug!("nothing staged after add");
            return Ok(None);
        }

        let message = policy::render_template(
            &self.config.commit_template,
            DEFAULT_COMMIT_TEMPLATE,
            json!({
                "summary": summary,
                "timestamp": timestamp(),
                "branch": branch.as_deref().unwrap_or("HEAD"),
            }),
        );
        let commit = self.git.commit(&message);
        if !commit.success {
            warn!(error = %commit.output, "session commit failed");
            return Ok(None);
        }

        let on = branch
            .as_deref()
            .map(|b| format!(" on '{b}'"))
            .unwrap_or_default();
        let mut reply = format!("Committed session changes{on}: {summary}");
        if let Some(b) = branch.as_deref() {
            if self.push(b) {
                reply.push_str(&format!("; pushed to origin/{b}"));
            }
        }
        Ok(Some(reply))
    }

    /// Push a working branch upstream. Protected branches are never pushed.
    fn push(&self, branch: &str) -> bool {
        if !self.config.auto_push || self.config.is_protected(branch) {
            debug!(branch, "push skipped by policy");
            return false;
        }
        if !self.git.has_origin_remote() {
            debug!("no origin remote; push skipped");
            return false;
        }
        let push = self.git.push_upstream(branch);
        if !push.success {
            warn!(error = %push.output, "push failed");
        }
        push.success
    }

    // ---------------------------------------------------------------
    // PreToolUse checkpoint
    // ---------------------------------------------------------------

    pub fn handle_checkpoint(&self, event: &PreToolUseEvent) -> Result<Option<String>> {
        if event.common.cleared || !self.config.checkpoint_enabled {
            debug!("checkpointing disabled for this call");
            return Ok(None);
        }
        let Some(trigger) = CheckpointTrigger::classify(&event.tool_name, &event.tool_input)
        else {
            debug!(tool = %event.tool_name, "tool call not checkpoint-worthy");
            return Ok(None);
        };
        if let CheckpointTrigger::Destructive { pattern } = &trigger {
            debug!(pattern, command = ?event.tool_input.command, "destructive shell command");
        }
        if !self.git.is_repo() {
            return Ok(None);
        }
        let Some(git_dir) = self.git.git_dir() else {
            return Ok(None);
        };

        let Some(guard) = CheckpointGuard::acquire(&git_dir, GIT_TIMEOUT)? else {
            warn!("checkpoint lock still held by another hook; skipping");
            return Ok(None);
        };
        let now_ms = Utc::now().timestamp_millis();
        let last = guard.load()?.last_checkpoint_ms;
        if !policy::cooldown_elapsed(last, now_ms, self.config.checkpoint_cooldown) {
            debug!(?last, now_ms, "within checkpoint cooldown");
            return Ok(None);
        }
        if !self.git.has_changes() {
            debug!("no pending changes to checkpoint");
            return Ok(None);
        }

        let staged = self.git.stage_all();
        if !staged.success || !self.git.has_staged_changes() {
            debug!(error = %staged.output, "nothing staged for checkpoint");
            return Ok(None);
        }

        let target = self.display_target(trigger.target());
        let message = policy::render_template(
            &self.config.checkpoint_template,
            DEFAULT_CHECKPOINT_TEMPLATE,
            json!({
                "target": target,
                "timestamp": timestamp(),
                "tool": event.tool_name,
            }),
        );
        let commit = self.git.commit(&message);
        if !commit.success {
            warn!(error = %commit.output, "checkpoint commit failed");
            return Ok(None);
        }
        guard.record(now_ms)?;

        Ok(Some(format!("Checkpoint committed before editing {target}")))
    }

    /// Show paths inside the working directory relative to it.
    fn display_target(&self, target: &str) -> String {
        Path::new(target)
            .strip_prefix(self.git.dir())
            .ok()
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(|rel| rel.display().to_string())
            .unwrap_or_else(|| target.to_string())
    }
}
