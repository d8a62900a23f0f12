use std::sync::LazyLock;
use std::time::Duration;

use chrono::NaiveDate;
use minijinja::Environment;
use regex::Regex;
use serde::Serialize;

use crate::types::ToolInput;

// ===================================================================
// Branch naming
// ===================================================================

/// Pick a branch name for a new working session.
///
/// `{prefix}/session-{YYYYMMDD}`, then `…-a` through `…-z` on same-day
/// collisions, then a 4-character random suffix that is not re-checked.
pub fn branch_name(prefix: &str, date: NaiveDate, exists: impl Fn(&str) -> bool) -> String {
    let base = format!("{prefix}/session-{}", date.format("%Y%m%d"));
    if !exists(&base) {
        return base;
    }
    for suffix in 'a'..='z' {
        let candidate = format!("{base}-{suffix}");
        if !exists(&candidate) {
            return candidate;
        }
    }
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{base}-{}", &random[..4])
}

// ===================================================================
// Destructive shell commands
// ===================================================================

static DESTRUCTIVE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "recursive rm",
            r"\brm\s+(?:-[a-zA-Z]*[rR][a-zA-Z]*|--recursive)\b",
        ),
        ("git rewrite", r"\bgit\s+(?:reset|revert|checkout|clean)\b"),
        ("mv", r"\bmv\s+"),
        ("redirect", r">(?:[^|]|$)"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("static pattern compiles")))
    .collect()
});

/// Name of the first destructive pattern `command` matches, if any.
///
/// Heuristic, not a parser: false positives only cost an extra checkpoint.
pub fn destructive_match(command: &str) -> Option<&'static str> {
    DESTRUCTIVE_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(command))
        .map(|(name, _)| *name)
}

// ===================================================================
// Checkpoint gating
// ===================================================================

/// Tools that rewrite files directly.
pub const FILE_TOOLS: &[&str] = &["Edit", "MultiEdit", "Write", "NotebookEdit"];
pub const SHELL_TOOL: &str = "Bash";

/// Why a tool call is worth a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointTrigger {
    /// A file tool, with the path it is about to touch (when known).
    FileEdit { path: Option<String> },
    /// A shell command matching a destructive pattern.
    Destructive { pattern: &'static str },
}

impl CheckpointTrigger {
    /// `None` means the tool call doesn't warrant a checkpoint.
    pub fn classify(tool_name: &str, input: &ToolInput) -> Option<Self> {
        if FILE_TOOLS.contains(&tool_name) {
            let path = input
                .file_path
                .clone()
                .or_else(|| input.notebook_path.clone())
                .filter(|p| !p.is_empty());
            return Some(Self::FileEdit { path });
        }
        if tool_name == SHELL_TOOL {
            let command = input.command.as_deref()?;
            return destructive_match(command).map(|pattern| Self::Destructive { pattern });
        }
        None
    }

    /// What the commit message names as being edited.
    pub fn target(&self) -> &str {
        match self {
            Self::FileEdit { path: Some(path) } => path,
            _ => "files",
        }
    }
}

// ===================================================================
// Rate limiting
// ===================================================================

/// A checkpoint is allowed when strictly more than `cooldown` has passed
/// since the previous one, or there was none.
pub fn cooldown_elapsed(last_ms: Option<i64>, now_ms: i64, cooldown: Duration) -> bool {
    match last_ms {
        None => true,
        Some(last) => i128::from(now_ms) - i128::from(last) > cooldown.as_millis() as i128,
    }
}

// ===================================================================
// Change summaries
// ===================================================================

pub const FALLBACK_SUMMARY: &str = "uncommitted changes";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeCounts {
    pub modified: usize,
    pub added: usize,
    pub deleted: usize,
    pub new: usize,
}

impl ChangeCounts {
    /// Tally `git status --porcelain` output.
    ///
    /// Lines may have lost their leading space to trimming, so each status
    /// code is classified by the letters it contains rather than by column.
    pub fn from_porcelain(status: &str) -> Self {
        let mut counts = Self::default();
        for line in status.lines().filter(|l| !l.trim().is_empty()) {
            let code = line.get(..2).unwrap_or(line);
            if code == "??" {
                counts.new += 1;
            } else if code.contains('A') {
                counts.added += 1;
            } else if code.contains('D') {
                counts.deleted += 1;
            } else {
                counts.modified += 1;
            }
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Render a status listing as e.g. `3 modified, 1 added, 2 new`.
pub fn summarize_changes(status: &str) -> String {
    let counts = ChangeCounts::from_porcelain(status);
    if counts.is_empty() {
        return FALLBACK_SUMMARY.into();
    }
    [
        (counts.modified, "modified"),
        (counts.added, "added"),
        (counts.deleted, "deleted"),
        (counts.new, "new"),
    ]
    .iter()
    .filter(|(n, _)| *n > 0)
    .map(|(n, label)| format!("{n} {label}"))
    .collect::<Vec<_>>()
    .join(", ")
}

// ===================================================================
// Commit message templates
// ===================================================================

/// Render a minijinja commit template, falling back to `default` if the
/// configured one doesn't parse or render.
pub fn render_template<S: Serialize>(template: &str, default: &str, ctx: S) -> String {
    let env = Environment::new();
    let rendered = env
        .template_from_str(template)
        .and_then(|t| t.render(&ctx));
    match rendered {
        Ok(message) if !message.trim().is_empty() => message,
        Ok(_) => render_default(&env, default, &ctx),
        Err(err) => {
            tracing::warn!(%err, "commit template failed; using default");
            render_default(&env, default, &ctx)
        }
    }
}

fn render_default<S: Serialize>(env: &Environment, default: &str, ctx: &S) -> String {
    env.template_from_str(default)
        .and_then(|t| t.render(ctx))
        .unwrap_or_else(|_| default.to_string())
}
