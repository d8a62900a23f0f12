use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ===================================================================
// Hook Modes
// ===================================================================

/// Which hook point invoked us, selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    SessionStart,
    SessionEnd,
    Checkpoint,
}

/// The `reason` (or SessionStart `source`) value for a context clear.
const CLEAR: &str = "clear";

// ===================================================================
// Hook Input Types (received via stdin, snake_case JSON)
// ===================================================================

/// Tool arguments we care about. Everything is optional because each tool
/// carries a different subset.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolInput {
    pub file_path: Option<String>,
    /// NotebookEdit names its target here instead of `file_path`.
    pub notebook_path: Option<String>,
    pub command: Option<String>,
}

/// Stdin payload as sent, before it is narrowed to one event kind.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInput {
    session_id: Option<String>,
    cwd: Option<String>,
    reason: Option<String>,
    source: Option<String>,
    tool_name: Option<String>,
    tool_input: Option<ToolInput>,
}

/// Fields shared by all hook events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonInput {
    pub session_id: String,
    pub cwd: PathBuf,
    /// The agent's context was cleared; every handler is a no-op.
    pub cleared: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStartEvent {
    pub common: CommonInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEndEvent {
    pub common: CommonInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreToolUseEvent {
    pub common: CommonInput,
    pub tool_name: String,
    pub tool_input: ToolInput,
}

/// One hook invocation, narrowed to the fields its mode uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    SessionStart(SessionStartEvent),
    SessionEnd(SessionEndEvent),
    PreToolUse(PreToolUseEvent),
}

impl HookEvent {
    /// Build the event for `mode` from raw stdin.
    ///
    /// Malformed or empty JSON is read as `{}`, so handlers run on defaults
    /// instead of failing. A missing `cwd` becomes `default_cwd`.
    pub fn parse(mode: HookMode, stdin: &str, default_cwd: &Path) -> Self {
        let raw: RawInput = if stdin.trim().is_empty() {
            RawInput::default()
        } else {
            serde_json::from_str(stdin).unwrap_or_else(|err| {
                tracing::warn!(%err, "unreadable hook input; treating as empty");
                RawInput::default()
            })
        };

        let reason_clear = raw.reason.as_deref() == Some(CLEAR);
        let mut common = CommonInput {
            session_id: raw.session_id.unwrap_or_default(),
            cwd: raw
                .cwd
                .filter(|c| !c.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| default_cwd.to_path_buf()),
            cleared: reason_clear,
        };

        match mode {
            HookMode::SessionStart => {
                common.cleared |= raw.source.as_deref() == Some(CLEAR);
                Self::SessionStart(SessionStartEvent { common })
            }
            HookMode::SessionEnd => Self::SessionEnd(SessionEndEvent { common }),
            HookMode::Checkpoint => Self::PreToolUse(PreToolUseEvent {
                common,
                tool_name: raw.tool_name.unwrap_or_default(),
                tool_input: raw.tool_input.unwrap_or_default(),
            }),
        }
    }

    /// Access the common fields shared by all hook events.
    pub fn common(&self) -> &CommonInput {
        match self {
            Self::SessionStart(e) => &e.common,
            Self::SessionEnd(e) => &e.common,
            Self::PreToolUse(e) => &e.common,
        }
    }

    pub fn mode(&self) -> HookMode {
        match self {
            Self::SessionStart(_) => HookMode::SessionStart,
            Self::SessionEnd(_) => HookMode::SessionEnd,
            Self::PreToolUse(_) => HookMode::Checkpoint,
        }
    }
}

// ===================================================================
// Hook Output Types (written to stdout as JSON, camelCase)
// ===================================================================

/// Top-level hook output, one JSON line on stdout.
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    /// Message shown to the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,

    /// Event-specific output fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

/// Event-specific output, tagged by `hookEventName`.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "hookEventName")]
pub enum HookSpecificOutput {
    PreToolUse(PreToolUseOutput),
}

/// PreToolUse permission decision. Only `allow` exists: these hooks
/// advise and record, they never block a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionDecision {
    Allow,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreToolUseOutput {
    pub permission_decision: PermissionDecision,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

impl HookOutput {
    /// Shape `message` the way `mode`'s caller expects it.
    pub fn for_mode(mode: HookMode, message: Option<String>) -> Self {
        match mode {
            HookMode::SessionStart | HookMode::SessionEnd => Self {
                system_message: message,
                ..Default::default()
            },
            HookMode::Checkpoint => Self {
                hook_specific_output: Some(HookSpecificOutput::PreToolUse(PreToolUseOutput {
                    permission_decision: PermissionDecision::Allow,
                    additional_context: message,
                })),
                ..Default::default()
            },
        }
    }
}
