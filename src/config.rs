use std::time::Duration;

const DEFAULT_PROTECTED_BRANCHES: &[&str] = &["main", "master", "dev", "develop", "staging"];
const DEFAULT_BRANCH_PREFIX: &str = "work";
const DEFAULT_CHECKPOINT_COOLDOWN_MS: u64 = 30_000;

pub const DEFAULT_COMMIT_TEMPLATE: &str = "Auto-commit: {{ summary }} ({{ timestamp }})";
pub const DEFAULT_CHECKPOINT_TEMPLATE: &str =
    "Checkpoint before editing {{ target }} ({{ timestamp }})";

/// Process-wide settings, read from `GIT_SAFETY_*` environment variables.
///
/// Built once in `main` and handed to every handler by reference; handlers
/// never look at the environment themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub protected_branches: Vec<String>,
    pub branch_prefix: String,
    pub auto_push: bool,
    pub auto_pull: bool,
    pub checkpoint_enabled: bool,
    pub verbose: bool,
    pub checkpoint_cooldown: Duration,
    /// Session-end commit message template (`summary`, `timestamp`, `branch`).
    pub commit_template: String,
    /// Checkpoint commit message template (`target`, `timestamp`, `tool`).
    pub checkpoint_template: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protected_branches: DEFAULT_PROTECTED_BRANCHES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.into(),
            auto_push: true,
            auto_pull: true,
            checkpoint_enabled: true,
            verbose: false,
            checkpoint_cooldown: Duration::from_millis(DEFAULT_CHECKPOINT_COOLDOWN_MS),
            commit_template: DEFAULT_COMMIT_TEMPLATE.into(),
            checkpoint_template: DEFAULT_CHECKPOINT_TEMPLATE.into(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset or unparsable
    /// values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let protected_branches = lookup("GIT_SAFETY_PROTECTED_BRANCHES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.protected_branches);

        let branch_prefix = lookup("GIT_SAFETY_BRANCH_PREFIX")
            .map(|p| p.trim().trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or(defaults.branch_prefix);

        let toggle = |key: &str, default: bool| {
            lookup(key).and_then(|v| parse_toggle(&v)).unwrap_or(default)
        };

        let checkpoint_cooldown = lookup("GIT_SAFETY_CHECKPOINT_COOLDOWN_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.checkpoint_cooldown);

        Self {
            protected_branches,
            branch_prefix,
            auto_push: toggle("GIT_SAFETY_AUTO_PUSH", defaults.auto_push),
            auto_pull: toggle("GIT_SAFETY_AUTO_PULL", defaults.auto_pull),
            checkpoint_enabled: toggle("GIT_SAFETY_CHECKPOINT", defaults.checkpoint_enabled),
            verbose: toggle("GIT_SAFETY_VERBOSE", defaults.verbose),
            checkpoint_cooldown,
            commit_template: lookup("GIT_SAFETY_COMMIT_TEMPLATE")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(defaults.commit_template),
            checkpoint_template: lookup("GIT_SAFETY_CHECKPOINT_TEMPLATE")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(defaults.checkpoint_template),
        }
    }

    pub fn is_protected(&self, branch: &str) -> bool {
        self.protected_branches.iter().any(|b| b == branch)
    }
}

fn parse_toggle(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
