mod config;
mod git;
mod logging;
mod policy;
mod session;
mod state;
mod types;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgGroup, Parser};
use config::Config;
use session::Session;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use types::{HookEvent, HookMode, HookOutput};

/// Git automation for agent sessions: branch on start, checkpoint before
/// edits, commit (and push) on end. Reads the hook payload as JSON on stdin
/// and writes one JSON reply on stdout.
#[derive(Debug, Parser)]
#[command(name = "git-safety", version)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["session_start", "session_end", "checkpoint"])
))]
struct Cli {
    /// Run the session-start workflow (init, pull, working branch, context)
    #[arg(long)]
    session_start: bool,

    /// Run the session-end workflow (commit, push working branch)
    #[arg(long)]
    session_end: bool,

    /// Run the pre-edit checkpoint workflow (PreToolUse)
    #[arg(long)]
    checkpoint: bool,
}

impl Cli {
    fn mode(&self) -> HookMode {
        if self.session_start {
            HookMode::SessionStart
        } else if self.session_end {
            HookMode::SessionEnd
        } else {
            HookMode::Checkpoint
        }
    }
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("reading hook input from stdin")?;
    Ok(buffer)
}

fn dispatch(event: &HookEvent, config: &Config) -> Result<Option<String>> {
    let session = Session::new(&event.common().cwd, config);
    match event {
        HookEvent::SessionStart(e) => session.handle_session_start(e),
        HookEvent::SessionEnd(e) => session.handle_session_end(e),
        HookEvent::PreToolUse(e) => session.handle_checkpoint(e),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            process::exit(0);
        }
        Err(err) => {
            let _ = err.print();
            process::exit(1);
        }
    };

    let config = Config::from_env();
    logging::init(config.verbose);
    let mode = cli.mode();

    let stdin = read_stdin().unwrap_or_else(|err| {
        tracing::warn!("{err:#}");
        String::new()
    });
    let default_cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let event = HookEvent::parse(mode, &stdin, &default_cwd);
    tracing::debug!(
        ?mode,
        session = %event.common().session_id,
        cwd = %event.common().cwd.display(),
        "dispatching hook"
    );

    let message = dispatch(&event, &config).unwrap_or_else(|err| {
        tracing::warn!("git-safety: {err:#}");
        None
    });

    let output = HookOutput::for_mode(event.mode(), message);
    match serde_json::to_string(&output) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            tracing::warn!(%err, "serializing hook output");
            println!("{{}}");
        }
    }
}
