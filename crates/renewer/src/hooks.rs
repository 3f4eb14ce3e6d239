//! Lifecycle hook validation and execution.
//!
//! Hooks are user-supplied shell commands run around renewals: `pre` once
//! per batch before the first renewal attempt, `deploy` after each
//! successful renewal, and `post` deferred to the end of the batch.
//! Identical commands are deduplicated within one batch, so a fleet of
//! lineages sharing a post-hook triggers it exactly once. If a batch
//! performs zero renewals, zero hooks run.

use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::storage::Lineage;

/// Which lifecycle stage a hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Pre,
    Deploy,
    Post,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pre => "pre",
            Self::Deploy => "deploy",
            Self::Post => "post",
        })
    }
}

/// Hook validation failure. Batch-fatal when validation is enabled;
/// with validation disabled a missing command surfaces only when the
/// hook actually runs.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("unable to find {kind}-hook command {command:?} in the PATH")]
    CommandNotFound { kind: HookKind, command: String },

    #[error("{kind}-hook command is empty")]
    EmptyCommand { kind: HookKind },
}

/// Check that a hook command's executable can be resolved.
///
/// Only the first word is checked — the rest of the command line is
/// handed to the shell as-is at execution time.
pub fn validate_hook(command: &str, kind: HookKind) -> Result<(), HookError> {
    let program = command
        .split_whitespace()
        .next()
        .ok_or(HookError::EmptyCommand { kind })?;

    if resolve_executable(program).is_none() {
        return Err(HookError::CommandNotFound {
            kind,
            command: program.to_string(),
        });
    }
    Ok(())
}

fn resolve_executable(program: &str) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        let path = Path::new(program);
        return is_executable(path).then(|| path.to_path_buf());
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Executes hooks for one batch run, owning the deduplication state.
///
/// Execution failures are logged and counted, never propagated: a broken
/// hook must not stop the remaining lineages.
#[derive(Debug, Default)]
pub struct HookRunner {
    executed_pre: BTreeSet<String>,
    registered_post: BTreeSet<String>,
    deferred_post: Vec<String>,
    hooks_run: usize,
}

impl HookRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a pre-hook, once per unique command per batch.
    pub fn run_pre(&mut self, command: &str) {
        if self.executed_pre.insert(command.to_string()) {
            self.execute(HookKind::Pre, command, &[]);
        } else {
            debug!(command = %command, "pre-hook already run this batch, skipping");
        }
    }

    /// Run a deploy hook for a renewed lineage.
    ///
    /// The renewed lineage's live directory and domain list are exported
    /// as `RENEWED_LINEAGE` and `RENEWED_DOMAINS`.
    pub fn run_deploy(&mut self, command: &str, lineage: &Lineage) {
        let live_dir = lineage
            .fullchain_path
            .parent()
            .unwrap_or(Path::new(""))
            .display()
            .to_string();
        let domains = lineage.domains.join(" ");
        self.execute(
            HookKind::Deploy,
            command,
            &[("RENEWED_LINEAGE", live_dir), ("RENEWED_DOMAINS", domains)],
        );
    }

    /// Defer a post-hook to the end of the batch, deduplicated by the
    /// exact command string.
    pub fn register_post(&mut self, command: &str) {
        if self.registered_post.insert(command.to_string()) {
            self.deferred_post.push(command.to_string());
        } else {
            debug!(command = %command, "post-hook already registered, will run once");
        }
    }

    /// Run the deferred post-hooks, in registration order.
    pub fn run_deferred_post(&mut self) {
        for command in std::mem::take(&mut self.deferred_post) {
            self.execute(HookKind::Post, &command, &[]);
        }
    }

    /// How many hook commands actually ran this batch.
    pub fn hooks_run(&self) -> usize {
        self.hooks_run
    }

    fn execute(&mut self, kind: HookKind, command: &str, envs: &[(&str, String)]) {
        info!(kind = %kind, command = %command, "Running hook");

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        for (key, value) in envs {
            cmd.env(key, value);
        }

        match cmd.output() {
            Err(e) => {
                error!(
                    kind = %kind,
                    command = %command,
                    error = %e,
                    "hook command could not be executed"
                );
            }
            Ok(output) => {
                self.hooks_run += 1;
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !output.status.success() {
                    error!(
                        kind = %kind,
                        command = %command,
                        status = %output.status,
                        stderr = %stderr.trim(),
                        "hook command returned a non-zero exit code"
                    );
                } else if !stderr.trim().is_empty() {
                    warn!(
                        kind = %kind,
                        command = %command,
                        stderr = %stderr.trim(),
                        "hook command wrote to stderr"
                    );
                }
            }
        }
    }
}
