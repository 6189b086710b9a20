//! Allowlisted command execution.
//!
//! Only the first whitespace-separated token is checked against the
//! allowlist; the whole trimmed line is then handed to the system shell.
//! `ShellPolicy::Strict` additionally refuses lines that contain shell
//! metacharacters.

use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;

use cmdrelay_core::{BackendConfig, Request, Response, ShellPolicy};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Characters that let a shell chain, substitute or redirect commands.
const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '`', '$', '<', '>', '(', ')', '\n', '\r'];

/// Why a command line was refused before any process was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandRejection {
    #[error("cmd required")]
    Empty,

    #[error("command not allowed")]
    NotAllowed,
}

/// Runs allowlisted command lines through the host shell.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    allowed: HashSet<String>,
    policy: ShellPolicy,
    timeout: Option<Duration>,
}

impl CommandExecutor {
    pub const fn new(
        allowed: HashSet<String>,
        policy: ShellPolicy,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            allowed,
            policy,
            timeout,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(
            config.allowed_commands.clone(),
            config.shell_policy,
            config.exec_timeout,
        )
    }

    /// Validate a command line and return it trimmed.
    pub fn check<'a>(&self, cmd: &'a str) -> Result<&'a str, CommandRejection> {
        let line = cmd.trim();
        let program = line
            .split_whitespace()
            .next()
            .ok_or(CommandRejection::Empty)?;

        if !self.allowed.contains(program) {
            return Err(CommandRejection::NotAllowed);
        }
        if self.policy == ShellPolicy::Strict && line.contains(SHELL_METACHARACTERS) {
            return Err(CommandRejection::NotAllowed);
        }
        Ok(line)
    }

    /// Execute `request.cmd` and fill `base` with the outcome.
    pub async fn run(&self, request: &Request, base: Response) -> Response {
        let line = match self.check(&request.cmd) {
            Ok(line) => line,
            Err(rejection) => {
                debug!(
                    request_id = %request.request_id,
                    cmd = %request.cmd,
                    reason = %rejection,
                    "Command rejected"
                );
                return base.fail(rejection.to_string());
            }
        };

        let mut command = shell_command(line);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(request_id = %request.request_id, cmd = %line, "Command timed out");
                    return base.fail(format!("command timed out after {limit:?}"));
                }
            },
            None => command.output().await,
        };

        match output {
            Ok(output) => {
                let mut base = base;
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                base.output = text;

                if output.status.success() {
                    base.succeed()
                } else {
                    debug!(
                        request_id = %request.request_id,
                        cmd = %line,
                        status = %output.status,
                        "Command exited with failure"
                    );
                    base.fail(output.status.to_string())
                }
            }
            Err(e) => {
                warn!(
                    request_id = %request.request_id,
                    cmd = %line,
                    error = %e,
                    "Failed to launch shell"
                );
                base.fail(e.to_string())
            }
        }
    }
}

/// Build the host shell invocation for a command line.
fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(line);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(line);
        cmd
    }
}
