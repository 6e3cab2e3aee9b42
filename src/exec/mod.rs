// ABOUTME: Remote execution gateway wrapping a Connection.
// ABOUTME: Turns command strings into CommandResults with optional error suppression and retry.

use std::time::Duration;
use thiserror::Error;

use crate::ssh::Connection;

/// Default fixed delay between retry attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command failed with exit code {exit_code}: {command}\noutput: {output}")]
    CommandFailed {
        exit_code: u32,
        command: String,
        output: String,
    },

    #[error(transparent)]
    Ssh(#[from] crate::ssh::Error),
}

pub type Result<T> = std::result::Result<T, ExecError>;

/// Outcome of one remote command invocation.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u32,
    pub output: String,
    pub command: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn failed(&self) -> bool {
        !self.success()
    }
}

/// Thin gateway over a connection.
///
/// `run` raises on a non-zero exit; `run_unchecked` returns the failed
/// result instead, leaving the caller to inspect it. Retry is fixed-delay
/// and explicit: pipeline stages call the single-attempt forms, recovery
/// from a failed stage is rollback, not re-running the stage.
pub struct Executor<'a, C: Connection + ?Sized> {
    conn: &'a C,
    timeout: Duration,
}

impl<'a, C: Connection + ?Sized> Executor<'a, C> {
    pub fn new(conn: &'a C, timeout: Duration) -> Self {
        Self { conn, timeout }
    }

    pub fn connection(&self) -> &'a C {
        self.conn
    }

    /// Run a command; non-zero exit is an error.
    pub async fn run(&self, command: &str) -> Result<CommandResult> {
        self.run_with(command, false, self.timeout).await
    }

    /// Run a command; non-zero exit is returned, not raised.
    pub async fn run_unchecked(&self, command: &str) -> Result<CommandResult> {
        self.run_with(command, true, self.timeout).await
    }

    /// Run a command scoped to a remote directory (`cd dir && command`).
    pub async fn run_in_dir(&self, dir: &str, command: &str) -> Result<CommandResult> {
        self.run(&format!("cd {} && {}", dir, command)).await
    }

    pub async fn run_in_dir_unchecked(&self, dir: &str, command: &str) -> Result<CommandResult> {
        self.run_unchecked(&format!("cd {} && {}", dir, command))
            .await
    }

    pub async fn run_with(
        &self,
        command: &str,
        suppress_errors: bool,
        timeout: Duration,
    ) -> Result<CommandResult> {
        tracing::debug!("Executing: {}", command);

        let output = self.conn.run(command, timeout).await?;

        let mut combined = output.stdout;
        if !output.stderr.is_empty() {
            combined.push_str(&output.stderr);
        }

        let result = CommandResult {
            exit_code: output.exit_code,
            output: combined,
            command: command.to_string(),
        };

        if !suppress_errors && result.failed() {
            return Err(ExecError::CommandFailed {
                exit_code: result.exit_code,
                command: result.command,
                output: result.output,
            });
        }

        Ok(result)
    }

    /// Re-invoke a failing command up to `max_attempts` times with a fixed
    /// delay between attempts. After exhausting attempts the last failure is
    /// raised, or returned when `suppress_errors` is set.
    pub async fn run_with_retry(
        &self,
        command: &str,
        max_attempts: u32,
        delay: Duration,
        suppress_errors: bool,
    ) -> Result<CommandResult> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let failed = match self.run_with(command, suppress_errors, self.timeout).await {
                Ok(result) if result.success() => {
                    if attempt > 1 {
                        tracing::info!("Command succeeded on attempt {}", attempt);
                    }
                    return Ok(result);
                }
                // Suppressed failure: keep the result so the last one can be
                // handed back after attempts run out.
                Ok(result) => Ok(result),
                Err(e) => Err(e),
            };

            if attempt < max_attempts {
                tracing::warn!(
                    "Command failed on attempt {}/{}, retrying in {:?}...",
                    attempt,
                    max_attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            } else {
                tracing::error!("Command failed after {} attempts", max_attempts);
                return failed;
            }
        }
    }
}
