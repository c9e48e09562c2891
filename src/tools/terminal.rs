//! Terminal/shell command execution inside the task workspace.
//!
//! Commands run through `/bin/sh -c` with the workspace root as working
//! directory:
//! - `ls -l` → lists workspace contents
//! - `python analysis.py` → runs a script written with `write_file`
//!
//! This is not isolation: commands run with the privileges of the host
//! process. What is guaranteed is that nothing spawned here outlives the call.

use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use super::Tool;
use crate::util::safe_truncate_index;
use crate::workspace::TaskWorkspace;

/// Exit status `/bin/sh` uses when the executable cannot be found.
const SHELL_NOT_FOUND_EXIT: i32 = 127;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Received empty command after cleaning.")]
    EmptyCommand,

    #[error("Command timed out after {0} seconds.")]
    TimedOut(u64),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Failed to execute command: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Failed waiting for command: {0}")]
    WaitFailed(#[source] std::io::Error),
}

/// Limits applied to every command.
#[derive(Debug, Clone)]
pub struct ShellLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for ShellLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_output_bytes: 3000,
        }
    }
}

/// Result of a command that ran to completion (any exit code).
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// `STDOUT:`/`STDERR:` structured text, already capped.
    pub output: String,
    pub truncated: bool,
}

/// Strip surrounding whitespace and wrapping backticks.
fn clean_command(command: &str) -> &str {
    command.trim().trim_matches('`').trim()
}

/// Chaining metacharacters outside a simple pipe. Only logged, never blocked.
fn has_chaining_characters(command: &str) -> bool {
    let chained = ["&&", "||", ";", "`", "$("]
        .iter()
        .any(|pattern| command.contains(pattern));
    chained && !command.contains('|')
}

/// Kills the command's whole process group when dropped, unless disarmed.
///
/// Covers every exit path: early returns, panics and a cancelled future.
struct GroupGuard {
    pgid: Option<i32>,
}

impl GroupGuard {
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: i32) {
    // SAFETY: killpg only sends a signal; a stale group yields ESRCH.
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: i32) {}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.pgid.is_some() {
            tracing::warn!("Shell process group still alive on exit path, terminating");
            self.kill();
        }
    }
}

/// Bytes read from one pipe. Kept outside the reader task so output read
/// before an abort is not lost.
type PipeBuffer = Arc<Mutex<Vec<u8>>>;

fn spawn_reader<R>(reader: Option<R>) -> (PipeBuffer, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = PipeBuffer::default();
    let sink = Arc::clone(&buffer);
    let task = tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]),
                Err(e) => {
                    tracing::debug!("Reading command output stopped early: {}", e);
                    break;
                }
            }
        }
    });
    (buffer, task)
}

fn take_text(buffer: &PipeBuffer) -> String {
    let bytes = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
    String::from_utf8_lossy(&bytes).trim().to_string()
}

fn format_output(stdout: &str, stderr: &str, exit_code: i32) -> String {
    let mut result = String::new();
    if !stdout.is_empty() {
        result.push_str(&format!("STDOUT:\n{}\n", stdout));
    }
    if exit_code != 0 {
        if !stderr.is_empty() {
            result.push_str(&format!("STDERR:\n{}\n", stderr));
        }
        result.push_str(&format!("ERROR: Command failed with exit code {}", exit_code));
    } else if !stderr.is_empty() {
        result.push_str(&format!("STDERR (Warnings/Info):\n{}\n", stderr));
    }
    result
}

fn cap_output(mut result: String, max_output_bytes: usize) -> (String, bool) {
    if result.len() <= max_output_bytes {
        return (result, false);
    }
    let end = safe_truncate_index(&result, max_output_bytes);
    result.truncate(end);
    result.push_str(&format!(
        "\n... (output truncated after {} characters)",
        max_output_bytes
    ));
    (result, true)
}

/// Run one command line inside `workspace`.
pub async fn run_command(
    command: &str,
    workspace: &TaskWorkspace,
    limits: &ShellLimits,
) -> Result<CommandOutput, ProcessError> {
    let command = clean_command(command);
    if command.is_empty() {
        return Err(ProcessError::EmptyCommand);
    }
    if has_chaining_characters(command) {
        tracing::warn!("Potentially unsafe shell characters detected: {}", command);
    }

    tracing::info!(
        "Executing command in {:?}: {} (timeout: {:?})",
        workspace.root(),
        command,
        limits.timeout
    );

    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(workspace.root())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Shell not found while running: {}", command);
            return Err(ProcessError::CommandNotFound("/bin/sh".to_string()));
        }
        Err(e) => {
            tracing::error!("Command execution failed: {}", e);
            return Err(ProcessError::SpawnFailed(e));
        }
    };

    let mut guard = GroupGuard {
        pgid: child.id().map(|pid| pid as i32),
    };
    let deadline = tokio::time::Instant::now() + limits.timeout;
    let (stdout_buf, mut stdout_task) = spawn_reader(child.stdout.take());
    let (stderr_buf, mut stderr_task) = spawn_reader(child.stderr.take());

    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            stdout_task.abort();
            stderr_task.abort();
            return Err(ProcessError::WaitFailed(e));
        }
        Err(_) => {
            tracing::error!(
                "Command timed out after {} seconds: {}",
                limits.timeout.as_secs(),
                command
            );
            guard.kill();
            // Reap the shell so it does not linger as a zombie.
            if let Err(e) = child.kill().await {
                tracing::debug!("Shell already gone after group kill: {}", e);
            }
            stdout_task.abort();
            stderr_task.abort();
            return Err(ProcessError::TimedOut(limits.timeout.as_secs()));
        }
    };

    // Background jobs may still hold the pipes open.
    guard.kill();

    // A process that left the group (setsid, daemons) can keep the pipes
    // open indefinitely; draining shares the command's deadline.
    let drained = tokio::time::timeout_at(deadline, async {
        let _ = (&mut stdout_task).await;
        let _ = (&mut stderr_task).await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            "Output pipes still open at the deadline, returning what was read: {}",
            command
        );
        stdout_task.abort();
        stderr_task.abort();
    }

    let stdout = take_text(&stdout_buf);
    let stderr = take_text(&stderr_buf);
    let exit_code = status.code().unwrap_or(-1);

    if exit_code == SHELL_NOT_FOUND_EXIT {
        let program = command.split_whitespace().next().unwrap_or(command);
        tracing::warn!("Command not found: {}", program);
        return Err(ProcessError::CommandNotFound(program.to_string()));
    }
    if exit_code != 0 {
        tracing::warn!(
            "Command '{}' failed. Exit: {}. Stderr: {}",
            command,
            exit_code,
            stderr
        );
    }

    let (output, truncated) = cap_output(
        format_output(&stdout, &stderr, exit_code),
        limits.max_output_bytes,
    );
    tracing::debug!(
        "Command completed: exit={}, output_len={}, truncated={}",
        exit_code,
        output.len(),
        truncated
    );

    Ok(CommandOutput {
        exit_code,
        output,
        truncated,
    })
}

/// Run a non-interactive shell command in the task workspace.
pub struct WorkspaceShell {
    workspace: TaskWorkspace,
    limits: ShellLimits,
    description: String,
}

impl WorkspaceShell {
    pub fn new(workspace: TaskWorkspace, limits: ShellLimits) -> Self {
        let description = format!(
            "Execute a non-interactive shell command in the current task's workspace \
            (e.g., 'python my_script.py', 'ls -l', 'wc -l data.csv'). Input MUST be a single \
            command string without workspace path prefixes. Timeout: {}s. Max output length: {} chars.",
            limits.timeout.as_secs(),
            limits.max_output_bytes
        );
        Self {
            workspace,
            limits,
            description,
        }
    }
}

#[async_trait]
impl Tool for WorkspaceShell {
    fn name(&self) -> &str {
        "workspace_shell"
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, input: &str) -> anyhow::Result<String> {
        let result = run_command(input, &self.workspace, &self.limits).await?;
        let output = result.output.trim();
        if output.is_empty() {
            return Ok("Command executed successfully with no output to STDOUT or STDERR.".to_string());
        }
        Ok(output.to_string())
    }
}
