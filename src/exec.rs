//! Subprocess execution behind a narrow, swappable interface.
//!
//! Every external collaborator (git, the recall tool, the token counter,
//! `gh`) is reached through [`ProcessRunner`]: execute a program, capture
//! stdout/stderr, enforce an output ceiling and a timeout, and map a
//! non-zero exit to a typed failure. Tests substitute a scripted runner so
//! no real process is spawned.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::debug;

/// Default ceiling on captured output (stdout + stderr).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 128 * 1024 * 1024;

/// Default timeout for a single subprocess invocation.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Timeout used for cheap `--version` checks.
const VERSION_CHECK_TIMEOUT_SECS: u64 = 60;

/// A single subprocess invocation.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub max_output_bytes: usize,
    pub timeout: Duration,
}

impl ProcessRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments joined by spaces, for logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {}: {}", display_code(.code), trimmed(.stderr))]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("`{command}` produced more than {limit} bytes of output")]
    OutputTooLarge { command: String, limit: usize },

    #[error("failed to read output of `{command}`: {source}")]
    Read {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

fn trimmed(text: &str) -> &str {
    text.trim()
}

impl ExecError {
    /// The most useful single message: stderr, then stdout, then the error itself.
    pub fn diagnostic(&self) -> String {
        if let ExecError::NonZeroExit { stdout, stderr, .. } = self {
            let stderr = stderr.trim();
            if !stderr.is_empty() {
                return stderr.to_string();
            }
            let stdout = stdout.trim();
            if !stdout.is_empty() {
                return stdout.to_string();
            }
        }
        self.to_string()
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, ExecError>;
}

/// Runs real processes with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, ExecError> {
        let command_line = request.command_line();
        debug!("Running `{}`", command_line);

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let limit = request.max_output_bytes;
        let outcome = tokio::time::timeout(request.timeout, capture(&mut child, limit)).await;
        let captured = match outcome {
            Ok(Ok(captured)) => captured,
            Ok(Err(failure)) => {
                kill(&mut child, &command_line).await;
                return Err(match failure {
                    CaptureError::Overflow => ExecError::OutputTooLarge {
                        command: command_line,
                        limit,
                    },
                    CaptureError::Io(source) => ExecError::Read {
                        command: command_line,
                        source,
                    },
                });
            }
            Err(_) => {
                kill(&mut child, &command_line).await;
                return Err(ExecError::Timeout {
                    command: command_line,
                    timeout: request.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&captured.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&captured.stderr).into_owned();

        if !captured.status.success() {
            return Err(ExecError::NonZeroExit {
                command: command_line,
                code: captured.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(ProcessOutput { stdout, stderr })
    }
}

enum CaptureError {
    Overflow,
    Io(std::io::Error),
}

struct Captured {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Read at most `limit + 1` bytes; more than `limit` is an overflow.
async fn read_capped<R>(reader: Option<R>, limit: usize) -> Result<Vec<u8>, CaptureError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let Some(reader) = reader else {
        return Ok(buffer);
    };

    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    reader
        .take(cap)
        .read_to_end(&mut buffer)
        .await
        .map_err(CaptureError::Io)?;

    if buffer.len() > limit {
        return Err(CaptureError::Overflow);
    }
    Ok(buffer)
}

/// Drain both pipes under a shared ceiling, then reap the child.
async fn capture(child: &mut Child, limit: usize) -> Result<Captured, CaptureError> {
    let (stdout, stderr) = tokio::try_join!(
        read_capped(child.stdout.take(), limit),
        read_capped(child.stderr.take(), limit)
    )?;
    if stdout.len() + stderr.len() > limit {
        return Err(CaptureError::Overflow);
    }

    let status = child.wait().await.map_err(CaptureError::Io)?;
    Ok(Captured {
        status,
        stdout,
        stderr,
    })
}

async fn kill(child: &mut Child, command_line: &str) {
    if let Err(e) = child.kill().await {
        debug!("Failed to kill `{}`: {}", command_line, e);
    }
}

/// Returns true when `<program> --version` runs successfully.
pub async fn command_exists(runner: &dyn ProcessRunner, program: &str) -> bool {
    let request = ProcessRequest::new(program)
        .arg("--version")
        .max_output_bytes(1024 * 1024)
        .timeout(Duration::from_secs(VERSION_CHECK_TIMEOUT_SECS));

    match runner.run(request).await {
        Ok(_) => true,
        Err(e) => {
            debug!("`{} --version` unavailable: {}", program, e);
            false
        }
    }
}
