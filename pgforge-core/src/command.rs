//! Run external processes, optionally streaming their output line-by-line,
//! with cooperative cancellation.
//!
//! The controllers in [`crate::controller`] use this so that a cancelled
//! build or a cancelled `Server` operation can actually stop a child process
//! rather than merely stop waiting on it.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("Input/output error")]
    IoError(#[from] std::io::Error),
    #[error("Command was cancelled")]
    Cancelled,
    #[error("Command exited with status {status}: {message}")]
    ExecutionFailed { status: ExitStatus, message: String },
}

/// A line of output from a running child process, tagged by which stream it
/// came from.
#[derive(Debug, Clone)]
pub enum Line {
    Stdout(String),
    Stderr(String),
}

/// Where a [`Line`] should go: a caller-supplied callback per stream.
pub trait OutputSink {
    fn on_line(&mut self, line: Line);
}

impl<F: FnMut(Line)> OutputSink for F {
    fn on_line(&mut self, line: Line) {
        self(line);
    }
}

/// Describes how to invoke a binary.
pub struct Invocation<'a> {
    pub binary: &'a Path,
    pub args: Vec<&'a OsStr>,
    pub working_dir: Option<&'a Path>,
    pub env: Vec<(&'a str, &'a OsStr)>,
}

impl<'a> Invocation<'a> {
    pub fn new(binary: &'a Path) -> Self {
        Self { binary, args: Vec::new(), working_dir: None, env: Vec::new() }
    }

    #[must_use]
    pub fn arg(mut self, arg: &'a (impl AsRef<OsStr> + ?Sized)) -> Self {
        self.args.push(arg.as_ref());
        self
    }

    #[must_use]
    pub fn env(mut self, key: &'a str, value: &'a (impl AsRef<OsStr> + ?Sized)) -> Self {
        self.env.push((key, value.as_ref()));
        self
    }

    fn build(&self) -> Command {
        let mut command = Command::new(self.binary);
        command.args(&self.args);
        if let Some(dir) = self.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

/// Run `invocation` to completion without capturing output, returning its
/// exit code. Use this when capturing output would deadlock the child, in
/// particular when starting a long-running server.
///
/// If `cancel` fires before the child exits, the child is killed and
/// [`CommandError::Cancelled`] is returned.
pub async fn execute(
    invocation: &Invocation<'_>,
    throw_on_non_zero: bool,
    cancel: &CancellationToken,
) -> Result<ExitStatus, CommandError> {
    let mut child = invocation.build().stdin(Stdio::null()).spawn()?;

    let status = tokio::select! {
        status = child.wait() => status?,
        () = cancel.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(CommandError::Cancelled);
        }
    };

    if throw_on_non_zero && !status.success() {
        return Err(CommandError::ExecutionFailed {
            status,
            message: format!("{} exited with {status}", invocation.binary.display()),
        });
    }
    Ok(status)
}

/// Run `invocation`, streaming stdout/stderr line-by-line to `sink` as they
/// arrive, and return the final exit status.
///
/// If `cancel` fires before the child exits, the child is killed and
/// [`CommandError::Cancelled`] is returned; any lines already read are still
/// delivered to `sink` first.
pub async fn execute_streaming(
    invocation: &Invocation<'_>,
    throw_on_non_zero: bool,
    mut sink: impl OutputSink,
    cancel: &CancellationToken,
) -> Result<ExitStatus, CommandError> {
    let mut child = invocation
        .build()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdout = BufReader::new(child.stdout.take().expect("stdout was piped")).lines();
    let mut stderr = BufReader::new(child.stderr.take().expect("stderr was piped")).lines();

    let status = loop {
        tokio::select! {
            line = stdout.next_line() => {
                if let Some(line) = line? {
                    sink.on_line(Line::Stdout(line));
                }
            }
            line = stderr.next_line() => {
                if let Some(line) = line? {
                    sink.on_line(Line::Stderr(line));
                }
            }
            status = child.wait() => break status?,
            () = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(CommandError::Cancelled);
            }
        }
    };

    if throw_on_non_zero && !status.success() {
        return Err(CommandError::ExecutionFailed {
            status,
            message: format!("{} exited with {status}", invocation.binary.display()),
        });
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use super::{execute, execute_streaming, CommandError, Invocation, Line};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn runs_and_returns_exit_status() {
        let invocation = Invocation::new(Path::new("/bin/true"));
        let cancel = CancellationToken::new();
        let status = execute(&invocation, true, &cancel).await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn fails_on_nonzero_exit_when_requested() {
        let invocation = Invocation::new(Path::new("/bin/false"));
        let cancel = CancellationToken::new();
        assert!(matches!(
            execute(&invocation, true, &cancel).await,
            Err(CommandError::ExecutionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn streams_stdout_lines() {
        let invocation = Invocation::new(Path::new("/bin/echo")).arg("hello");
        let cancel = CancellationToken::new();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        execute_streaming(
            &invocation,
            true,
            move |line: Line| sink_lines.lock().unwrap().push(line),
            &cancel,
        )
        .await
        .unwrap();
        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(matches!(&lines[0], Line::Stdout(s) if s == "hello"));
    }

    #[tokio::test]
    async fn cancellation_kills_the_child() {
        let invocation = Invocation::new(Path::new("/bin/sleep")).arg("5");
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel2.cancel();
        });
        let result = execute(&invocation, true, &cancel).await;
        assert!(matches!(result, Err(CommandError::Cancelled)));
    }
}
