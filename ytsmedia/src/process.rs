//! Subprocess execution with line callbacks and cancellation.

use std::{collections::VecDeque, process::ExitStatus, process::Stdio};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{MediaError, Result};

/// Number of stderr lines kept for error reporting.
const STDERR_TAIL: usize = 20;

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<String>,
    pub stderr_tail: Vec<String>,
}

impl ProcessOutput {
    /// Last stderr lines joined, for error messages.
    pub fn error_detail(&self) -> String {
        if self.stderr_tail.is_empty() {
            format!("exited with {}", self.status)
        } else {
            self.stderr_tail.join("\n")
        }
    }
}

/// Runs one external tool.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs the tool to completion.
    ///
    /// Every stdout and stderr line is passed to `on_line` as it arrives.
    /// Cancelling `cancel` kills the child and returns [`MediaError::Cancelled`].
    /// A non-zero exit is not an error here; callers inspect `status`.
    pub async fn run(
        &self,
        args: &[String],
        on_line: &(dyn Fn(&str) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        debug!(program = %self.program, ?args, "Spawning process");
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MediaError::ToolLaunch {
                tool: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            MediaError::Io(std::io::Error::other("child stdout not captured"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            MediaError::Io(std::io::Error::other("child stderr not captured"))
        })?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_done = false;
        let mut err_done = false;
        let mut collected = Vec::new();
        let mut tail = VecDeque::with_capacity(STDERR_TAIL);

        while !(out_done && err_done) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(program = %self.program, "Cancelled, killing process");
                    if let Err(e) = child.kill().await {
                        warn!(program = %self.program, error = %e, "Failed to kill process");
                    }
                    return Err(MediaError::Cancelled);
                }
                line = out_lines.next_line(), if !out_done => match line {
                    Ok(Some(line)) => {
                        on_line(&line);
                        collected.push(line);
                    }
                    Ok(None) => out_done = true,
                    Err(e) => {
                        warn!(program = %self.program, error = %e, "Unreadable stdout");
                        out_done = true;
                    }
                },
                line = err_lines.next_line(), if !err_done => match line {
                    Ok(Some(line)) => {
                        trace!(program = %self.program, "{}", line);
                        on_line(&line);
                        if tail.len() == STDERR_TAIL {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    Ok(None) => err_done = true,
                    Err(e) => {
                        warn!(program = %self.program, error = %e, "Unreadable stderr");
                        err_done = true;
                    }
                },
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(MediaError::Cancelled);
            }
            status = child.wait() => status?,
        };

        debug!(program = %self.program, %status, "Process exited");
        Ok(ProcessOutput {
            status,
            stdout: collected,
            stderr_tail: tail.into_iter().collect(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_collects_lines_from_both_streams() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let on_line = move |l: &str| sink.lock().unwrap().push(l.to_string());

        let output = ProcessRunner::new("sh")
            .run(
                &sh("echo out1; echo err1 >&2; echo out2; exit 3"),
                &on_line,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(output.stdout, vec!["out1", "out2"]);
        assert_eq!(output.stderr_tail, vec!["err1"]);
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_kills_child() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = ProcessRunner::new("sh")
            .run(&sh("sleep 30"), &|_| {}, &cancel)
            .await;

        assert!(matches!(result, Err(MediaError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let result = ProcessRunner::new("definitely-not-a-real-tool-xyz")
            .run(&[], &|_| {}, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(MediaError::ToolLaunch { .. })));
    }
}
