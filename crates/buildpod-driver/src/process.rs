//! Process bridge between the driver and the host OS
//!
//! Every engine interaction is one subprocess. Blocking calls run the
//! process to completion and hand back its exit code and captured stdout;
//! the interactive starts (remoting container, side container, exec) spawn
//! and return an owned handle the caller is responsible for reaping.

use crate::command::CommandSpec;
use crate::{DriverError, Result};
use async_trait::async_trait;
use std::pin::Pin;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Destination for live subprocess output, injected per operation.
/// Receiver side is owned by the caller; send failures are ignored.
pub type LogSink = mpsc::UnboundedSender<String>;

/// A log sink whose receiver has been dropped; sends vanish quietly.
pub fn null_log() -> LogSink {
    let (tx, _rx) = mpsc::unbounded_channel();
    tx
}

/// Result of a blocking engine invocation.
///
/// A non-zero code is a normal outcome here; callers decide whether it is
/// an error for their operation.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_trimmed(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// An owned, running subprocess with its attached streams.
///
/// Returned by the non-blocking starts; the caller must eventually `wait`
/// (or `kill`) the handle, nothing reaps it in the background.
pub struct ProcessHandle {
    pub stdin: Option<Pin<Box<dyn AsyncWrite + Send>>>,
    pub stdout: Option<Pin<Box<dyn AsyncRead + Send>>>,
    pub(crate) child: Option<Child>,
}

impl ProcessHandle {
    pub(crate) fn from_child(mut child: Child) -> Self {
        let stdin = child
            .stdin
            .take()
            .map(|s| Box::pin(s) as Pin<Box<dyn AsyncWrite + Send>>);
        let stdout = child
            .stdout
            .take()
            .map(|s| Box::pin(s) as Pin<Box<dyn AsyncRead + Send>>);
        Self {
            stdin,
            stdout,
            child: Some(child),
        }
    }

    /// Wait for the process to exit and return its code.
    pub async fn wait(&mut self) -> Result<i32> {
        match self.child.as_mut() {
            Some(child) => {
                let status = child
                    .wait()
                    .await
                    .map_err(|e| DriverError::Launch(e.to_string()))?;
                Ok(status.code().unwrap_or(-1))
            }
            None => Ok(0),
        }
    }

    /// Terminate the process. Waiting afterwards is still required to reap.
    pub async fn kill(&mut self) -> Result<()> {
        if let Some(child) = self.child.as_mut() {
            child
                .kill()
                .await
                .map_err(|e| DriverError::Launch(e.to_string()))?;
        }
        Ok(())
    }
}

/// Launches engine commands as host processes.
///
/// The driver core only depends on this trait; tests substitute a
/// recording double, and the production implementation is [`HostLauncher`].
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Run to completion. `stdin` bytes, when given, are piped into the
    /// process; stderr lines stream to `log`; stdout is captured unless the
    /// spec forwards it to the sink.
    async fn run(
        &self,
        spec: &CommandSpec,
        stdin: Option<&[u8]>,
        log: &LogSink,
    ) -> Result<ProcessOutput>;

    /// Spawn without waiting. With `attach_stdio` the child's stdin/stdout
    /// are piped and exposed on the handle; stderr drains to `log` either
    /// way.
    async fn spawn(
        &self,
        spec: &CommandSpec,
        attach_stdio: bool,
        log: &LogSink,
    ) -> Result<ProcessHandle>;
}

/// Production launcher backed by `tokio::process`.
pub struct HostLauncher {
    /// Echo captured stdout of wrapped commands to the log sink
    pub verbose: bool,
}

impl HostLauncher {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn base_command(spec: &CommandSpec) -> Result<Command> {
        let program = spec
            .program()
            .ok_or_else(|| DriverError::Launch("empty command spec".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(spec.argv());
        cmd.envs(spec.envs());
        Ok(cmd)
    }

    async fn forward_lines<R>(stream: R, log: LogSink)
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = log.send(line);
        }
    }
}

#[async_trait]
impl ProcessLauncher for HostLauncher {
    async fn run(
        &self,
        spec: &CommandSpec,
        stdin: Option<&[u8]>,
        log: &LogSink,
    ) -> Result<ProcessOutput> {
        tracing::debug!("running {}", spec);

        let mut cmd = Self::base_command(spec)?;
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| DriverError::Launch(format!("{}: {}", spec.masked(), e)))?;

        // Feed stdin from a task so a large payload cannot deadlock against
        // an unread output pipe.
        let stdin_task = match (stdin, child.stdin.take()) {
            (Some(bytes), Some(mut pipe)) => {
                let bytes = bytes.to_vec();
                Some(tokio::spawn(async move {
                    let _ = pipe.write_all(&bytes).await;
                    let _ = pipe.shutdown().await;
                }))
            }
            _ => None,
        };

        // Drain stdout and stderr concurrently; consuming only one stream
        // can block the child once the other pipe's OS buffer fills up.
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DriverError::Launch("missing stderr pipe".to_string()))?;
        let stderr_task = tokio::spawn(Self::forward_lines(stderr, log.clone()));

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Launch("missing stdout pipe".to_string()))?;
        let stdout_task = if spec.forward_stdout {
            let sink = log.clone();
            tokio::spawn(async move {
                Self::forward_lines(stdout, sink).await;
                Vec::new()
            })
        } else {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut stdout = stdout;
                let _ = stdout.read_to_end(&mut buf).await;
                buf
            })
        };

        let status = child
            .wait()
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        if let Some(task) = stdin_task {
            let _ = task.await;
        }
        let _ = stderr_task.await;
        let captured = stdout_task.await.unwrap_or_default();

        if self.verbose && !captured.is_empty() {
            for line in String::from_utf8_lossy(&captured).lines() {
                let _ = log.send(line.to_string());
            }
        }

        Ok(ProcessOutput {
            code: status.code().unwrap_or(-1),
            stdout: captured,
        })
    }

    async fn spawn(
        &self,
        spec: &CommandSpec,
        attach_stdio: bool,
        log: &LogSink,
    ) -> Result<ProcessHandle> {
        tracing::debug!("spawning {}", spec);

        let mut cmd = Self::base_command(spec)?;
        if attach_stdio {
            cmd.stdin(Stdio::piped());
            cmd.stdout(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
            cmd.stdout(Stdio::null());
        }
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| DriverError::Launch(format!("{}: {}", spec.masked(), e)))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(Self::forward_lines(stderr, log.clone()));
        }

        Ok(ProcessHandle::from_child(child))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandSpec;

    #[tokio::test]
    async fn test_launch_error_for_missing_binary() {
        let launcher = HostLauncher::new(false);
        let mut spec = CommandSpec::new();
        spec.arg("definitely-not-a-real-binary-buildpod");
        let err = launcher.run(&spec, None, &null_log()).await.unwrap_err();
        assert!(matches!(err, DriverError::Launch(_)));
    }

    #[tokio::test]
    async fn test_launch_error_message_is_masked() {
        let launcher = HostLauncher::new(false);
        let mut spec = CommandSpec::new();
        spec.arg("definitely-not-a-real-binary-buildpod");
        spec.arg_masked("hunter2", true);
        let err = launcher.run(&spec, None, &null_log()).await.unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_empty_spec_is_launch_error() {
        let launcher = HostLauncher::new(false);
        let spec = CommandSpec::new();
        let err = launcher.run(&spec, None, &null_log()).await.unwrap_err();
        assert!(matches!(err, DriverError::Launch(_)));
    }
}
