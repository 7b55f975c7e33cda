//! Test support for buildpod-driver
//!
//! Provides a recording MockLauncher so the lifecycle driver can be tested
//! without a container engine on the machine.

use crate::archive::{encode_single_file, ArchiveEntry};
use crate::command::CommandSpec;
use crate::process::{LogSink, ProcessHandle, ProcessLauncher, ProcessOutput};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};

/// One launcher invocation as the mock observed it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Full argument list, unmasked
    pub args: Vec<String>,
    /// Per-argument secrecy flags, positional
    pub masks: Vec<bool>,
    /// The masked rendering, as a logger would have seen it
    pub rendered: String,
    /// Bytes piped to stdin, if any
    pub stdin: Option<Vec<u8>>,
    /// True for spawn (non-blocking) calls
    pub spawned: bool,
    /// spawn's attach_stdio flag
    pub attach_stdio: bool,
}

/// Scripted stand-in for the host process launcher. Responses are consumed
/// in FIFO order; an exhausted queue answers exit 0 with empty stdout.
pub struct MockLauncher {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    responses: Arc<Mutex<VecDeque<ProcessOutput>>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queue the next blocking response.
    pub fn respond(&self, code: i32, stdout: &[u8]) {
        self.responses.lock().unwrap().push_back(ProcessOutput {
            code,
            stdout: stdout.to_vec(),
        });
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, spec: &CommandSpec, stdin: Option<&[u8]>, spawned: bool, attach: bool) {
        self.calls.lock().unwrap().push(RecordedCall {
            args: spec.args().iter().map(|a| a.value.clone()).collect(),
            masks: spec.args().iter().map(|a| a.secret).collect(),
            rendered: spec.masked(),
            stdin: stdin.map(<[u8]>::to_vec),
            spawned,
            attach_stdio: attach,
        });
    }

    fn next_response(&self) -> ProcessOutput {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ProcessOutput {
                code: 0,
                stdout: Vec::new(),
            })
    }
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessLauncher for MockLauncher {
    async fn run(
        &self,
        spec: &CommandSpec,
        stdin: Option<&[u8]>,
        _log: &LogSink,
    ) -> Result<ProcessOutput> {
        self.record(spec, stdin, false, false);
        Ok(self.next_response())
    }

    async fn spawn(
        &self,
        spec: &CommandSpec,
        attach_stdio: bool,
        _log: &LogSink,
    ) -> Result<ProcessHandle> {
        self.record(spec, None, true, attach_stdio);
        Ok(ProcessHandle {
            stdin: Some(Box::pin(EmptyWriter) as Pin<Box<dyn AsyncWrite + Send>>),
            stdout: Some(Box::pin(EmptyReader) as Pin<Box<dyn AsyncRead + Send>>),
            child: None,
        })
    }
}

/// Single-entry archive helper for scripting `cp` stdout.
pub fn tar_of(name: &str, content: &[u8]) -> Vec<u8> {
    encode_single_file(&ArchiveEntry::new(name), content).unwrap()
}

/// A no-op async reader for mock process handles
struct EmptyReader;

impl AsyncRead for EmptyReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        _buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}

/// A no-op async writer for mock process handles
struct EmptyWriter;

impl AsyncWrite for EmptyWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::task::Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}
