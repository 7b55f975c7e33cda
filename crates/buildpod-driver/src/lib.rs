//! Container driver trait and CLI-backed implementation for buildpod
//!
//! buildpod provisions a small group of containers as a disposable build
//! execution environment: one primary "remoting" container whose attached
//! stdio carries the build-agent channel, plus sibling build and side
//! containers sharing its network, IPC, and volume namespaces. The only
//! integration surface is the container engine's own CLI.

pub mod archive;
pub mod command;
mod cli_driver;
mod error;
mod process;
mod types;

#[cfg(test)]
pub mod test_support;

pub use cli_driver::{CliDriver, AGENT_BINARY, BUILD_HOME, BUILD_UID_GID, TRAMPOLINE_PATH};
pub use error::*;
pub use process::{null_log, HostLauncher, LogSink, ProcessHandle, ProcessLauncher, ProcessOutput};
pub use types::*;

use async_trait::async_trait;

/// Capability set of a container lifecycle driver.
///
/// One implementation exists ([`CliDriver`]); an engine-API-backed driver
/// could satisfy the same interface without touching callers. Every
/// operation takes an explicit log sink for live subprocess output instead
/// of relying on process-wide logging state.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    /// Create an anonymous volume; returns the engine-assigned name.
    async fn create_volume(&self, log: &LogSink) -> Result<String>;

    /// Whether a volume exists. Empty names and non-zero inspects are
    /// both `false`, never errors.
    async fn has_volume(&self, name: &str, log: &LogSink) -> Result<bool>;

    /// Whether a container exists, with the same absent-on-error convention.
    async fn has_container(&self, id: &str, log: &LogSink) -> Result<bool>;

    /// Create and interactively start the primary remoting container.
    ///
    /// `agent` is the build-agent bootstrap binary, injected after create
    /// and before start so orchestrator and agent versions always match.
    /// The returned process handle's stdin/stdout is the agent transport;
    /// the caller owns and reaps it.
    async fn launch_remoting_container(
        &self,
        image: &str,
        workdir: &str,
        agent: &[u8],
        log: &LogSink,
    ) -> Result<(ContainerHandle, ProcessHandle)>;

    /// Create, provision, and start a build container sharing the remoting
    /// container's namespaces. Identity files and the trampoline are
    /// injected strictly before start.
    async fn launch_build_container(
        &self,
        image: &str,
        remoting: &ContainerHandle,
        log: &LogSink,
    ) -> Result<ContainerHandle>;

    /// Create and start a side container (services next to the build).
    /// Start is non-blocking; the caller owns the returned process handle.
    async fn launch_side_container(
        &self,
        image: &str,
        remoting: &ContainerHandle,
        log: &LogSink,
    ) -> Result<(ContainerHandle, ProcessHandle)>;

    /// Force-remove a container. Idempotent: an already-absent container
    /// yields a plain non-zero exit code the caller may ignore.
    async fn remove_container(&self, handle: &ContainerHandle, log: &LogSink) -> Result<i32>;

    /// Run a command inside a started container, non-blocking. Working
    /// directory is emulated through the injected trampoline; per-token
    /// secrecy masking survives into the final command line.
    async fn exec_in_container(
        &self,
        id: &ContainerId,
        request: &ExecRequest,
        log: &LogSink,
    ) -> Result<ProcessHandle>;

    /// Copy a single file out of a container.
    async fn get_file_content(
        &self,
        id: &ContainerId,
        path: &str,
        log: &LogSink,
    ) -> Result<Vec<u8>>;

    /// Inject a single file into a container (running or merely created),
    /// owned by root, with an optional permission mode.
    async fn put_file_content(
        &self,
        id: &ContainerId,
        dest_dir: &str,
        filename: &str,
        content: &[u8],
        mode: Option<u32>,
        log: &LogSink,
    ) -> Result<()>;

    /// Pull an image from a registry, streaming progress to the sink.
    async fn pull_image(&self, image: &str, log: &LogSink) -> Result<()>;

    /// Whether an image is present locally.
    async fn check_image_exists(&self, image: &str, log: &LogSink) -> Result<bool>;

    /// Build an image from a Dockerfile context; returns the exit code.
    async fn build_dockerfile(
        &self,
        path: &str,
        tag: &str,
        pull: bool,
        log: &LogSink,
    ) -> Result<i32>;

    /// Engine server version as trimmed free text.
    async fn server_version(&self, log: &LogSink) -> Result<String>;
}
