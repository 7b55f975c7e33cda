//! CLI-backed container driver
//!
//! Drives the container engine exclusively through its command-line
//! interface, without a daemon socket or API client. This keeps the integration
//! surface down to the documented CLI contract and inherits the engine's
//! own credential and context handling.
//!
//! A build session is one "remoting" container (its attached stdio carries
//! the agent channel) plus any number of sibling build/side containers that
//! join its network, IPC, and volume namespaces.

use crate::archive::{decode_single_file, encode_single_file, ArchiveEntry};
use crate::command::{engine_command, CommandSpec};
use crate::process::{HostLauncher, LogSink, ProcessHandle, ProcessLauncher, ProcessOutput};
use crate::{ContainerDriver, ContainerHandle, ContainerId, DriverError, ExecRequest, Result};
use async_trait::async_trait;
use buildpod_config::EngineEndpoint;
use std::sync::Arc;

/// Home of the build user inside every container of a session. The
/// remoting container bind-mounts the host workdir here, and sibling
/// containers see the same tree through `--volumes-from`.
pub const BUILD_HOME: &str = "/home/jenkins";

/// Fixed non-root identity the agent and all build steps run as.
pub const BUILD_UID_GID: &str = "10000:10000";

/// In-container path of the injected trampoline helper.
pub const TRAMPOLINE_PATH: &str = "/trampoline";

/// File name of the injected agent bootstrap binary under [`BUILD_HOME`].
pub const AGENT_BINARY: &str = "agent";

const GROUP_ENTRY: &[u8] = b"jenkins:x:10000:\n";
const PASSWD_ENTRY: &[u8] = b"jenkins:x:10000:10000::/home/jenkins:/bin/false\n";

/// Driver implementation that shells out to the engine CLI.
pub struct CliDriver {
    endpoint: EngineEndpoint,
    launcher: Arc<dyn ProcessLauncher>,
    /// Trampoline helper binary, injected into build containers
    trampoline: Vec<u8>,
}

impl CliDriver {
    pub fn new(endpoint: EngineEndpoint, trampoline: Vec<u8>, verbose: bool) -> Self {
        Self {
            endpoint,
            launcher: Arc::new(HostLauncher::new(verbose)),
            trampoline,
        }
    }

    /// Substitute the process launcher; tests use this to inject a
    /// recording double.
    pub fn with_launcher(
        endpoint: EngineEndpoint,
        trampoline: Vec<u8>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            endpoint,
            launcher,
            trampoline,
        }
    }

    fn engine_command(&self) -> CommandSpec {
        engine_command(&self.endpoint)
    }

    async fn run(&self, spec: &CommandSpec, log: &LogSink) -> Result<ProcessOutput> {
        self.launcher.run(spec, None, log).await
    }

    /// Append the build group entry to the container's `/etc/group`.
    async fn inject_unix_group(&self, id: &ContainerId, log: &LogSink) -> Result<()> {
        let mut group = self.get_file_content(id, "/etc/group", log).await?;
        group.extend_from_slice(GROUP_ENTRY);
        self.put_file_content(id, "/etc", "group", &group, None, log)
            .await
    }

    /// Append the build user entry to the container's `/etc/passwd`.
    async fn inject_unix_user(&self, id: &ContainerId, log: &LogSink) -> Result<()> {
        let mut passwd = self.get_file_content(id, "/etc/passwd", log).await?;
        passwd.extend_from_slice(PASSWD_ENTRY);
        self.put_file_content(id, "/etc", "passwd", &passwd, None, log)
            .await
    }

    async fn inject_trampoline(&self, id: &ContainerId, log: &LogSink) -> Result<()> {
        self.put_file_content(id, "/", "trampoline", &self.trampoline, Some(0o555), log)
            .await
    }
}

#[async_trait]
impl ContainerDriver for CliDriver {
    async fn create_volume(&self, log: &LogSink) -> Result<String> {
        let mut spec = self.engine_command();
        spec.arg("volume").arg("create");

        let out = self.run(&spec, log).await?;
        if !out.success() {
            return Err(DriverError::VolumeCreation(format!(
                "volume create exited with status {}",
                out.code
            )));
        }
        Ok(out.stdout_trimmed())
    }

    async fn has_volume(&self, name: &str, log: &LogSink) -> Result<bool> {
        if name.is_empty() {
            return Ok(false);
        }

        let mut spec = self.engine_command();
        spec.arg("volume").arg("inspect").arg("-f").arg("{{.Name}}");
        spec.arg(name);

        // Non-zero means "absent", never an error; a connectivity failure is
        // indistinguishable here and deliberately treated the same way.
        let out = self.run(&spec, log).await?;
        Ok(out.success())
    }

    async fn has_container(&self, id: &str, log: &LogSink) -> Result<bool> {
        if id.is_empty() {
            return Ok(false);
        }

        let mut spec = self.engine_command();
        spec.arg("inspect").arg("-f").arg("{{.Id}}").arg(id);

        let out = self.run(&spec, log).await?;
        Ok(out.success())
    }

    async fn launch_remoting_container(
        &self,
        image: &str,
        workdir: &str,
        agent: &[u8],
        log: &LogSink,
    ) -> Result<(ContainerHandle, ProcessHandle)> {
        let mut spec = self.engine_command();
        spec.arg("create").arg("--interactive");
        // The container's stdout/stdin is the agent transport; keep the log
        // driver away from it.
        spec.arg("--log-driver=none");
        spec.arg("--env").arg(format!("TMPDIR={}/.tmp", BUILD_HOME));
        spec.arg("--user").arg(BUILD_UID_GID);
        spec.arg("--volume").arg(format!("{}:{}", workdir, BUILD_HOME));
        spec.arg("--workdir").arg(BUILD_HOME);
        spec.arg(image);
        spec.arg(format!("{}/{}", BUILD_HOME, AGENT_BINARY));

        let out = self.run(&spec, log).await?;
        if !out.success() {
            return Err(DriverError::ContainerCreation(format!(
                "{} (create exited with status {})",
                image, out.code
            )));
        }
        let handle = ContainerHandle::from_create_output(image, &out.stdout)?;

        // Overwrite any baked-in agent with the orchestrator's own copy so
        // both sides always speak the same version.
        self.put_file_content(
            &handle.id,
            BUILD_HOME,
            AGENT_BINARY,
            agent,
            Some(0o755),
            log,
        )
        .await?;

        // Interactive attached start: the returned handle's stdio becomes
        // the agent connection channel. Caller owns and reaps the process.
        let mut spec = self.engine_command();
        spec.arg("start").arg("--interactive").arg("--attach");
        spec.arg(&handle.id.0);
        let process = self.launcher.spawn(&spec, true, log).await?;

        Ok((handle, process))
    }

    async fn launch_build_container(
        &self,
        image: &str,
        remoting: &ContainerHandle,
        log: &LogSink,
    ) -> Result<ContainerHandle> {
        let mut spec = self.engine_command();
        spec.arg("create");
        spec.arg("--env").arg(format!("TMPDIR={}/.tmp", BUILD_HOME));
        spec.arg("--workdir").arg(BUILD_HOME);
        spec.arg("--volumes-from").arg(&remoting.id.0);
        spec.arg(format!("--net=container:{}", remoting.id.0));
        spec.arg(format!("--ipc=container:{}", remoting.id.0));
        spec.arg("--user").arg(BUILD_UID_GID);
        spec.arg(image);
        // Keeps the container alive with no shell required
        spec.arg(TRAMPOLINE_PATH).arg("wait");

        let out = self.run(&spec, log).await?;
        if !out.success() {
            return Err(DriverError::ContainerCreation(format!(
                "{} (create exited with status {})",
                image, out.code
            )));
        }
        let handle = ContainerHandle::from_create_output(image, &out.stdout)?;

        // Identity files must exist before the primary process runs as uid
        // 10000, and the trampoline before anything execs through it; both
        // therefore go in between create and start.
        self.inject_unix_group(&handle.id, log).await?;
        self.inject_unix_user(&handle.id, log).await?;
        self.inject_trampoline(&handle.id, log).await?;

        let mut spec = self.engine_command();
        spec.arg("start").arg(&handle.id.0);
        let out = self.run(&spec, log).await?;
        if !out.success() {
            return Err(DriverError::ContainerCreation(format!(
                "{} (start exited with status {})",
                image, out.code
            )));
        }

        Ok(handle)
    }

    async fn launch_side_container(
        &self,
        image: &str,
        remoting: &ContainerHandle,
        log: &LogSink,
    ) -> Result<(ContainerHandle, ProcessHandle)> {
        let mut spec = self.engine_command();
        spec.arg("create");
        spec.arg("--volumes-from").arg(&remoting.id.0);
        spec.arg(format!("--net=container:{}", remoting.id.0));
        spec.arg(format!("--ipc=container:{}", remoting.id.0));
        spec.arg(image);

        let out = self.run(&spec, log).await?;
        if !out.success() {
            return Err(DriverError::ContainerCreation(format!(
                "{} (create exited with status {})",
                image, out.code
            )));
        }
        let handle = ContainerHandle::from_create_output(image, &out.stdout)?;

        // Fire-and-forget start; the caller owns the handle and reaps it.
        let mut spec = self.engine_command();
        spec.arg("start").arg(&handle.id.0);
        let process = self.launcher.spawn(&spec, false, log).await?;

        Ok((handle, process))
    }

    async fn remove_container(&self, handle: &ContainerHandle, log: &LogSink) -> Result<i32> {
        let mut spec = self.engine_command();
        spec.arg("rm").arg("-f").arg(&handle.id.0);

        // Removing an already-gone container is the same non-zero exit as
        // any other removal failure; callers may ignore the code.
        let out = self.run(&spec, log).await?;
        Ok(out.code)
    }

    async fn exec_in_container(
        &self,
        id: &ContainerId,
        request: &ExecRequest,
        log: &LogSink,
    ) -> Result<ProcessHandle> {
        let mut spec = self.engine_command();
        spec.arg("exec").arg(&id.0);

        // `exec` has no workdir option; the trampoline chdirs then execs.
        if let Some(dir) = &request.working_dir {
            spec.arg(TRAMPOLINE_PATH).arg("cdexec").arg(dir);
        }

        spec.arg("env");
        for (key, value) in &request.env {
            spec.arg(format!("{}={}", key, value));
        }
        for (token, masked) in &request.cmd {
            spec.arg_masked(token, *masked);
        }

        self.launcher.spawn(&spec, true, log).await
    }

    async fn get_file_content(
        &self,
        id: &ContainerId,
        path: &str,
        log: &LogSink,
    ) -> Result<Vec<u8>> {
        let mut spec = self.engine_command();
        spec.arg("cp").arg(format!("{}:{}", id.0, path)).arg("-");

        let out = self.run(&spec, log).await?;
        if !out.success() {
            return Err(DriverError::FileRetrieval(format!(
                "{}:{} (cp exited with status {})",
                id.short(),
                path,
                out.code
            )));
        }

        decode_single_file(&out.stdout)
    }

    async fn put_file_content(
        &self,
        id: &ContainerId,
        dest_dir: &str,
        filename: &str,
        content: &[u8],
        mode: Option<u32>,
        log: &LogSink,
    ) -> Result<()> {
        let entry = match mode {
            Some(mode) => ArchiveEntry::with_mode(filename, mode),
            None => ArchiveEntry::new(filename),
        };
        let archive = encode_single_file(&entry, content)?;

        let mut spec = self.engine_command();
        spec.arg("cp").arg("-").arg(format!("{}:{}", id.0, dest_dir));

        let out = self.launcher.run(&spec, Some(&archive), log).await?;
        if !out.success() {
            return Err(DriverError::FileInjection(format!(
                "{}/{} into {} (cp exited with status {})",
                dest_dir,
                filename,
                id.short(),
                out.code
            )));
        }
        Ok(())
    }

    async fn pull_image(&self, image: &str, log: &LogSink) -> Result<()> {
        let mut spec = self.engine_command();
        spec.arg("pull").arg(image);
        spec.forward_stdout = true;

        let out = self.run(&spec, log).await?;
        if !out.success() {
            return Err(DriverError::ImagePull(image.to_string()));
        }
        Ok(())
    }

    async fn check_image_exists(&self, image: &str, log: &LogSink) -> Result<bool> {
        let mut spec = self.engine_command();
        spec.arg("inspect").arg("-f").arg("{{.Id}}").arg(image);

        let out = self.run(&spec, log).await?;
        Ok(out.success())
    }

    async fn build_dockerfile(
        &self,
        path: &str,
        tag: &str,
        pull: bool,
        log: &LogSink,
    ) -> Result<i32> {
        let mut spec = self.engine_command();
        spec.arg("build");
        spec.arg(format!("--pull={}", pull));
        spec.arg("-t").arg(tag);
        spec.arg(path);
        spec.forward_stdout = true;

        let out = self.run(&spec, log).await?;
        Ok(out.code)
    }

    async fn server_version(&self, log: &LogSink) -> Result<String> {
        let mut spec = self.engine_command();
        spec.arg("version").arg("-f").arg("{{.Server.Version}}");

        let out = self.run(&spec, log).await?;
        if !out.success() {
            return Err(DriverError::EngineUnreachable(format!(
                "version query exited with status {}",
                out.code
            )));
        }
        // Free text, trimmed; not guaranteed to parse as a strict version.
        Ok(out.stdout_trimmed())
    }
}
