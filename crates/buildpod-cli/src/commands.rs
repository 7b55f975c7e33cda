//! Command implementations for the buildpod CLI

use anyhow::Context;
use buildpod_config::GlobalConfig;
use buildpod_driver::{
    CliDriver, ContainerDriver, ContainerHandle, ContainerId, ExecRequest, LogSink,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct ProvisionArgs {
    pub image: String,
    pub workdir: String,
    pub agent: String,
    pub trampoline: String,
    pub build_images: Vec<String>,
    pub side_images: Vec<String>,
}

/// Log sink that relays engine output onto our stderr. The task ends when
/// the last sender is dropped.
fn stderr_log() -> (LogSink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            eprintln!("{}", line);
        }
    });
    (tx, task)
}

fn driver(config: &GlobalConfig, trampoline: Vec<u8>) -> CliDriver {
    CliDriver::new(config.engine.clone(), trampoline, config.defaults.verbose)
}

pub async fn version(config: &GlobalConfig) -> anyhow::Result<()> {
    let (log, _task) = stderr_log();
    let version = driver(config, Vec::new()).server_version(&log).await?;
    println!("{}", version);
    Ok(())
}

pub async fn pull(config: &GlobalConfig, image: &str) -> anyhow::Result<()> {
    let (log, _task) = stderr_log();
    driver(config, Vec::new()).pull_image(image, &log).await?;
    Ok(())
}

pub async fn build(config: &GlobalConfig, path: &str, tag: &str, pull: bool) -> anyhow::Result<()> {
    let (log, _task) = stderr_log();
    let path = shellexpand::tilde(path).to_string();
    let code = driver(config, Vec::new())
        .build_dockerfile(&path, tag, pull, &log)
        .await?;
    if code != 0 {
        anyhow::bail!("build of {} exited with status {}", tag, code);
    }
    Ok(())
}

pub async fn volume_create(config: &GlobalConfig) -> anyhow::Result<()> {
    let (log, _task) = stderr_log();
    let name = driver(config, Vec::new()).create_volume(&log).await?;
    println!("{}", name);
    Ok(())
}

pub async fn rm(config: &GlobalConfig, container: &str) -> anyhow::Result<()> {
    let (log, _task) = stderr_log();
    let handle = ContainerHandle::adopt(container);
    let code = driver(config, Vec::new())
        .remove_container(&handle, &log)
        .await?;
    if code != 0 {
        tracing::debug!("rm -f {} exited with status {}", container, code);
    }
    Ok(())
}

pub async fn exec(
    config: &GlobalConfig,
    container: &str,
    workdir: Option<String>,
    cmd: Vec<String>,
) -> anyhow::Result<()> {
    let (log, _task) = stderr_log();

    let mut request = ExecRequest::new(cmd.into_iter().map(|c| (c, false)).collect());
    if let Some(dir) = workdir {
        request = request.working_dir(dir);
    }

    let driver = driver(config, Vec::new());
    let mut process = driver
        .exec_in_container(&ContainerId::new(container), &request, &log)
        .await?;

    if let Some(mut stdout) = process.stdout.take() {
        let mut out = tokio::io::stdout();
        tokio::io::copy(&mut stdout, &mut out).await?;
    }

    let code = process.wait().await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

pub async fn provision(config: &GlobalConfig, args: ProvisionArgs) -> anyhow::Result<()> {
    let agent_path = shellexpand::tilde(&args.agent).to_string();
    let trampoline_path = shellexpand::tilde(&args.trampoline).to_string();
    let workdir = shellexpand::tilde(&args.workdir).to_string();

    let agent = std::fs::read(&agent_path)
        .with_context(|| format!("reading agent binary {}", agent_path))?;
    let trampoline = std::fs::read(&trampoline_path)
        .with_context(|| format!("reading trampoline binary {}", trampoline_path))?;

    let (log, _task) = stderr_log();
    let driver = driver(config, trampoline);

    let (remoting, mut remoting_process) = driver
        .launch_remoting_container(&args.image, &workdir, &agent, &log)
        .await?;
    println!("remoting {}", remoting.id);

    let mut provisioned: Vec<ContainerHandle> = Vec::new();
    let mut side_processes = Vec::new();

    let result: anyhow::Result<()> = async {
        for image in &args.build_images {
            let handle = driver.launch_build_container(image, &remoting, &log).await?;
            println!("build {}", handle.id);
            provisioned.push(handle);
        }
        for image in &args.side_images {
            let (handle, process) = driver.launch_side_container(image, &remoting, &log).await?;
            println!("side {}", handle.id);
            provisioned.push(handle);
            side_processes.push(process);
        }
        Ok(())
    }
    .await;

    if result.is_ok() {
        // Mirror agent output until the remoting container exits; its
        // stdio would normally be handed to the agent connection layer.
        if let Some(mut stdout) = remoting_process.stdout.take() {
            let mut err = tokio::io::stderr();
            let _ = tokio::io::copy(&mut stdout, &mut err).await;
        }
        let code = remoting_process.wait().await?;
        tracing::info!("remoting container exited with status {}", code);
    }

    // Teardown is best effort; removal codes are intentionally ignored.
    for handle in provisioned.iter().rev() {
        let _ = driver.remove_container(handle, &log).await;
    }
    let _ = driver.remove_container(&remoting, &log).await;
    let _ = remoting_process.kill().await;
    for mut process in side_processes {
        let _ = process.wait().await;
    }

    result
}
