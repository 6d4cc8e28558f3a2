//! Process supervisor (component C7): brings the instrumented SUT up as a
//! process-group leader, polls it ready, and tears it (and its descendants)
//! down on replay exit or crash recovery.

pub mod config;
mod platform;

pub use config::{IpcEndpointEnv, SupervisorConfig};
pub use platform::TerminateMode;

use replay_common::ServiceConfig;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

const PORT_CHECK_TIMEOUT: Duration = Duration::from_millis(500);
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("port {0} is already in use")]
    PortInUse(u16),
    #[error("service has no start command")]
    MissingStartCommand,
    #[error("failed to spawn service: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("readiness check did not succeed within {0:?}")]
    ReadinessTimeout(Duration),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A running, group-led SUT process.
pub struct SupervisedProcess {
    child: Child,
    pid: u32,
    service_id: String,
    stop_command: Option<String>,
}

impl SupervisedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Resolves once the child exits on its own; the replay executor's crash
    /// detector races this against in-flight HTTP calls.
    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }

    pub fn try_wait(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        self.child.try_wait()
    }
}

/// Verifies the port is free, spawns the SUT as a process-group leader with
/// the IPC endpoint and `TUSK_DRIFT_MODE=REPLAY` in its environment, and
/// blocks until readiness succeeds or times out.
pub async fn start_service(
    config: &SupervisorConfig,
    ipc_env: &IpcEndpointEnv,
) -> Result<SupervisedProcess, SupervisorError> {
    if config.service.start_command.trim().is_empty() {
        return Err(SupervisorError::MissingStartCommand);
    }
    if !port_is_free(config.service.port).await {
        return Err(SupervisorError::PortInUse(config.service.port));
    }

    let mut cmd = shell_command(&config.service.start_command);
    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }
    ipc_env.apply(&mut cmd);
    for (key, value) in &config.extra_env {
        cmd.env(key, value);
    }
    platform::prepare_group_leader(&mut cmd);

    match log_sink(config)? {
        Some(file) => {
            cmd.stdout(Stdio::from(file.try_clone()?));
            cmd.stderr(Stdio::from(file));
        }
        None => {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        }
    }
    cmd.stdin(Stdio::null());

    let mut child = cmd.spawn().map_err(SupervisorError::Spawn)?;
    let pid = child.id().ok_or_else(|| {
        SupervisorError::Spawn(std::io::Error::other("child exited before its pid could be read"))
    });
    let pid = match pid {
        Ok(pid) => pid,
        Err(err) => {
            let _ = child.wait().await;
            return Err(err);
        }
    };

    tracing::info!(service = %config.service.id, pid, port = config.service.port, "service starting");

    let process = SupervisedProcess {
        child,
        pid,
        service_id: config.service.id.clone(),
        stop_command: config.service.stop_command.clone(),
    };

    if let Err(err) = wait_until_ready(&config.service, config.default_ready_wait).await {
        force_stop_environment(process).await.ok();
        return Err(err);
    }

    tracing::info!(service = %config.service.id, "service ready");
    Ok(process)
}

/// Prefers the configured stop command; otherwise SIGTERMs the process
/// group, waits up to 3s, then force-kills.
pub async fn stop_service(mut process: SupervisedProcess) -> Result<(), SupervisorError> {
    if let Some(stop_command) = process.stop_command.clone() {
        let status = shell_command(&stop_command).status().await?;
        if !status.success() {
            tracing::warn!(service = %process.service_id, ?status, "stop command exited non-zero");
        }
        let _ = process.child.wait().await;
        return Ok(());
    }

    platform::terminate_group(process.pid, TerminateMode::Graceful).ok();

    match tokio::time::timeout(STOP_GRACE_PERIOD, process.child.wait()).await {
        Ok(_) => Ok(()),
        Err(_) => {
            tracing::warn!(service = %process.service_id, "graceful stop timed out, force-killing");
            platform::terminate_group(process.pid, TerminateMode::Force).ok();
            let _ = process.child.wait().await;
            Ok(())
        }
    }
}

/// Skips the grace period entirely; used when tearing down an environment
/// group after a fatal error (readiness timeout, restart budget exhausted).
pub async fn force_stop_environment(mut process: SupervisedProcess) -> Result<(), SupervisorError> {
    platform::terminate_group(process.pid, TerminateMode::Force).ok();
    let _ = process.child.wait().await;
    Ok(())
}

async fn wait_until_ready(service: &ServiceConfig, default_ready_wait: Duration) -> Result<(), SupervisorError> {
    let readiness = &service.readiness;
    match &readiness.command {
        Some(command) => {
            let timeout = Duration::from_secs(readiness.timeout_secs);
            let interval = Duration::from_secs(readiness.interval_secs.max(1));
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                let status = shell_command(command).status().await;
                if matches!(status, Ok(status) if status.success()) {
                    return Ok(());
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(SupervisorError::ReadinessTimeout(timeout));
                }
                tokio::time::sleep(interval).await;
            }
        }
        None => {
            tokio::time::sleep(default_ready_wait).await;
            Ok(())
        }
    }
}

async fn port_is_free(port: u16) -> bool {
    !matches!(
        tokio::time::timeout(PORT_CHECK_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

fn log_sink(config: &SupervisorConfig) -> std::io::Result<Option<std::fs::File>> {
    let Some(dir) = &config.log_dir else {
        return Ok(None);
    };
    std::fs::create_dir_all(dir)?;
    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    let path = dir.join(format!("{}-{timestamp}.log", config.service.id));
    Ok(Some(std::fs::File::create(path)?))
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}
