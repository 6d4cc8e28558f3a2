//! Builder for a supervised service run, in the same
//! chainable-method idiom as this codebase's other `*Config` builders.

use replay_common::ServiceConfig;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Weak contract by design: absent a readiness command, the supervisor just
/// waits this long before assuming the service is up. Callers that care
/// about correctness should configure a real readiness command instead.
pub const DEFAULT_READY_WAIT: Duration = Duration::from_secs(3);

/// The SDK-side env vars published on the child. Kept independent of `replay-ipc-server`'s
/// `IpcTransport` type so this crate doesn't need to depend on it just to
/// read two fields back out.
#[derive(Debug, Clone)]
pub enum IpcEndpointEnv {
    Unix { socket_path: PathBuf },
    Tcp { host: String, port: u16 },
}

impl IpcEndpointEnv {
    pub(crate) fn apply(&self, cmd: &mut tokio::process::Command) {
        cmd.env("TUSK_DRIFT_MODE", "REPLAY");
        match self {
            IpcEndpointEnv::Unix { socket_path } => {
                cmd.env("TUSK_MOCK_SOCKET", socket_path);
            }
            IpcEndpointEnv::Tcp { host, port } => {
                cmd.env("TUSK_MOCK_PORT", port.to_string());
                cmd.env("TUSK_MOCK_HOST", host);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub service: ServiceConfig,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) extra_env: HashMap<String, String>,
    pub(crate) log_dir: Option<PathBuf>,
    pub(crate) default_ready_wait: Duration,
}

impl SupervisorConfig {
    pub fn new(service: ServiceConfig) -> Self {
        Self {
            service,
            working_dir: None,
            extra_env: HashMap::new(),
            log_dir: None,
            default_ready_wait: DEFAULT_READY_WAIT,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// When set, the child's stdout/stderr are redirected to a timestamped
    /// file under this directory instead of being inherited.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_default_ready_wait(mut self, wait: Duration) -> Self {
        self.default_ready_wait = wait;
        self
    }
}
