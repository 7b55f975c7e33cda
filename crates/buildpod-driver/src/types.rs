//! Common types for container drivers

use crate::{DriverError, Result};

/// Container ID wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        if self.0.len() > 12 {
            &self.0[..12]
        } else {
            &self.0
        }
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A provisioned container: the image it was created from plus the
/// identifier the engine assigned at creation.
///
/// There is no identifier-less state. A handle only comes into existence
/// once `create` has succeeded, so every handle held by a caller is safe to
/// pass to start/remove/exec operations.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    pub image: String,
    pub id: ContainerId,
}

impl ContainerHandle {
    /// Build a handle from the raw stdout of an engine `create` call.
    ///
    /// Fails when the engine printed nothing usable, so an id-less handle
    /// can never escape into lifecycle operations.
    pub fn from_create_output(image: &str, stdout: &[u8]) -> Result<Self> {
        let id = String::from_utf8_lossy(stdout).trim().to_string();
        if id.is_empty() {
            return Err(DriverError::ContainerCreation(format!(
                "{} (engine returned no container id)",
                image
            )));
        }
        Ok(Self {
            image: image.to_string(),
            id: ContainerId::new(id),
        })
    }

    /// Re-adopt a container provisioned by an earlier run, for cleanup.
    /// The originating image is no longer known at this point.
    pub fn adopt(id: impl Into<String>) -> Self {
        Self {
            image: String::new(),
            id: ContainerId::new(id),
        }
    }
}

/// A command to run inside an already-started container.
///
/// Each command token carries its own secrecy flag; masked tokens must
/// never appear in cleartext in any rendered command line. Environment
/// entries are kept ordered so the resulting `env` invocation is
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    /// Working directory inside the container, emulated via the trampoline
    /// since the engine exec primitive has no native workdir option
    pub working_dir: Option<String>,
    /// Environment variables, in order
    pub env: Vec<(String, String)>,
    /// Command tokens as (token, masked) pairs
    pub cmd: Vec<(String, bool)>,
}

impl ExecRequest {
    pub fn new(cmd: Vec<(String, bool)>) -> Self {
        Self {
            working_dir: None,
            env: Vec::new(),
            cmd,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}
