//! Error types for container drivers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    /// The engine binary could not be located or started at all.
    /// Distinct from a non-zero exit, which is a normal result.
    #[error("Failed to launch container engine: {0}")]
    Launch(String),

    #[error("Failed to create volume: {0}")]
    VolumeCreation(String),

    #[error("Failed to create container from image {0}")]
    ContainerCreation(String),

    #[error("Failed to pull image {0}")]
    ImagePull(String),

    #[error("Failed to build image {0}")]
    ImageBuild(String),

    #[error("Exec in container failed: {0}")]
    Exec(String),

    #[error("Archive encoding failed: {0}")]
    Encoding(String),

    #[error("Archive decoding failed: {0}")]
    Decoding(String),

    #[error("Failed to inject file into container: {0}")]
    FileInjection(String),

    #[error("Failed to retrieve file from container: {0}")]
    FileRetrieval(String),

    #[error("Failed to reach container engine: {0}")]
    EngineUnreachable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DriverError>;
