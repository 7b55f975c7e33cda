//! Configuration for buildpod
//!
//! Provides the engine endpoint descriptor (how to reach the container
//! engine CLI) and the TOML-backed global configuration file.

mod error;
mod global;

pub use error::*;
pub use global::*;
