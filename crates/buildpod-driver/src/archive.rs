//! Single-entry tar codec for moving file content in and out of containers
//!
//! The engine's `cp` accepts a tar stream on stdin (and emits one on
//! stdout), which lets us inject files into created-but-not-started
//! containers with no shell involved. Only single-entry archives are ever
//! exchanged.

use crate::{DriverError, Result};
use std::io::Read;

/// Practical upper bound of the 12-digit octal size field in a tar header.
pub const MAX_ENTRY_SIZE: u64 = 8 * 1024 * 1024 * 1024;

/// Metadata for one file record in the transport archive.
///
/// Injected system files are owned by root (0:0) so they survive the
/// container's non-root runtime user.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub uid: u64,
    pub gid: u64,
    /// Explicit permission bits; defaults to 0o644 when absent
    pub mode: Option<u32>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: 0,
            gid: 0,
            mode: None,
        }
    }

    pub fn with_mode(name: impl Into<String>, mode: u32) -> Self {
        Self {
            name: name.into(),
            uid: 0,
            gid: 0,
            mode: Some(mode),
        }
    }
}

/// Encode `content` as a single-entry tar archive described by `entry`.
pub fn encode_single_file(entry: &ArchiveEntry, content: &[u8]) -> Result<Vec<u8>> {
    if content.len() as u64 >= MAX_ENTRY_SIZE {
        return Err(DriverError::Encoding(format!(
            "entry {} exceeds the tar size field limit ({} bytes)",
            entry.name,
            content.len()
        )));
    }

    let mut header = tar::Header::new_ustar();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_uid(entry.uid);
    header.set_gid(entry.gid);
    header.set_mode(entry.mode.unwrap_or(0o644));
    header.set_mtime(0);

    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_data(&mut header, &entry.name, content)
        .map_err(|e| DriverError::Encoding(format!("{}: {}", entry.name, e)))?;
    builder
        .into_inner()
        .map_err(|e| DriverError::Encoding(format!("{}: {}", entry.name, e)))
}

/// Decode the first entry of a tar archive, returning its raw content.
///
/// The declared entry size must be fully present in the stream; a short
/// read is a decoding failure, never a silently shortened result.
pub fn decode_single_file(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(bytes);
    let mut entries = archive
        .entries()
        .map_err(|e| DriverError::Decoding(e.to_string()))?;

    let mut entry = entries
        .next()
        .ok_or_else(|| DriverError::Decoding("archive stream is empty".to_string()))?
        .map_err(|e| DriverError::Decoding(e.to_string()))?;

    let declared = entry
        .header()
        .size()
        .map_err(|e| DriverError::Decoding(e.to_string()))?;

    let mut content = Vec::with_capacity(declared.min(64 * 1024) as usize);
    entry
        .read_to_end(&mut content)
        .map_err(|e| DriverError::Decoding(e.to_string()))?;

    if (content.len() as u64) < declared {
        return Err(DriverError::Decoding(format!(
            "truncated entry: header declares {} bytes, stream held {}",
            declared,
            content.len()
        )));
    }

    Ok(content)
}
