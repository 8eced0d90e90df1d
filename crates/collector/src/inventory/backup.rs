//! Durable storage for the set of admitted device configurations.
//!
//! The backing file is a JSON array of [`Config`] records. Writes go
//! through a temp file in the same directory followed by a rename, so a
//! crash mid-write never leaves a torn file behind. Record order in the
//! file carries no meaning.

use std::fs;
use std::io;
use std::path::Path;

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::device::Config;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("failed to read device config file: {0}")]
    Read(#[source] io::Error),
    #[error("failed to write device config file: {0}")]
    Write(#[source] io::Error),
    #[error("malformed device config file: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Atomically replaces the file at `path` with the given configuration
/// records. An empty slice produces an empty but valid file.
pub fn write_configs(path: &Path, configs: &[Config]) -> Result<(), BackupError> {
    // The temp file must live on the same filesystem as the target for the
    // rename to be atomic.
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file = NamedTempFile::new_in(dir).map_err(BackupError::Write)?;
    serde_json::to_writer_pretty(file.as_file(), configs)?;
    file.persist(path).map_err(|e| BackupError::Write(e.error))?;
    Ok(())
}

/// Reads the configuration records at `path`. A missing file is an empty
/// set, not an error.
pub fn read_configs(path: &Path) -> Result<Vec<Config>, BackupError> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(BackupError::Read(e)),
    };
    Ok(serde_json::from_slice(&contents)?)
}
