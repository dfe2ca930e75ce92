//! Moves receiver files out of the pending set once they are settled.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CompletionError;

pub const PROCESSED_EXTENSION: &str = "log";
pub const FAILED_EXTENSION: &str = "failed";
/// Submitted, but the confirmation could not be read. Needs an operator.
pub const UNKNOWN_EXTENSION: &str = "unknown";

/// `<dir>/<file name>_<hash prefix>.log`
pub fn processed_path(file: &Path, hash_prefix: &str) -> Result<PathBuf, CompletionError> {
    let name = file_name(file)?;
    Ok(file.with_file_name(format!("{name}_{hash_prefix}.{PROCESSED_EXTENSION}")))
}

/// `<dir>/<file name>.failed`
pub fn failed_path(file: &Path) -> Result<PathBuf, CompletionError> {
    let name = file_name(file)?;
    Ok(file.with_file_name(format!("{name}.{FAILED_EXTENSION}")))
}

/// `<dir>/<file name>.unknown`
pub fn unknown_path(file: &Path) -> Result<PathBuf, CompletionError> {
    let name = file_name(file)?;
    Ok(file.with_file_name(format!("{name}.{UNKNOWN_EXTENSION}")))
}

pub fn mark_processed(file: &Path, hash_prefix: &str) -> Result<PathBuf, CompletionError> {
    let target = processed_path(file, hash_prefix)?;
    rename(file, target)
}

pub fn mark_failed(file: &Path) -> Result<PathBuf, CompletionError> {
    let target = failed_path(file)?;
    rename(file, target)
}

pub fn mark_unknown(file: &Path) -> Result<PathBuf, CompletionError> {
    let target = unknown_path(file)?;
    rename(file, target)
}

fn rename(from: &Path, to: PathBuf) -> Result<PathBuf, CompletionError> {
    fs::rename(from, &to).map_err(|source| CompletionError::Rename {
        from: from.to_path_buf(),
        to: to.clone(),
        source,
    })?;
    Ok(to)
}

fn file_name(file: &Path) -> Result<String, CompletionError> {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| CompletionError::NoFileName(file.to_path_buf()))
}
