//! Materialising bundled libraries on disk

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::bundle::ResourceBundle;

/// Errors that can occur while extracting a resource
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The bundle has no such resource
    #[error("Internal library is not found: {resource}")]
    ResourceNotFound { resource: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Copy a bundled resource to `dest`, creating parent directories.
///
/// Bytes are written to a sibling temp file first and renamed over `dest`
/// once complete, so an existing file is only replaced by a full copy.
pub fn extract(
    bundle: &dyn ResourceBundle,
    resource_path: &str,
    dest: &Path,
) -> Result<u64, ExtractError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut reader = bundle
        .open(resource_path)
        .ok_or_else(|| ExtractError::ResourceNotFound {
            resource: resource_path.to_string(),
        })?;

    let tmp_path = staging_path(dest);
    let copied = match write_staged(&mut reader, &tmp_path) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
    };

    if let Err(e) = fs::rename(&tmp_path, dest) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    tracing::debug!(resource = resource_path, path = %dest.display(), bytes = copied, "extracted");
    Ok(copied)
}

/// Remove a previously extracted file. A missing file is not an error.
pub fn remove_extracted(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn write_staged(reader: &mut dyn io::Read, tmp_path: &Path) -> io::Result<u64> {
    let mut tmp_file = fs::File::create(tmp_path)?;
    let copied = io::copy(reader, &mut tmp_file)?;
    tmp_file.sync_all()?;
    Ok(copied)
}

fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    dest.with_file_name(name)
}
