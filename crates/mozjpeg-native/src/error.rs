//! Provisioning errors

use std::path::PathBuf;
use thiserror::Error;

use crate::extract::ExtractError;

/// Errors surfaced by a provisioning run
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Extraction failed: the bundled resource is missing, or file IO failed
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The extracted library still failed verification after one retry
    #[error("MD5 for internal and extracted libraries don't match at {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Neither the resolved path nor any fallback location could be loaded
    #[error("Native library could not be loaded: {library}")]
    LoadFailed { library: String },
}

impl ProvisionError {
    /// The bundle does not contain the library variant for this host
    pub fn is_resource_not_found(&self) -> bool {
        matches!(
            self,
            ProvisionError::Extract(ExtractError::ResourceNotFound { .. })
        )
    }
}
