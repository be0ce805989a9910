//! Content checksums for extracted libraries
//!
//! Checksums are MD5 digests rendered as 32 lowercase hex characters,
//! matching the values stored in the [`LibraryCatalog`].

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

use crate::catalog::LibraryCatalog;

const CHUNK_SIZE: usize = 4096;

/// Errors that prevent a checksum from being computed
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// The input could not be opened or read
    #[error("Failed to read input for checksum: {0}")]
    IoError(#[from] io::Error),
}

/// Why a verification could not reach a verdict
#[derive(Debug, Error)]
pub enum InconclusiveReason {
    /// The resource has no entry in the catalog
    #[error("no catalog entry for {0}")]
    NoCatalogEntry(String),

    /// The checksum of the extracted file could not be computed
    #[error("{0}")]
    Digest(#[from] IntegrityError),
}

/// Result of comparing an extracted file against the catalog
#[derive(Debug)]
pub enum VerificationOutcome {
    Matched,
    Mismatched { expected: String, actual: String },
    Inconclusive(InconclusiveReason),
}

impl VerificationOutcome {
    /// Fail-open policy: only an explicit mismatch counts as failure.
    pub fn passes(&self) -> bool {
        !matches!(self, VerificationOutcome::Mismatched { .. })
    }
}

/// MD5 of everything readable from `reader`, as lowercase hex.
pub fn checksum<R: Read>(mut reader: R) -> Result<String, IntegrityError> {
    let mut context = md5::Context::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        context.consume(&buffer[..read]);
    }
    Ok(hex::encode(context.compute().0))
}

/// MD5 of a file's contents, as lowercase hex.
pub fn checksum_file(path: &Path) -> Result<String, IntegrityError> {
    checksum(File::open(path)?)
}

/// Compare the file at `path` against the catalog entry for `resource_path`.
pub fn verify_file(catalog: &LibraryCatalog, resource_path: &str, path: &Path) -> VerificationOutcome {
    let Some(expected) = catalog.expected_checksum(resource_path) else {
        return VerificationOutcome::Inconclusive(InconclusiveReason::NoCatalogEntry(
            resource_path.to_string(),
        ));
    };

    match checksum_file(path) {
        Ok(actual) if actual.eq_ignore_ascii_case(expected) => VerificationOutcome::Matched,
        Ok(actual) => VerificationOutcome::Mismatched {
            expected: expected.to_string(),
            actual,
        },
        Err(e) => VerificationOutcome::Inconclusive(e.into()),
    }
}
