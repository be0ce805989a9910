//! Load state published by the orchestrator

use std::fmt;
use std::path::PathBuf;

/// Where a provisioning run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    #[default]
    NotLoaded,
    Resolving,
    Extracting,
    Verifying,
    Loading,
    Loaded,
    Failed,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadPhase::NotLoaded => "not loaded",
            LoadPhase::Resolving => "resolving",
            LoadPhase::Extracting => "extracting",
            LoadPhase::Verifying => "verifying",
            LoadPhase::Loading => "loading",
            LoadPhase::Loaded => "loaded",
            LoadPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of what the last provisioning run resolved and loaded.
///
/// `loaded_path` is set at most once; a failed run leaves it empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadState {
    pub phase: LoadPhase,
    /// Path (or generic name, for search-path loads) of the loaded library
    pub loaded_path: Option<PathBuf>,
    /// Deterministic extraction path of the bundled variant
    pub extraction_path: Option<PathBuf>,
    pub internal_version: Option<String>,
    pub simd_disabled: bool,
    pub renewed: bool,
}

impl LoadState {
    pub fn is_loaded(&self) -> bool {
        self.loaded_path.is_some()
    }

    /// Loaded from the bundled copy rather than an override or OS fallback
    pub fn is_loaded_from_internal_resource(&self) -> bool {
        match (&self.loaded_path, &self.extraction_path) {
            (Some(loaded), Some(extracted)) => loaded
                .to_string_lossy()
                .eq_ignore_ascii_case(&extracted.to_string_lossy()),
            _ => false,
        }
    }
}
