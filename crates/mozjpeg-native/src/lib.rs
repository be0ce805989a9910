//! Provisioning of the native mozjpeg (`libturbojpeg`) library
//!
//! This crate provides:
//! - Host detection (OS family, architecture, SIMD variant, executable temp dir)
//! - A catalog of bundled library variants and their MD5 checksums
//! - Extraction of the matching variant from a resource bundle
//! - Integrity verification with a single re-extraction on mismatch
//! - Loading into the process, with OS search-path and install-path fallbacks
//!
//! Most programs call [`load`] or [`load_unsafe`] once at startup and then
//! consult the introspection functions. Each call reads [`LoaderConfig`]
//! from the `MOZJPEG_NATIVE_LIB_*` environment variables.
//!
//! ```no_run
//! mozjpeg_native::load();
//! if let Some(path) = mozjpeg_native::loaded_library_path() {
//!     println!("libturbojpeg loaded from {}", path.display());
//! }
//! ```
//!
//! Programs that need several independent loaders, or a custom bundle, build
//! a [`Loader`] directly.

pub mod bundle;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod integrity;
pub mod loader;
pub mod native;
pub mod platform;
pub mod state;

pub use bundle::{DirectoryBundle, MemoryBundle, ResourceBundle};
pub use catalog::{LibraryCatalog, ManifestEntry, ResourceLocator, DEFAULT_LIB_VERSION};
pub use config::{ConfigError, ExistingFilePolicy, LoaderConfig};
pub use error::ProvisionError;
pub use extract::{extract, ExtractError};
pub use integrity::{
    checksum, checksum_file, verify_file, InconclusiveReason, IntegrityError, VerificationOutcome,
};
pub use loader::Loader;
pub use native::{Library, LoadError, NativeLoader, SystemLoader};
pub use platform::{CpuArch, Fingerprint, OsFamily, Platform};
pub use state::{LoadPhase, LoadState};

use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::Arc;

/// Process-wide loader.
///
/// The bundle root is taken from `MOZJPEG_NATIVE_LIB_RESOURCES` on first
/// use, defaulting to `resources/` next to the executable.
static GLOBAL: Lazy<Loader> = Lazy::new(|| {
    let bundle = LoaderConfig::from_env()
        .resource_root
        .map(DirectoryBundle::new)
        .unwrap_or_else(DirectoryBundle::beside_executable);
    Loader::new(bundle)
});

/// The process-wide loader behind the free functions
pub fn global() -> &'static Loader {
    &GLOBAL
}

/// Quietly load the native library; check [`is_library_loaded`] afterwards.
pub fn load() {
    GLOBAL.load(&LoaderConfig::from_env());
}

/// Load the native library, returning the cause on failure.
pub fn load_unsafe() -> Result<(), ProvisionError> {
    GLOBAL.load_unsafe(&LoaderConfig::from_env())
}

pub fn is_library_loaded() -> bool {
    GLOBAL.is_library_loaded()
}

pub fn loaded_library_path() -> Option<PathBuf> {
    GLOBAL.loaded_library_path()
}

/// True when the bundled copy was loaded, not an override or OS fallback
pub fn is_library_loaded_from_internal_resource() -> bool {
    GLOBAL.is_library_loaded_from_internal_resource()
}

pub fn internal_lib_version() -> Option<String> {
    GLOBAL.internal_lib_version()
}

pub fn is_internal_simd_disabled() -> bool {
    GLOBAL.is_internal_simd_disabled()
}

pub fn is_internal_library_renewed() -> bool {
    GLOBAL.is_internal_library_renewed()
}

/// The loaded library, for resolving `tj*` symbols
pub fn library() -> Option<Arc<Library>> {
    GLOBAL.library()
}
