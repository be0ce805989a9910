//! Provisioning orchestrator
//!
//! Resolves which library variant the host needs, extracts it from the
//! bundle when it is not already on disk, verifies the extracted bytes
//! against the catalog, and loads it into the process. When the resolved
//! file can't be loaded, a short list of well-known install locations is
//! tried before giving up.
//!
//! ```text
//! NotLoaded → Resolving → Extracting → Verifying → Loading → Loaded
//!                  └──────────┴────────────┴───────────┴──→ Failed
//! ```
//!
//! Runs are serialised per [`Loader`]: concurrent callers wait for the
//! active run and then observe its result, so at most one run ever moves
//! the loader from "not loaded" to "loaded".

use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::bundle::ResourceBundle;
use crate::catalog::{LibraryCatalog, ResourceLocator, LIB_NAME_GENERIC};
use crate::config::{ExistingFilePolicy, LoaderConfig};
use crate::error::ProvisionError;
use crate::extract::{extract, remove_extracted, ExtractError};
use crate::integrity::{verify_file, VerificationOutcome};
use crate::native::{NativeLoader, SystemLoader};
use crate::platform::{OsFamily, Platform};
use crate::state::{LoadPhase, LoadState};

/// Install prefix searched when the provisioned library can't be loaded
const FALLBACK_PREFIX: &str = "/opt/mozjpeg";

/// Provisions and loads the native library, and remembers the result.
pub struct Loader<N: NativeLoader = SystemLoader> {
    platform: Platform,
    catalog: LibraryCatalog,
    bundle: Box<dyn ResourceBundle>,
    native: N,
    run_lock: Mutex<()>,
    state: RwLock<LoadState>,
    library: RwLock<Option<Arc<N::Handle>>>,
}

impl Loader<SystemLoader> {
    /// Loader for the running host with the built-in catalog
    pub fn new(bundle: impl ResourceBundle + 'static) -> Self {
        Self::with_parts(
            Platform::host(),
            LibraryCatalog::builtin(),
            bundle,
            SystemLoader,
        )
    }
}

impl<N: NativeLoader> Loader<N> {
    pub fn with_parts(
        platform: Platform,
        catalog: LibraryCatalog,
        bundle: impl ResourceBundle + 'static,
        native: N,
    ) -> Self {
        Self {
            platform,
            catalog,
            bundle: Box::new(bundle),
            native,
            run_lock: Mutex::new(()),
            state: RwLock::new(LoadState::default()),
            library: RwLock::new(None),
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn catalog(&self) -> &LibraryCatalog {
        &self.catalog
    }

    pub fn bundle(&self) -> &dyn ResourceBundle {
        self.bundle.as_ref()
    }

    /// Where the bundled variant for `config` lives, in the bundle and on disk
    pub fn locator(&self, config: &LoaderConfig) -> ResourceLocator {
        ResourceLocator::new(
            config.effective_version(),
            self.platform.fingerprint(config.simd_disabled),
        )
    }

    /// Deterministic extraction path for `config`
    pub fn extraction_path(&self, config: &LoaderConfig) -> PathBuf {
        self.locator(config).extraction_path(&self.platform.temp_dir())
    }

    /// Quietly provision and load the library.
    ///
    /// Errors are logged, not returned; check [`Loader::is_library_loaded`]
    /// afterwards.
    pub fn load(&self, config: &LoaderConfig) {
        if let Err(e) = self.load_unsafe(config) {
            error!(error = %e, "Native library couldn't be loaded");
        }
    }

    /// Provision and load the library, returning why it failed.
    ///
    /// Does nothing if a previous run already loaded it.
    #[instrument(skip_all, fields(version = %config.effective_version()))]
    pub fn load_unsafe(&self, config: &LoaderConfig) -> Result<(), ProvisionError> {
        let _run = self.run_lock.lock();

        if self.is_library_loaded() {
            debug!("native library already loaded");
            return Ok(());
        }

        let result = self.provision(config);
        if result.is_err() {
            self.set_phase(LoadPhase::Failed);
        }
        result
    }

    fn provision(&self, config: &LoaderConfig) -> Result<(), ProvisionError> {
        self.set_phase(LoadPhase::Resolving);

        let locator = self.locator(config);
        let temp_root = self.platform.temp_dir();
        let extraction_path = locator.extraction_path(&temp_root);
        {
            let fingerprint = locator.fingerprint();
            let mut state = self.state.write();
            state.internal_version = Some(locator.version().to_string());
            state.simd_disabled = fingerprint.simd_disabled;
            state.renewed = config.renew;
            state.extraction_path = Some(extraction_path.clone());
        }

        if config.renew {
            debug!(path = %extraction_path.display(), "renewing extracted library");
            if let Err(e) = remove_extracted(&extraction_path) {
                warn!(path = %extraction_path.display(), error = %e, "could not remove extracted library");
            }
        }

        let file_name = config
            .lib_name_override()
            .map(str::to_string)
            .unwrap_or_else(|| locator.file_name());
        let dir = config
            .lib_path_override()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| locator.extraction_dir(&temp_root));
        let mut lib_path = dir.join(&file_name);

        if !is_present(&lib_path) {
            debug!(path = %lib_path.display(), "native library not found, extracting");
            match self.extract_with_retry(&locator, &extraction_path) {
                Ok(()) => lib_path = extraction_path,
                // No bundled variant for this host; the OS may still have one
                Err(ProvisionError::Extract(ExtractError::ResourceNotFound { resource })) => {
                    warn!(%resource, "no bundled native library for this platform");
                }
                Err(e) => return Err(e),
            }
        } else if config.existing_file == ExistingFilePolicy::Verify && lib_path == extraction_path {
            self.set_phase(LoadPhase::Verifying);
            let outcome = verify_file(&self.catalog, &locator.resource_path(), &lib_path);
            if !outcome.passes() {
                warn!(path = %lib_path.display(), ?outcome, "existing library failed verification");
                self.extract_with_retry(&locator, &lib_path)?;
            }
        }

        self.set_phase(LoadPhase::Loading);
        match self.native.load_path(&lib_path) {
            Ok(handle) => {
                self.publish(lib_path, handle);
                return Ok(());
            }
            Err(e) => {
                warn!(path = %lib_path.display(), error = %e, "Error loading native library");
            }
        }

        if let Some((loaded, handle)) = self.load_from_os(&locator.file_name()) {
            self.publish(loaded, handle);
            return Ok(());
        }

        Err(ProvisionError::LoadFailed { library: file_name })
    }

    /// Extract and verify, re-extracting once if the checksum disagrees.
    fn extract_with_retry(
        &self,
        locator: &ResourceLocator,
        dest: &Path,
    ) -> Result<(), ProvisionError> {
        let resource = locator.resource_path();

        let (expected, actual) = match self.extract_and_verify(&resource, dest)? {
            VerificationOutcome::Mismatched { expected, actual } => (expected, actual),
            _ => return Ok(()),
        };
        warn!(
            path = %dest.display(),
            %expected,
            %actual,
            "extracted library checksum mismatch, retrying"
        );
        remove_extracted(dest).map_err(ExtractError::from)?;

        let (expected, actual) = match self.extract_and_verify(&resource, dest)? {
            VerificationOutcome::Mismatched { expected, actual } => (expected, actual),
            _ => return Ok(()),
        };
        error!(
            path = %dest.display(),
            %expected,
            %actual,
            "Expected MD5 of the library doesn't match after re-extraction"
        );
        // Leave nothing behind that a later run would trust unverified
        if let Err(e) = remove_extracted(dest) {
            warn!(path = %dest.display(), error = %e, "could not remove corrupt library");
        }
        Err(ProvisionError::ChecksumMismatch {
            path: dest.to_path_buf(),
            expected,
            actual,
        })
    }

    fn extract_and_verify(
        &self,
        resource: &str,
        dest: &Path,
    ) -> Result<VerificationOutcome, ProvisionError> {
        self.set_phase(LoadPhase::Extracting);
        info!(resource, path = %dest.display(), "extracting native library");
        extract(self.bundle.as_ref(), resource, dest)?;

        self.set_phase(LoadPhase::Verifying);
        let outcome = verify_file(&self.catalog, resource, dest);
        if let VerificationOutcome::Inconclusive(reason) = &outcome {
            warn!(resource, %reason, "checksum could not be verified, accepting extracted library");
        }
        Ok(outcome)
    }

    /// Try the OS search path, then well-known install locations.
    fn load_from_os(&self, internal_name: &str) -> Option<(PathBuf, N::Handle)> {
        match self.native.load_name(LIB_NAME_GENERIC) {
            Ok(handle) => return Some((PathBuf::from(LIB_NAME_GENERIC), handle)),
            Err(e) => debug!(name = LIB_NAME_GENERIC, error = %e, "search path load failed"),
        }

        for path in fallback_paths(self.platform.os, internal_name) {
            match self.native.load_path(&path) {
                Ok(handle) => return Some((path, handle)),
                Err(e) => debug!(path = %path.display(), error = %e, "fallback load failed"),
            }
        }
        None
    }

    fn publish(&self, path: PathBuf, handle: N::Handle) {
        info!(path = %path.display(), "native library loaded");
        // Lock order: state, then library
        let mut state = self.state.write();
        *self.library.write() = Some(Arc::new(handle));
        state.loaded_path = Some(path);
        state.phase = LoadPhase::Loaded;
    }

    fn set_phase(&self, phase: LoadPhase) {
        debug!(%phase, "load phase");
        self.state.write().phase = phase;
    }

    /// Copy of the current load state
    pub fn state(&self) -> LoadState {
        self.state.read().clone()
    }

    pub fn phase(&self) -> LoadPhase {
        self.state.read().phase
    }

    pub fn is_library_loaded(&self) -> bool {
        self.state.read().is_loaded()
    }

    pub fn loaded_library_path(&self) -> Option<PathBuf> {
        self.state.read().loaded_path.clone()
    }

    pub fn is_library_loaded_from_internal_resource(&self) -> bool {
        self.state.read().is_loaded_from_internal_resource()
    }

    pub fn internal_lib_version(&self) -> Option<String> {
        self.state.read().internal_version.clone()
    }

    pub fn is_internal_simd_disabled(&self) -> bool {
        self.state.read().simd_disabled
    }

    pub fn is_internal_library_renewed(&self) -> bool {
        self.state.read().renewed
    }

    /// Handle of the loaded library, for resolving symbols
    pub fn library(&self) -> Option<Arc<N::Handle>> {
        let _state = self.state.read();
        self.library.read().clone()
    }
}

/// A usable library file exists at `path` (present and non-empty).
fn is_present(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

/// Install locations tried after the search path, in order.
pub fn fallback_paths(os: OsFamily, internal_name: &str) -> Vec<PathBuf> {
    match os {
        OsFamily::Mac => vec![
            Path::new(FALLBACK_PREFIX).join("lib").join(internal_name),
            Path::new("/usr/lib").join(internal_name),
        ],
        _ => vec![Path::new(FALLBACK_PREFIX).join("lib64").join("libturbojpeg.so")],
    }
}
