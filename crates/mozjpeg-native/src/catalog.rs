//! Catalog of bundled native libraries
//!
//! Every library variant shipped with the crate is listed here together
//! with the MD5 of its bytes. Resource paths are `/`-separated regardless
//! of host platform:
//!
//! ```text
//! /native_mozjpeg/version_3_1/linux_simd_enabled_x86_64/libturbojpeg.so
//!  └─ prefix      └─ version  └─ os_simd_arch           └─ file name
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::platform::Fingerprint;

/// Version provisioned when none is configured
pub const DEFAULT_LIB_VERSION: &str = "3.1";

/// First segment of every bundled resource path
pub const RESOURCE_PREFIX: &str = "native_mozjpeg";

/// Base name of the library file, without extension
pub const LIB_NAME: &str = "libturbojpeg";

/// Name understood by the platform's library search mechanism
pub const LIB_NAME_GENERIC: &str = "turbojpeg";

const BUILTIN_ENTRIES: &[(&str, &str)] = &[
    (
        "/native_mozjpeg/version_3_1/linux_simd_disabled_x86/libturbojpeg.so",
        "8c7207433b0440bd09617c316b4a0c5d",
    ),
    (
        "/native_mozjpeg/version_3_1/linux_simd_disabled_x86_64/libturbojpeg.so",
        "e235c8d1cc9bdeeda3d6aed73af8c21f",
    ),
    (
        "/native_mozjpeg/version_3_1/linux_simd_enabled_x86_64/libturbojpeg.so",
        "bd9d9366848e7e4a5431a95eb54c6302",
    ),
    (
        "/native_mozjpeg/version_3_1/mac_simd_enabled_x86_64/libturbojpeg.dylib",
        "96c972b96aa87034bf073423dd5b4341",
    ),
    (
        "/native_mozjpeg/version_3_1/mac_simd_disabled_x86_64/libturbojpeg.dylib",
        "83fe0a59e99c2fe9dba1695fd09a0cda",
    ),
    (
        "/native_mozjpeg/version_3_1/windows_simd_disabled_x86/libturbojpeg.dll",
        "b7110b82fbb93d5825e06d0e1ea95bd5",
    ),
    (
        "/native_mozjpeg/version_3_1/windows_simd_disabled_x86_64/libturbojpeg.dll",
        "48ab9dc574c2d4c6c27ac135deae15c1",
    ),
    (
        "/native_mozjpeg/version_3_1/windows_simd_enabled_x86_64/libturbojpeg.dll",
        "7bdd42d0e63f0bdd18922a374bfb0fc6",
    ),
];

/// One shipped library variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Canonical `/`-separated resource path
    pub resource_path: String,
    /// Lowercase hex MD5 of the library bytes
    pub expected_checksum: String,
}

/// Fixed table of expected checksums per bundled resource
#[derive(Debug, Clone)]
pub struct LibraryCatalog {
    entries: HashMap<String, String>,
}

impl LibraryCatalog {
    /// The catalog of libraries shipped with this crate
    pub fn builtin() -> Self {
        Self::new(BUILTIN_ENTRIES.iter().map(|(path, md5)| ManifestEntry {
            resource_path: (*path).to_string(),
            expected_checksum: (*md5).to_string(),
        }))
    }

    pub fn new(entries: impl IntoIterator<Item = ManifestEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.resource_path, e.expected_checksum.to_ascii_lowercase()))
                .collect(),
        }
    }

    /// Expected checksum for a resource, if it is catalogued.
    pub fn expected_checksum(&self, resource_path: &str) -> Option<&str> {
        self.entries.get(resource_path).map(String::as_str)
    }

    /// All entries, sorted by resource path
    pub fn entries(&self) -> Vec<ManifestEntry> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(path, md5)| ManifestEntry {
                resource_path: path.clone(),
                expected_checksum: md5.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.resource_path.cmp(&b.resource_path));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LibraryCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Computes where a library variant lives, inside the bundle and on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocator {
    version: String,
    fingerprint: Fingerprint,
}

impl ResourceLocator {
    pub fn new(version: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            version: version.into(),
            fingerprint,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// `version_3_1` for version `3.1`
    pub fn version_segment(&self) -> String {
        format!("version_{}", self.version.replace('.', "_"))
    }

    /// Library file name for the fingerprint's OS, e.g. `libturbojpeg.so`
    pub fn file_name(&self) -> String {
        format!("{}{}", LIB_NAME, self.fingerprint.os.lib_extension())
    }

    /// Path segments shared by the resource path and the extraction path
    fn segments(&self) -> [String; 4] {
        [
            RESOURCE_PREFIX.to_string(),
            self.version_segment(),
            self.fingerprint.variant(),
            self.file_name(),
        ]
    }

    /// Canonical resource path inside the bundle
    pub fn resource_path(&self) -> String {
        self.segments()
            .iter()
            .fold(String::new(), |acc, seg| acc + "/" + seg)
    }

    /// Directory the variant is extracted into, under `root`
    pub fn extraction_dir(&self, root: &Path) -> PathBuf {
        let [prefix, version, variant, _] = self.segments();
        root.join(prefix).join(version).join(variant)
    }

    /// Full extraction path of the library file, under `root`
    pub fn extraction_path(&self, root: &Path) -> PathBuf {
        self.extraction_dir(root).join(self.file_name())
    }
}
