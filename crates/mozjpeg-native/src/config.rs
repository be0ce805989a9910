//! Loader configuration
//!
//! Settings come from built-in defaults, an optional TOML file, and
//! `MOZJPEG_NATIVE_LIB_*` environment variables, in that order of
//! increasing precedence.
//!
//! ```toml
//! version = "3.1"
//! simd_disabled = false
//! renew = false
//! existing_file = "trust"
//! # lib_path = "/opt/mozjpeg/lib64"
//! # lib_name = "libturbojpeg.so"
//! # resource_root = "/usr/share/myapp/resources"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::catalog::DEFAULT_LIB_VERSION;

/// Directory holding the library; bypasses the extraction directory
pub const ENV_LIB_PATH: &str = "MOZJPEG_NATIVE_LIB_PATH";
/// Library file name; bypasses the platform default name
pub const ENV_LIB_NAME: &str = "MOZJPEG_NATIVE_LIB_NAME";
/// Bundled library version to provision
pub const ENV_LIB_VERSION: &str = "MOZJPEG_NATIVE_LIB_INTERNAL_VERSION";
/// `true` selects the portable non-SIMD build
pub const ENV_SIMD_DISABLED: &str = "MOZJPEG_NATIVE_LIB_INTERNAL_SIMD_DISABLED";
/// `true` deletes and re-extracts the bundled library
pub const ENV_RENEW: &str = "MOZJPEG_NATIVE_LIB_INTERNAL_RENEWED";
/// `trust` or `verify`
pub const ENV_EXISTING_FILE: &str = "MOZJPEG_NATIVE_LIB_EXISTING_FILE";
/// Root directory of the bundled resources
pub const ENV_RESOURCES: &str = "MOZJPEG_NATIVE_LIB_RESOURCES";

/// Errors that can occur while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// What to do with a library file that already exists on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingFilePolicy {
    /// Load it as-is
    #[default]
    Trust,
    /// Re-check the extracted copy against the catalog before loading
    Verify,
}

impl ExistingFilePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trust" => Some(Self::Trust),
            "verify" => Some(Self::Verify),
            _ => None,
        }
    }
}

/// Options read at the start of each provisioning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory to load the library from instead of the extraction directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lib_path: Option<PathBuf>,

    /// File name to load instead of the platform default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lib_name: Option<String>,

    /// Bundled library version (default: "3.1")
    pub version: String,

    /// Use the non-SIMD build. Always on for 32-bit x86.
    pub simd_disabled: bool,

    /// Delete and re-extract the bundled library
    pub renew: bool,

    pub existing_file: ExistingFilePolicy,

    /// Root of the bundled resources tree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_root: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            lib_path: None,
            lib_name: None,
            version: DEFAULT_LIB_VERSION.to_string(),
            simd_disabled: false,
            renew: false,
            existing_file: ExistingFilePolicy::Trust,
            resource_root: None,
        }
    }
}

impl LoaderConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Overlay the process environment onto this config.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary lookup, keyed by the `ENV_*` names.
    ///
    /// Empty strings count as unset. Booleans are true only for `true`
    /// (any case); an unset boolean keeps its current value.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(path) = get(ENV_LIB_PATH) {
            self.lib_path = Some(PathBuf::from(path));
        }
        if let Some(name) = get(ENV_LIB_NAME) {
            self.lib_name = Some(name);
        }
        if let Some(version) = get(ENV_LIB_VERSION) {
            self.version = version;
        }
        if let Some(flag) = get(ENV_SIMD_DISABLED) {
            self.simd_disabled = parse_flag(&flag);
        }
        if let Some(flag) = get(ENV_RENEW) {
            self.renew = parse_flag(&flag);
        }
        if let Some(policy) = get(ENV_EXISTING_FILE) {
            match ExistingFilePolicy::parse(&policy) {
                Some(policy) => self.existing_file = policy,
                None => tracing::warn!(
                    key = ENV_EXISTING_FILE,
                    value = %policy,
                    "ignoring unrecognised existing-file policy"
                ),
            }
        }
        if let Some(root) = get(ENV_RESOURCES) {
            self.resource_root = Some(PathBuf::from(root));
        }
        self
    }

    pub fn with_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lib_path = Some(path.into());
        self
    }

    pub fn with_lib_name(mut self, name: impl Into<String>) -> Self {
        self.lib_name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_simd_disabled(mut self, disabled: bool) -> Self {
        self.simd_disabled = disabled;
        self
    }

    pub fn with_renew(mut self, renew: bool) -> Self {
        self.renew = renew;
        self
    }

    pub fn with_existing_file(mut self, policy: ExistingFilePolicy) -> Self {
        self.existing_file = policy;
        self
    }

    pub fn with_resource_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.resource_root = Some(root.into());
        self
    }

    /// Configured directory override, ignoring empty values
    pub(crate) fn lib_path_override(&self) -> Option<&Path> {
        self.lib_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Configured file name override, ignoring empty values
    pub(crate) fn lib_name_override(&self) -> Option<&str> {
        self.lib_name.as_deref().filter(|n| !n.is_empty())
    }

    /// Configured version, falling back to the default when blank
    pub(crate) fn effective_version(&self) -> &str {
        if self.version.trim().is_empty() {
            DEFAULT_LIB_VERSION
        } else {
            &self.version
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
