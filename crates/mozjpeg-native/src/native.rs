//! Native shared library loading
//!
//! Cross-platform support for loading shared libraries (.so, .dylib, .dll)
//! into the current process, either by absolute path or by short name
//! through the platform's standard search path.

use std::ffi::{c_void, CString};
use std::path::Path;
use thiserror::Error;

use crate::platform::{host_os_family, OsFamily};

/// Errors that can occur during library loading
#[derive(Debug, Error)]
pub enum LoadError {
    /// The OS loader refused the library
    #[error("Library not found: {path}")]
    NotFound { path: String },

    /// Symbol not found in library
    #[error("Symbol not found: {symbol} in {library}")]
    SymbolNotFound { symbol: String, library: String },

    /// Path or symbol name the OS loader can't accept
    #[error("Invalid name: {0}")]
    InvalidName(String),
}

/// A shared library mapped into the current process.
///
/// Unmapped when dropped.
pub struct Library {
    raw: sys::Handle,
    path: String,
}

impl Library {
    /// Load a dynamic library from the given path.
    ///
    /// A bare file name (no separator) is resolved through the platform's
    /// library search path. Unix uses `dlopen(RTLD_NOW | RTLD_LOCAL)`,
    /// Windows uses `LoadLibraryW`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let path = path
            .to_str()
            .ok_or_else(|| LoadError::InvalidName(format!("{:?}", path)))?
            .to_string();

        let raw = sys::open(&path).map_err(|reason| LoadError::NotFound {
            path: format!("{}: {}", path, reason),
        })?;
        Ok(Library { raw, path })
    }

    /// Get a function pointer by name.
    ///
    /// # Safety
    ///
    /// `T` must match the exported symbol's type, and the value must not
    /// outlive this `Library`.
    ///
    /// ```ignore
    /// type InitCompressFn = unsafe extern "C" fn() -> *mut std::ffi::c_void;
    /// let init: InitCompressFn = unsafe { lib.get("tjInitCompress")? };
    /// ```
    pub unsafe fn get<T>(&self, symbol: &str) -> Result<T, LoadError> {
        let name = CString::new(symbol)
            .map_err(|_| LoadError::InvalidName(symbol.to_string()))?;
        match sys::symbol(&self.raw, &name) {
            Ok(ptr) => Ok(std::mem::transmute_copy(&ptr)),
            Err(reason) => Err(LoadError::SymbolNotFound {
                symbol: symbol.to_string(),
                library: format!("{}: {}", self.path, reason),
            }),
        }
    }

    /// Whether the library exports `symbol`
    pub fn has_symbol(&self, symbol: &str) -> bool {
        unsafe { self.get::<*mut c_void>(symbol).is_ok() }
    }

    /// Path or name this library was opened with
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        sys::close(&self.raw);
    }
}

// Handles are process-wide and the loader APIs are thread-safe
unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("path", &self.path).finish()
    }
}

/// Platform file name for a generic library name, e.g. `turbojpeg` →
/// `libturbojpeg.so` on Linux, `turbojpeg.dll` on Windows.
pub fn platform_library_name(os: OsFamily, generic: &str) -> String {
    match os {
        OsFamily::Windows => format!("{}{}", generic, os.lib_extension()),
        OsFamily::Linux | OsFamily::Mac => format!("lib{}{}", generic, os.lib_extension()),
        OsFamily::Unknown => format!("lib{}.so", generic),
    }
}

/// The process's native load boundary.
///
/// Both operations are all-or-nothing: they either return a loaded handle
/// or an error, and the handle keeps the library mapped while alive.
pub trait NativeLoader: Send + Sync {
    type Handle: Send + Sync + 'static;

    /// Load the library at an absolute path.
    fn load_path(&self, path: &Path) -> Result<Self::Handle, LoadError>;

    /// Load a library by generic name via the standard search mechanism.
    fn load_name(&self, name: &str) -> Result<Self::Handle, LoadError>;
}

/// Loads libraries into the current process with the OS loader
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLoader;

impl NativeLoader for SystemLoader {
    type Handle = Library;

    fn load_path(&self, path: &Path) -> Result<Library, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound {
                path: path.display().to_string(),
            });
        }
        Library::open(path)
    }

    fn load_name(&self, name: &str) -> Result<Library, LoadError> {
        Library::open(platform_library_name(host_os_family(), name))
    }
}

#[cfg(unix)]
mod sys {
    use std::ffi::{c_void, CStr, CString};

    pub struct Handle(*mut c_void);

    /// Last `dlerror()` message, clearing it
    fn last_error() -> Option<String> {
        let msg = unsafe { libc::dlerror() };
        if msg.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned())
        }
    }

    pub fn open(path: &str) -> Result<Handle, String> {
        let c_path = CString::new(path).map_err(|e| e.to_string())?;
        let raw = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if raw.is_null() {
            return Err(last_error().unwrap_or_else(|| "dlopen failed".to_string()));
        }
        Ok(Handle(raw))
    }

    pub fn symbol(handle: &Handle, name: &CStr) -> Result<*mut c_void, String> {
        last_error();
        let ptr = unsafe { libc::dlsym(handle.0, name.as_ptr()) };
        match last_error() {
            Some(msg) => Err(msg),
            None if ptr.is_null() => Err("null symbol".to_string()),
            None => Ok(ptr),
        }
    }

    pub fn close(handle: &Handle) {
        unsafe {
            libc::dlclose(handle.0);
        }
    }
}

#[cfg(windows)]
mod sys {
    use std::ffi::{c_void, CStr, OsStr};
    use std::os::windows::ffi::OsStrExt;

    pub struct Handle(*mut c_void);

    extern "system" {
        fn LoadLibraryW(filename: *const u16) -> *mut c_void;
        fn GetProcAddress(module: *mut c_void, procname: *const i8) -> *mut c_void;
        fn FreeLibrary(module: *mut c_void) -> i32;
        fn GetLastError() -> u32;
    }

    pub fn open(path: &str) -> Result<Handle, String> {
        let wide: Vec<u16> = OsStr::new(path).encode_wide().chain(Some(0)).collect();
        let raw = unsafe { LoadLibraryW(wide.as_ptr()) };
        if raw.is_null() {
            return Err(format!("error code {}", unsafe { GetLastError() }));
        }
        Ok(Handle(raw))
    }

    pub fn symbol(handle: &Handle, name: &CStr) -> Result<*mut c_void, String> {
        let ptr = unsafe { GetProcAddress(handle.0, name.as_ptr()) };
        if ptr.is_null() {
            return Err(format!("error code {}", unsafe { GetLastError() }));
        }
        Ok(ptr)
    }

    pub fn close(handle: &Handle) {
        unsafe {
            FreeLibrary(handle.0);
        }
    }
}
