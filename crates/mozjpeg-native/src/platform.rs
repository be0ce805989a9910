//! Host platform detection
//!
//! Works out which native library variant fits the running process:
//! operating system family, CPU architecture, and a temp directory that
//! permits executing binaries placed in it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Operating system family a native library is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    Windows,
    Mac,
    Unknown,
}

impl OsFamily {
    /// Shared library file extension, including the leading dot.
    ///
    /// `Unknown` has no extension, which yields a file name that will not load.
    pub fn lib_extension(self) -> &'static str {
        match self {
            OsFamily::Linux => ".so",
            OsFamily::Windows => ".dll",
            OsFamily::Mac => ".dylib",
            OsFamily::Unknown => "",
        }
    }

    /// Segment name used in resource and extraction paths
    pub fn as_str(self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Windows => "windows",
            OsFamily::Mac => "mac",
            OsFamily::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architecture a native library is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuArch {
    X86,
    X86_64,
    Unknown,
}

impl CpuArch {
    pub fn as_str(self) -> &'static str {
        match self {
            CpuArch::X86 => "x86",
            CpuArch::X86_64 => "x86_64",
            CpuArch::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CpuArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a host-reported OS name.
///
/// Case-insensitive substring match, checked in order: `linux`, `windows`, `mac`.
pub fn detect_os_family(os_name: &str) -> OsFamily {
    let name = os_name.to_ascii_lowercase();
    if name.contains("linux") {
        OsFamily::Linux
    } else if name.contains("windows") {
        OsFamily::Windows
    } else if name.contains("mac") {
        OsFamily::Mac
    } else {
        OsFamily::Unknown
    }
}

/// Classify a host-reported architecture name.
pub fn detect_architecture(arch: &str) -> CpuArch {
    let arch = arch.to_ascii_lowercase();
    if arch.contains("86_64") || arch.contains("amd64") {
        CpuArch::X86_64
    } else if arch.contains("86") {
        CpuArch::X86
    } else {
        CpuArch::Unknown
    }
}

/// OS family of the running process
pub fn host_os_family() -> OsFamily {
    detect_os_family(std::env::consts::OS)
}

/// Architecture of the running process
pub fn host_architecture() -> CpuArch {
    detect_architecture(std::env::consts::ARCH)
}

/// Everything about the host that selects a library variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub os: OsFamily,
    pub arch: CpuArch,
    pub simd_disabled: bool,
}

impl Fingerprint {
    /// Build a fingerprint, forcing SIMD off on 32-bit x86.
    pub fn new(os: OsFamily, arch: CpuArch, simd_disabled: bool) -> Self {
        Self {
            os,
            arch,
            simd_disabled: simd_disabled || arch == CpuArch::X86,
        }
    }

    /// Fingerprint of the running process
    pub fn host(simd_disabled: bool) -> Self {
        Self::new(host_os_family(), host_architecture(), simd_disabled)
    }

    /// `simd_enabled` or `simd_disabled`
    pub fn simd_mode(&self) -> &'static str {
        if self.simd_disabled {
            "simd_disabled"
        } else {
            "simd_enabled"
        }
    }

    /// Variant directory name, e.g. `linux_simd_enabled_x86_64`
    pub fn variant(&self) -> String {
        format!("{}_{}_{}", self.os, self.simd_mode(), self.arch)
    }
}

/// Strip a trailing path separator, keeping a bare root intact.
fn strip_trailing_separator(dir: &str) -> String {
    let trimmed = dir.strip_suffix(MAIN_SEPARATOR).unwrap_or(dir);
    if trimmed.is_empty() && !dir.is_empty() {
        return dir.to_string();
    }
    trimmed.to_string()
}

/// The environment-reported temp directory.
pub fn temp_directory() -> PathBuf {
    PathBuf::from(strip_trailing_separator(
        &std::env::temp_dir().to_string_lossy(),
    ))
}

/// The user's home directory, or an empty path if it can't be determined.
pub fn user_home_directory() -> PathBuf {
    dirs::home_dir()
        .map(|home| PathBuf::from(strip_trailing_separator(&home.to_string_lossy())))
        .unwrap_or_default()
}

/// A temp directory binaries can be executed from.
///
/// On Linux, a temp directory mounted `noexec` is swapped for `~/tmp`
/// (created on demand). Probe failures keep the default temp directory.
/// Other platforms skip the probe.
pub fn executable_temp_directory() -> PathBuf {
    executable_temp_directory_for(host_os_family())
}

fn executable_temp_directory_for(os: OsFamily) -> PathBuf {
    let temp = temp_directory();
    if os != OsFamily::Linux {
        return temp;
    }
    match read_mount_table() {
        Some(table) => exec_capable_temp_dir(&table, temp, &user_home_directory()),
        None => temp,
    }
}

/// `temp`, or `<home>/tmp` when `temp` sits on a `noexec` mount in `table`.
///
/// The replacement is created if missing; if that fails, `temp` is kept.
fn exec_capable_temp_dir(table: &str, temp: PathBuf, home: &Path) -> PathBuf {
    if home.as_os_str().is_empty() || !is_noexec_mount(table, &temp) {
        return temp;
    }

    let home_temp = home.join("tmp");
    if let Err(e) = fs::create_dir_all(&home_temp) {
        tracing::debug!(path = %home_temp.display(), error = %e, "could not create home temp directory");
        return temp;
    }
    tracing::debug!(
        temp = %temp.display(),
        replacement = %home_temp.display(),
        "temp directory is mounted noexec"
    );
    home_temp
}

fn read_mount_table() -> Option<String> {
    fs::read_to_string("/proc/self/mounts")
        .or_else(|_| fs::read_to_string("/proc/mounts"))
        .ok()
}

/// Whether `dir` lives on a mount carrying the `noexec` option.
///
/// `table` is in `/proc/mounts` format. The mount with the longest mount
/// point that is a prefix of `dir` wins.
pub fn is_noexec_mount(table: &str, dir: &Path) -> bool {
    if dir.as_os_str().is_empty() {
        return false;
    }

    let mut best: Option<(usize, bool)> = None;
    for line in table.lines() {
        let mut fields = line.split_whitespace();
        let (Some(_device), Some(mount_point), Some(_fs_type), Some(options)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };

        let mount_point = unescape_mount_field(mount_point);
        if !dir.starts_with(&mount_point) {
            continue;
        }

        let depth = Path::new(&mount_point).components().count();
        let noexec = options.split(',').any(|opt| opt == "noexec");
        // Later entries shadow earlier ones at the same mount point
        if best.map_or(true, |(d, _)| depth >= d) {
            best = Some((depth, noexec));
        }
    }

    best.map_or(false, |(_, noexec)| noexec)
}

/// Decode the octal escapes (`\040` for space etc.) used in mount tables.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let parsed = std::str::from_utf8(&bytes[i + 1..i + 4])
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 8).ok());
            if let Some(value) = parsed {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Where extracted variants are rooted
#[derive(Debug, Clone, PartialEq, Eq)]
enum TempRoot {
    /// Re-probed on every call
    Probed,
    Fixed(PathBuf),
}

/// Host facts the orchestrator needs for a load attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: OsFamily,
    pub arch: CpuArch,
    temp_root: TempRoot,
}

impl Platform {
    /// The running host. The temp directory is probed afresh each time
    /// [`Platform::temp_dir`] is called.
    pub fn host() -> Self {
        Self {
            os: host_os_family(),
            arch: host_architecture(),
            temp_root: TempRoot::Probed,
        }
    }

    /// A fixed platform, for tests and cross-provisioning.
    pub fn new(os: OsFamily, arch: CpuArch, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            os,
            arch,
            temp_root: TempRoot::Fixed(temp_dir.into()),
        }
    }

    /// Root under which variants are extracted
    pub fn temp_dir(&self) -> PathBuf {
        match &self.temp_root {
            TempRoot::Probed => executable_temp_directory_for(self.os),
            TempRoot::Fixed(dir) => dir.clone(),
        }
    }

    pub fn fingerprint(&self, simd_disabled: bool) -> Fingerprint {
        Fingerprint::new(self.os, self.arch, simd_disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_os_family() {
        assert_eq!(detect_os_family("Linux"), OsFamily::Linux);
        assert_eq!(detect_os_family("Windows 10"), OsFamily::Windows);
        assert_eq!(detect_os_family("Mac OS X"), OsFamily::Mac);
        assert_eq!(detect_os_family("macos"), OsFamily::Mac);
        assert_eq!(detect_os_family("FreeBSD"), OsFamily::Unknown);
        assert_eq!(detect_os_family(""), OsFamily::Unknown);
    }

    #[test]
    fn test_detect_architecture() {
        assert_eq!(detect_architecture("x86_64"), CpuArch::X86_64);
        assert_eq!(detect_architecture("amd64"), CpuArch::X86_64);
        assert_eq!(detect_architecture("AMD64"), CpuArch::X86_64);
        assert_eq!(detect_architecture("x86"), CpuArch::X86);
        assert_eq!(detect_architecture("i386"), CpuArch::X86);
        assert_eq!(detect_architecture("i686"), CpuArch::X86);
        assert_eq!(detect_architecture("aarch64"), CpuArch::Unknown);
    }

    #[test]
    fn test_lib_extensions() {
        assert_eq!(OsFamily::Linux.lib_extension(), ".so");
        assert_eq!(OsFamily::Windows.lib_extension(), ".dll");
        assert_eq!(OsFamily::Mac.lib_extension(), ".dylib");
        assert_eq!(OsFamily::Unknown.lib_extension(), "");
    }

    #[test]
    fn test_x86_forces_simd_disabled() {
        let fp = Fingerprint::new(OsFamily::Linux, CpuArch::X86, false);
        assert!(fp.simd_disabled);
        assert_eq!(fp.variant(), "linux_simd_disabled_x86");

        let fp = Fingerprint::new(OsFamily::Windows, CpuArch::X86_64, false);
        assert!(!fp.simd_disabled);
        assert_eq!(fp.variant(), "windows_simd_enabled_x86_64");
    }

    #[test]
    fn test_strip_trailing_separator() {
        let sep = MAIN_SEPARATOR;
        assert_eq!(strip_trailing_separator(&format!("{sep}tmp{sep}")), format!("{sep}tmp"));
        assert_eq!(strip_trailing_separator(&format!("{sep}tmp")), format!("{sep}tmp"));
        assert_eq!(strip_trailing_separator(""), "");
    }

    #[test]
    fn test_noexec_probe() {
        let table = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
/dev/sda1 / ext4 rw,relatime 0 0
tmpfs /tmp tmpfs rw,nosuid,nodev,noexec 0 0
";
        assert!(is_noexec_mount(table, Path::new("/tmp")));
        assert!(is_noexec_mount(table, Path::new("/tmp/sub")));
        assert!(!is_noexec_mount(table, Path::new("/var/tmp")));
        assert!(!is_noexec_mount(table, Path::new("/tmpfoo")));
        assert!(!is_noexec_mount(table, Path::new("")));
    }

    #[test]
    fn test_noexec_probe_remount_shadows() {
        let table = "\
tmpfs /tmp tmpfs rw,noexec 0 0
tmpfs /tmp tmpfs rw,exec 0 0
";
        assert!(!is_noexec_mount(table, Path::new("/tmp")));
    }

    #[test]
    fn test_mount_point_escapes() {
        assert_eq!(unescape_mount_field("/mnt/my\\040disk"), "/mnt/my disk");
        let table = "/dev/sdb1 /mnt/my\\040disk ext4 rw,noexec 0 0\n";
        assert!(is_noexec_mount(table, Path::new("/mnt/my disk/tmp")));
    }

    #[test]
    fn test_host_detection() {
        // Informational on exotic hosts; CI runs on x86_64
        let _ = host_os_family();
        let _ = host_architecture();
        assert!(!temp_directory().as_os_str().is_empty());
    }

    #[test]
    fn test_non_linux_skips_probe() {
        assert_eq!(executable_temp_directory_for(OsFamily::Windows), temp_directory());
        assert_eq!(executable_temp_directory_for(OsFamily::Unknown), temp_directory());
    }

    const NOEXEC_TMP: &str = "/dev/sda1 / ext4 rw,relatime 0 0\ntmpfs /tmp tmpfs rw,nosuid,noexec 0 0\n";

    #[test]
    fn test_noexec_temp_moves_to_home() {
        let home = tempfile::TempDir::new().unwrap();
        let dir = exec_capable_temp_dir(NOEXEC_TMP, PathBuf::from("/tmp"), home.path());
        assert_eq!(dir, home.path().join("tmp"));
        assert!(dir.is_dir());

        // An existing replacement is reused
        let again = exec_capable_temp_dir(NOEXEC_TMP, PathBuf::from("/tmp"), home.path());
        assert_eq!(again, dir);
    }

    #[test]
    fn test_exec_temp_is_kept() {
        let home = tempfile::TempDir::new().unwrap();
        let table = "tmpfs /tmp tmpfs rw,nosuid 0 0\n";
        let dir = exec_capable_temp_dir(table, PathBuf::from("/tmp"), home.path());
        assert_eq!(dir, PathBuf::from("/tmp"));
        assert!(!home.path().join("tmp").exists());
    }

    #[test]
    fn test_uncreatable_home_temp_keeps_temp() {
        let home = tempfile::TempDir::new().unwrap();
        // A plain file where the directory should go
        fs::write(home.path().join("tmp"), b"").unwrap();
        let dir = exec_capable_temp_dir(NOEXEC_TMP, PathBuf::from("/tmp"), home.path());
        assert_eq!(dir, PathBuf::from("/tmp"));
    }

    #[test]
    fn test_unknown_home_keeps_temp() {
        let dir = exec_capable_temp_dir(NOEXEC_TMP, PathBuf::from("/tmp"), Path::new(""));
        assert_eq!(dir, PathBuf::from("/tmp"));
    }

    #[test]
    fn test_platform_temp_dir() {
        let fixed = Platform::new(OsFamily::Linux, CpuArch::X86_64, "/scratch");
        assert_eq!(fixed.temp_dir(), PathBuf::from("/scratch"));

        let host = Platform::host();
        assert_eq!(host.temp_dir(), executable_temp_directory());
    }
}
