//! Host environment probe: binary lookup, platform identity and privileges.
//!
//! Everything the installer needs to know about the machine goes through
//! [`HostEnv`] so that resolution decisions can be exercised in tests
//! without touching the real PATH.

use std::path::PathBuf;

/// Operating system / CPU architecture pair, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// `macos`, `linux`, `windows`, ...
    pub os: String,
    /// `arm64`, `x64`, ...
    pub arch: String,
}

impl Platform {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: normalize_os(os).to_owned(),
            arch: normalize_arch(arch).to_owned(),
        }
    }

    /// The platform this process is running on.
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn is_linux(&self) -> bool {
        self.os == "linux"
    }
}

/// Map the spellings tools use for an OS onto one canonical name.
pub fn normalize_os(os: &str) -> &str {
    match os.to_ascii_lowercase().as_str() {
        "darwin" | "macos" | "osx" | "mac" => "macos",
        "linux" => "linux",
        "windows" | "win32" | "win" => "windows",
        "freebsd" => "freebsd",
        _ => os,
    }
}

/// Map the spellings tools use for an architecture onto one canonical name.
pub fn normalize_arch(arch: &str) -> &str {
    match arch.to_ascii_lowercase().as_str() {
        "aarch64" | "arm64" => "arm64",
        "x86_64" | "x64" | "amd64" => "x64",
        "x86" | "i386" | "i686" | "ia32" => "x86",
        "arm" | "armv7" | "armv7l" => "arm",
        _ => arch,
    }
}

/// Facts about the host the installer runs on.
pub trait HostEnv: Send + Sync {
    /// Resolve an executable on the lookup path.
    fn which(&self, bin: &str) -> Option<PathBuf>;

    /// Running platform.
    fn platform(&self) -> Platform;

    /// Whether the process runs with an effective uid of 0.
    fn is_superuser(&self) -> bool;

    /// Convenience wrapper around [`HostEnv::which`].
    fn has_binary(&self, bin: &str) -> bool {
        self.which(bin).is_some()
    }
}

/// The real host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl HostEnv for SystemHost {
    fn which(&self, bin: &str) -> Option<PathBuf> {
        which::which(bin).ok()
    }

    fn platform(&self) -> Platform {
        Platform::current()
    }

    fn is_superuser(&self) -> bool {
        effective_uid_is_root()
    }
}

#[cfg(unix)]
fn effective_uid_is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn effective_uid_is_root() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_platform_names() {
        assert_eq!(Platform::new("darwin", "aarch64"), Platform::new("macos", "arm64"));
        assert_eq!(normalize_arch("amd64"), "x64");
        assert_eq!(normalize_arch("x86_64"), "x64");
        assert_eq!(normalize_os("Windows"), "windows");
        assert_eq!(normalize_arch("riscv64"), "riscv64");
    }

    #[cfg(unix)]
    #[test]
    fn superuser_matches_effective_uid() {
        assert_eq!(SystemHost.is_superuser(), nix::unistd::geteuid().as_raw() == 0);
    }

    #[test]
    fn system_host_cannot_find_nonsense_binary() {
        assert!(!SystemHost.has_binary("nonexistent_binary_xyz_123"));
    }
}
