//! Host platform detection and the matching Java runtime download.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::DepsError;

/// Supported host platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformId {
    /// Windows on x86-64.
    WinX64,
    /// Linux on x86-64.
    LinuxX64,
    /// Linux on AArch64.
    LinuxArm64,
    /// macOS on x86-64.
    OsxX64,
    /// macOS on Apple silicon.
    OsxArm64,
}

/// Where to get a Java runtime and where it lands once extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JavaRuntimeSpec {
    /// Archive (VS Code Java extension) bundling the runtime.
    pub url: &'static str,
    /// `JAVA_HOME`, relative to the Java directory.
    pub java_home: &'static str,
    /// The `java` executable, relative to the Java directory.
    pub java_executable: &'static str,
}

impl PlatformId {
    /// Detects the platform this binary runs on.
    ///
    /// ## Errors
    /// Returns [`DepsError::UnsupportedPlatform`] for any other OS/arch pair.
    pub fn current() -> Result<Self, DepsError> {
        Self::detect(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Maps an OS/arch pair as reported by [`std::env::consts`].
    ///
    /// ## Errors
    /// Returns [`DepsError::UnsupportedPlatform`] for unknown pairs.
    pub fn detect(os: &str, arch: &str) -> Result<Self, DepsError> {
        match (os, arch) {
            ("windows", "x86_64") => Ok(Self::WinX64),
            ("linux", "x86_64") => Ok(Self::LinuxX64),
            ("linux", "aarch64") => Ok(Self::LinuxArm64),
            ("macos", "x86_64") => Ok(Self::OsxX64),
            ("macos", "aarch64") => Ok(Self::OsxArm64),
            _ => Err(DepsError::UnsupportedPlatform(format!("{os}-{arch}"))),
        }
    }

    /// Short identifier, e.g. `linux-x64`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WinX64 => "win-x64",
            Self::LinuxX64 => "linux-x64",
            Self::LinuxArm64 => "linux-arm64",
            Self::OsxX64 => "osx-x64",
            Self::OsxArm64 => "osx-arm64",
        }
    }

    /// Returns `true` on Windows, where no executable bit is needed.
    pub fn is_windows(self) -> bool {
        matches!(self, Self::WinX64)
    }

    /// Java runtime bundled with vscode-java 1.42.0 (JRE 21.0.7).
    pub fn java_runtime(self) -> JavaRuntimeSpec {
        match self {
            Self::WinX64 => JavaRuntimeSpec {
                url: "https://github.com/redhat-developer/vscode-java/releases/download/v1.42.0/java-win32-x64-1.42.0-561.vsix",
                java_home: "extension/jre/21.0.7-win32-x86_64",
                java_executable: "extension/jre/21.0.7-win32-x86_64/bin/java.exe",
            },
            Self::LinuxX64 => JavaRuntimeSpec {
                url: "https://github.com/redhat-developer/vscode-java/releases/download/v1.42.0/java-linux-x64-1.42.0-561.vsix",
                java_home: "extension/jre/21.0.7-linux-x86_64",
                java_executable: "extension/jre/21.0.7-linux-x86_64/bin/java",
            },
            Self::LinuxArm64 => JavaRuntimeSpec {
                url: "https://github.com/redhat-developer/vscode-java/releases/download/v1.42.0/java-linux-arm64-1.42.0-561.vsix",
                java_home: "extension/jre/21.0.7-linux-aarch64",
                java_executable: "extension/jre/21.0.7-linux-aarch64/bin/java",
            },
            Self::OsxX64 => JavaRuntimeSpec {
                url: "https://github.com/redhat-developer/vscode-java/releases/download/v1.42.0/java-darwin-x64-1.42.0-561.vsix",
                java_home: "extension/jre/21.0.7-macosx-x86_64",
                java_executable: "extension/jre/21.0.7-macosx-x86_64/bin/java",
            },
            Self::OsxArm64 => JavaRuntimeSpec {
                url: "https://github.com/redhat-developer/vscode-java/releases/download/v1.42.0/java-darwin-arm64-1.42.0-561.vsix",
                java_home: "extension/jre/21.0.7-macosx-aarch64",
                java_executable: "extension/jre/21.0.7-macosx-aarch64/bin/java",
            },
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JavaRuntimeSpec {
    /// Absolute `JAVA_HOME` under `java_dir`.
    pub fn java_home_in(&self, java_dir: &Path) -> PathBuf {
        java_dir.join(self.java_home)
    }

    /// Absolute `java` path under `java_dir`.
    pub fn java_executable_in(&self, java_dir: &Path) -> PathBuf {
        java_dir.join(self.java_executable)
    }
}
