//! Core types for mobind-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`BindError`] / [`ParseError`] - Error types for every stage of the pipeline
//! - [`Platform`] / [`Arch`] - Target operating system and instruction set
//! - [`BuildProfile`] / [`BuildMode`] - What kind of artifact the compiler produces
//! - [`BuildResult`] - One successfully built per-architecture artifact

use std::fmt;
use std::path::PathBuf;

/// Errors produced while parsing a target specification string.
///
/// # Example
///
/// ```
/// use mobind_sdk::{ParseError, TargetSpec};
///
/// let err = TargetSpec::parse("android/arm,ios/arm64").unwrap_err();
/// assert!(matches!(err, ParseError::MixedPlatforms { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The target string was empty.
    #[error("invalid target \"\": expected e.g. ios, ios/arm64 or android/arm,android/x86")]
    EmptySpec,

    /// A token named an operating system mobind does not build for.
    #[error("unsupported platform {0:?}: expected \"android\" or \"ios\"")]
    UnsupportedPlatform(String),

    /// Tokens named more than one operating system.
    #[error("cannot target different platforms in one build ({first} and {other})")]
    MixedPlatforms { first: Platform, other: Platform },

    /// A token named an architecture the platform does not support.
    #[error("unsupported arch {arch:?} for {platform}; supported: {}", .platform.supported_archs_list())]
    UnsupportedArch { platform: Platform, arch: String },
}

/// Error types for mobind-sdk operations.
///
/// Every stage of the bind pipeline reports failures through this enum. All of
/// them are fatal to the current invocation.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// The target specification could not be parsed.
    #[error("invalid target: {0}")]
    Parse(#[from] ParseError),

    /// The platform SDK or cross compiler could not be located.
    #[error("{platform} toolchain unavailable: {reason}")]
    ToolchainUnavailable { platform: Platform, reason: String },

    /// The compiler failed for one architecture.
    #[error("build failed for {arch}:\n{diagnostic}")]
    CompileFailed { arch: Arch, diagnostic: String },

    /// The multi-architecture archiving tool failed.
    #[error("merging architectures failed:\n{diagnostic}")]
    MergeFailed { diagnostic: String },

    /// An architecture has no identifier in the platform's archiving tool.
    #[error("no {platform} architecture identifier for {arch}")]
    UnmappedArch { platform: Platform, arch: Arch },

    /// The requested bundle path does not carry the platform's required suffix.
    #[error("bundle name {path:?} must end with {expected:?}")]
    InvalidBundleName { path: PathBuf, expected: &'static str },

    /// A filesystem primitive failed.
    #[error("{op} {path:?} failed: {source}. Check file paths and permissions")]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No installed-toolchain marker exists yet.
    #[error("toolchain partially installed ({marker:?} missing), run `mobind init`")]
    ToolchainNotInstalled { marker: PathBuf },

    /// The installed-toolchain marker was written by a different compiler.
    #[error("toolchain out of date (installed: {installed}, current: {current}), run `mobind init`")]
    ToolchainOutOfDate { installed: String, current: String },

    /// Invalid or missing configuration.
    #[error("configuration error: {0}. Check mobind.toml or CLI flags")]
    Config(String),
}

impl BindError {
    pub(crate) fn fs(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BindError::Filesystem {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Target operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Android (per-ABI shared libraries in a `jniLibs` tree).
    Android,
    /// iOS (static framework with a fat binary).
    Ios,
}

impl Platform {
    /// Every platform, in display order.
    pub const ALL: [Platform; 2] = [Platform::Android, Platform::Ios];

    /// Returns the platform name used in target specifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }

    /// Parses a platform name as it appears in a target specification.
    pub fn from_name(name: &str) -> Option<Platform> {
        match name {
            "android" => Some(Platform::Android),
            "ios" => Some(Platform::Ios),
            _ => None,
        }
    }

    /// Architectures this platform supports, in canonical order.
    pub fn supported_archs(&self) -> &'static [Arch] {
        match self {
            Platform::Android => &[Arch::Arm, Arch::Arm64, Arch::X86, Arch::X86_64],
            Platform::Ios => &[Arch::Arm, Arch::Arm64, Arch::X86_64],
        }
    }

    pub fn supports(&self, arch: Arch) -> bool {
        self.supported_archs().contains(&arch)
    }

    fn supported_archs_list(&self) -> String {
        self.supported_archs()
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Maps an architecture to the identifier the platform's packaging tools use.
    ///
    /// This is a fixed table: iOS uses `lipo`/clang names (`armv7`, `arm64`,
    /// `x86_64`), Android uses ABI directory names (`armeabi-v7a`, `arm64-v8a`,
    /// `x86`, `x86_64`). Architectures missing from the table are an error.
    ///
    /// ```
    /// use mobind_sdk::{Arch, Platform};
    ///
    /// assert_eq!(Platform::Ios.arch_tag(Arch::Arm).unwrap(), "armv7");
    /// assert_eq!(Platform::Android.arch_tag(Arch::Arm64).unwrap(), "arm64-v8a");
    /// assert!(Platform::Ios.arch_tag(Arch::X86).is_err());
    /// ```
    pub fn arch_tag(&self, arch: Arch) -> Result<&'static str, BindError> {
        let tag = match (self, arch) {
            (Platform::Ios, Arch::Arm) => "armv7",
            (Platform::Ios, Arch::Arm64) => "arm64",
            (Platform::Ios, Arch::X86_64) => "x86_64",
            (Platform::Android, Arch::Arm) => "armeabi-v7a",
            (Platform::Android, Arch::Arm64) => "arm64-v8a",
            (Platform::Android, Arch::X86) => "x86",
            (Platform::Android, Arch::X86_64) => "x86_64",
            (platform, arch) => {
                return Err(BindError::UnmappedArch {
                    platform: *platform,
                    arch,
                });
            }
        };
        Ok(tag)
    }

    /// Rust target triple used to compile `arch` for this platform.
    pub fn rust_triple(&self, arch: Arch) -> Result<&'static str, BindError> {
        let triple = match (self, arch) {
            (Platform::Ios, Arch::Arm) => "armv7-apple-ios",
            (Platform::Ios, Arch::Arm64) => "aarch64-apple-ios",
            (Platform::Ios, Arch::X86_64) => "x86_64-apple-ios",
            (Platform::Android, Arch::Arm) => "armv7-linux-androideabi",
            (Platform::Android, Arch::Arm64) => "aarch64-linux-android",
            (Platform::Android, Arch::X86) => "i686-linux-android",
            (Platform::Android, Arch::X86_64) => "x86_64-linux-android",
            (platform, arch) => {
                return Err(BindError::UnmappedArch {
                    platform: *platform,
                    arch,
                });
            }
        };
        Ok(triple)
    }

    /// Path suffix the bundle root must carry.
    pub fn bundle_suffix(&self) -> &'static str {
        match self {
            Platform::Android => "jniLibs",
            Platform::Ios => ".framework",
        }
    }

    /// Artifact kind the compiler must produce for this platform.
    pub fn build_mode(&self) -> BuildMode {
        match self {
            Platform::Android => BuildMode::SharedLibrary,
            Platform::Ios => BuildMode::StaticArchive,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instruction-set architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    /// 32-bit ARM (ARMv7).
    Arm,
    /// 64-bit ARM (AArch64).
    Arm64,
    /// 32-bit x86.
    X86,
    /// 64-bit x86.
    X86_64,
}

impl Arch {
    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Parses an architecture name. Accepts both the canonical names and the
    /// `386`/`amd64` spellings.
    pub fn from_name(name: &str) -> Option<Arch> {
        match name {
            "arm" => Some(Arch::Arm),
            "arm64" => Some(Arch::Arm64),
            "x86" | "386" => Some(Arch::X86),
            "x86_64" | "amd64" => Some(Arch::X86_64),
            _ => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build profile controlling optimization and debug info.
///
/// ```
/// use mobind_sdk::BuildProfile;
///
/// assert_eq!(BuildProfile::Debug.as_str(), "debug");
/// assert_eq!(BuildProfile::Release.as_str(), "release");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildProfile {
    /// Debug build with debug symbols and no optimizations.
    #[default]
    Debug,
    /// Release build with optimizations enabled.
    Release,
}

impl BuildProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildProfile::Debug => "debug",
            BuildProfile::Release => "release",
        }
    }
}

/// Kind of artifact a compile step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// A linkable static archive (`lib<name>.a`).
    StaticArchive,
    /// A loadable shared library (`lib<name>.so`).
    SharedLibrary,
}

impl BuildMode {
    /// File extension of the produced artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            BuildMode::StaticArchive => "a",
            BuildMode::SharedLibrary => "so",
        }
    }
}

/// A successfully built per-architecture artifact.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BuildResult {
    /// Architecture the artifact was compiled for.
    pub arch: Arch,
    /// Location of the artifact inside the scratch directory.
    pub artifact_path: PathBuf,
}
