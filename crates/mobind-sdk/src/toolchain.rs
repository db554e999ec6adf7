//! Toolchain discovery.
//!
//! The pipeline never hardcodes where compilers live. It asks a
//! [`ToolchainLocator`] for the C compiler and SDK root of a platform, so tests
//! can substitute a fake and real runs can use:
//!
//! - [`XcrunLocator`] for iOS (`xcrun --sdk <sdk> --find clang` and
//!   `xcrun --sdk <sdk> --show-sdk-path`)
//! - [`NdkLocator`] for Android (the LLVM toolchain inside an Android NDK)
//!
//! This module also owns the installed-toolchain [`VersionMarker`] written by
//! `mobind init` and the rustup target check.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use crate::exec::Executor;
use crate::types::{Arch, BindError, Platform};

/// Resolves compiler and SDK locations for a platform.
///
/// `sdk` is platform specific: an Xcode SDK name (`iphoneos`,
/// `iphonesimulator`) for iOS, a clang target with API level
/// (`aarch64-linux-android24`) for Android.
pub trait ToolchainLocator: Sync {
    /// Path of the C compiler for `sdk`.
    fn find_compiler(&self, platform: Platform, sdk: &str) -> Result<PathBuf, BindError>;

    /// Root of the SDK (sysroot) for `sdk`.
    fn find_sdk_root(&self, platform: Platform, sdk: &str) -> Result<PathBuf, BindError>;
}

fn wrong_platform(expected: Platform, got: Platform) -> BindError {
    BindError::ToolchainUnavailable {
        platform: got,
        reason: format!("this locator only resolves {} toolchains", expected),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum XcrunQuery {
    Clang,
    SdkPath,
}

/// Locates the iOS toolchain through `xcrun`.
///
/// Results are cached per (SDK, query) for the lifetime of the locator, so one
/// bind invocation runs `xcrun` at most twice per SDK no matter how many
/// architectures share it.
#[derive(Debug, Default)]
pub struct XcrunLocator {
    exec: Executor,
    cache: Mutex<HashMap<(String, XcrunQuery), PathBuf>>,
}

impl XcrunLocator {
    pub fn new(exec: Executor) -> Self {
        Self {
            exec,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn query(&self, sdk: &str, query: XcrunQuery) -> Result<PathBuf, BindError> {
        let key = (sdk.to_string(), query);
        if let Ok(cache) = self.cache.lock()
            && let Some(path) = cache.get(&key)
        {
            return Ok(path.clone());
        }

        let mut cmd = Command::new("xcrun");
        cmd.arg("--sdk").arg(sdk);
        let (description, placeholder) = match query {
            XcrunQuery::Clang => {
                cmd.args(["--find", "clang"]);
                ("xcrun --find clang", format!("clang-{}", sdk))
            }
            XcrunQuery::SdkPath => {
                cmd.arg("--show-sdk-path");
                ("xcrun --show-sdk-path", sdk.to_string())
            }
        };

        let resolved = match self.exec.output(cmd, description) {
            Ok(Some(path)) if !path.is_empty() => PathBuf::from(path),
            Ok(Some(_)) => {
                return Err(BindError::ToolchainUnavailable {
                    platform: Platform::Ios,
                    reason: format!("{} returned nothing for SDK {}", description, sdk),
                });
            }
            // dry run: no process was started
            Ok(None) => PathBuf::from(placeholder),
            Err(diagnostic) => {
                return Err(BindError::ToolchainUnavailable {
                    platform: Platform::Ios,
                    reason: format!(
                        "Xcode not available ({}).\n\
                         Install Xcode and run: xcode-select --install",
                        diagnostic.trim()
                    ),
                });
            }
        };

        tracing::debug!(sdk, ?query, path = %resolved.display(), "resolved xcrun lookup");
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, resolved.clone());
        }
        Ok(resolved)
    }
}

impl ToolchainLocator for XcrunLocator {
    fn find_compiler(&self, platform: Platform, sdk: &str) -> Result<PathBuf, BindError> {
        if platform != Platform::Ios {
            return Err(wrong_platform(Platform::Ios, platform));
        }
        self.query(sdk, XcrunQuery::Clang)
    }

    fn find_sdk_root(&self, platform: Platform, sdk: &str) -> Result<PathBuf, BindError> {
        if platform != Platform::Ios {
            return Err(wrong_platform(Platform::Ios, platform));
        }
        self.query(sdk, XcrunQuery::SdkPath)
    }
}

/// Locates the LLVM toolchain inside an Android NDK.
///
/// Lookups only inspect the filesystem, so they behave the same in a dry run.
#[derive(Debug, Clone)]
pub struct NdkLocator {
    ndk_root: Option<PathBuf>,
}

impl NdkLocator {
    /// `ndk_root` is the NDK installation directory, usually taken from
    /// `ANDROID_NDK_HOME` or the `[android] ndk_home` config key.
    pub fn new(ndk_root: Option<PathBuf>) -> Self {
        Self { ndk_root }
    }

    /// Finds an NDK from the conventional environment variables.
    pub fn discover_root() -> Option<PathBuf> {
        for var in ["ANDROID_NDK_HOME", "ANDROID_NDK_ROOT", "NDK_HOME"] {
            if let Some(path) = std::env::var_os(var).filter(|v| !v.is_empty()) {
                return Some(PathBuf::from(path));
            }
        }
        let sdk = std::env::var_os("ANDROID_HOME").filter(|v| !v.is_empty())?;
        let bundle = PathBuf::from(sdk).join("ndk-bundle");
        bundle.is_dir().then_some(bundle)
    }

    fn host_tag() -> &'static str {
        match std::env::consts::OS {
            "macos" => "darwin-x86_64",
            "windows" => "windows-x86_64",
            _ => "linux-x86_64",
        }
    }

    fn prebuilt_dir(&self) -> Result<PathBuf, BindError> {
        let Some(root) = &self.ndk_root else {
            return Err(BindError::ToolchainUnavailable {
                platform: Platform::Android,
                reason: "no Android NDK path is set.\n\
                         Set ANDROID_NDK_HOME or `[android] ndk_home` in mobind.toml."
                    .to_string(),
            });
        };
        Ok(root
            .join("toolchains")
            .join("llvm")
            .join("prebuilt")
            .join(Self::host_tag()))
    }

    fn existing(path: PathBuf, what: &str) -> Result<PathBuf, BindError> {
        if !path.exists() {
            return Err(BindError::ToolchainUnavailable {
                platform: Platform::Android,
                reason: format!(
                    "{} not found at {}; check that the NDK (r21 or newer) is installed",
                    what,
                    path.display()
                ),
            });
        }
        Ok(path)
    }
}

impl ToolchainLocator for NdkLocator {
    fn find_compiler(&self, platform: Platform, sdk: &str) -> Result<PathBuf, BindError> {
        if platform != Platform::Android {
            return Err(wrong_platform(Platform::Android, platform));
        }
        let exe = if cfg!(windows) { ".cmd" } else { "" };
        let clang = self
            .prebuilt_dir()?
            .join("bin")
            .join(format!("{}-clang{}", sdk, exe));
        Self::existing(clang, "NDK clang")
    }

    fn find_sdk_root(&self, platform: Platform, _sdk: &str) -> Result<PathBuf, BindError> {
        if platform != Platform::Android {
            return Err(wrong_platform(Platform::Android, platform));
        }
        let sysroot = self.prebuilt_dir()?.join("sysroot");
        Self::existing(sysroot, "NDK sysroot")
    }
}

/// Records which compiler version `mobind init` prepared the toolchain for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker {
    path: PathBuf,
}

impl VersionMarker {
    /// Marker stored under `home` (see [`VersionMarker::default_home`]).
    pub fn in_home(home: &Path) -> Self {
        Self {
            path: home.join("version"),
        }
    }

    /// `$MOBIND_HOME`, or `~/.mobind`.
    pub fn default_home() -> Option<PathBuf> {
        if let Some(home) = std::env::var_os("MOBIND_HOME").filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(home));
        }
        let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"))?;
        Some(PathBuf::from(home).join(".mobind"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the recorded version, if any.
    pub fn read(&self) -> Result<Option<String>, BindError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BindError::fs("read", &self.path, e)),
        }
    }

    /// Fails unless the marker exists and matches `current`.
    pub fn check(&self, current: &str) -> Result<(), BindError> {
        match self.read()? {
            None => Err(BindError::ToolchainNotInstalled {
                marker: self.path.clone(),
            }),
            Some(installed) if installed != current.trim() => Err(BindError::ToolchainOutOfDate {
                installed,
                current: current.trim().to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    pub fn write(&self, exec: &Executor, current: &str) -> Result<(), BindError> {
        exec.write_file(&self.path, format!("{}\n", current.trim()).as_bytes())
    }
}

/// Returns `rustc --version`, or `None` in dry-run mode.
pub fn current_compiler_version(exec: &Executor) -> Result<Option<String>, BindError> {
    let mut cmd = Command::new("rustc");
    cmd.arg("--version");
    exec.output(cmd, "rustc --version")
        .map_err(|reason| BindError::Config(format!("cannot determine compiler version: {}", reason)))
}

/// Checks that rustup has the standard library for every requested target.
pub fn check_rust_targets(
    exec: &Executor,
    platform: Platform,
    archs: &[Arch],
) -> Result<(), BindError> {
    let triples = archs
        .iter()
        .map(|arch| platform.rust_triple(*arch))
        .collect::<Result<Vec<_>, _>>()?;

    let mut cmd = Command::new("rustup");
    cmd.args(["target", "list", "--installed"]);
    let installed = match exec.output(cmd, "rustup target list") {
        Ok(Some(installed)) => installed,
        Ok(None) => return Ok(()),
        Err(reason) => {
            return Err(BindError::ToolchainUnavailable {
                platform,
                reason: format!("Failed to check rustup targets: {}", reason),
            });
        }
    };

    let missing: Vec<&str> = triples
        .into_iter()
        .filter(|triple| !installed.lines().any(|line| line.trim() == *triple))
        .collect();
    if !missing.is_empty() {
        return Err(BindError::ToolchainUnavailable {
            platform,
            reason: format!(
                "Rust targets not installed: {}. Install them with: rustup target add {}",
                missing.join(", "),
                missing.join(" ")
            ),
        });
    }
    Ok(())
}
