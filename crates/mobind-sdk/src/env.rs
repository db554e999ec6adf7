//! Per-architecture build environments.
//!
//! A [`BuildEnvironment`] is a typed record of everything one compile step
//! needs: target triple, C compiler, sysroot and flags. It is turned into
//! `KEY=VALUE` pairs exactly once, by [`BuildEnvironment::to_env_vars`], right
//! before the compiler process is spawned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::toolchain::ToolchainLocator;
use crate::types::{Arch, BindError, Platform};

/// Default `-miphoneos-version-min`.
pub const DEFAULT_IOS_DEPLOYMENT_TARGET: &str = "12.0";

/// Default Android API level.
pub const DEFAULT_ANDROID_API: u32 = 24;

/// Caller-controlled inputs shared by every architecture of one bind run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSettings {
    /// Minimum iOS version (`-miphoneos-version-min` / `-mios-simulator-version-min`).
    pub ios_deployment_target: String,
    /// Android API level used to select the NDK compiler.
    pub android_api: u32,
    /// Extra C flags, appended after the computed ones.
    pub cflags: Vec<String>,
    /// Extra linker flags, passed to rustc as `-C link-arg=...`.
    pub ldflags: Vec<String>,
    /// Variables that replace computed ones with the same name.
    pub overrides: BTreeMap<String, String>,
    /// Directory holding staged support headers.
    pub include_dir: Option<PathBuf>,
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            ios_deployment_target: DEFAULT_IOS_DEPLOYMENT_TARGET.to_string(),
            android_api: DEFAULT_ANDROID_API,
            cflags: Vec::new(),
            ldflags: Vec::new(),
            overrides: BTreeMap::new(),
            include_dir: None,
        }
    }
}

/// The isolated configuration for one compile invocation.
///
/// Built once per architecture before any build starts and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvironment {
    platform: Platform,
    arch: Arch,
    triple: &'static str,
    cc: PathBuf,
    cxx: PathBuf,
    ar: Option<PathBuf>,
    sysroot: PathBuf,
    cflags: Vec<String>,
    ldflags: Vec<String>,
    deployment_target: Option<String>,
    overrides: BTreeMap<String, String>,
}

impl BuildEnvironment {
    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Rust target triple (`aarch64-apple-ios`, ...).
    pub fn triple(&self) -> &'static str {
        self.triple
    }

    pub fn cc(&self) -> &Path {
        &self.cc
    }

    pub fn sysroot(&self) -> &Path {
        &self.sysroot
    }

    /// C flags: computed flags first, caller flags last.
    pub fn cflags(&self) -> &[String] {
        &self.cflags
    }

    pub fn ldflags(&self) -> &[String] {
        &self.ldflags
    }

    /// Serializes the environment into the variables handed to the compiler.
    ///
    /// Keys follow the `cc` crate and cargo conventions (`CC_<triple>`,
    /// `CFLAGS_<triple>`, `CARGO_TARGET_<TRIPLE>_LINKER`, ...). Caller overrides
    /// are applied last and win on collision.
    pub fn to_env_vars(&self) -> BTreeMap<String, String> {
        let lower = self.triple.replace('-', "_");
        let upper = lower.to_uppercase();
        let cflags = self.cflags.join(" ");

        let mut vars = BTreeMap::new();
        vars.insert("CARGO_BUILD_TARGET".to_string(), self.triple.to_string());
        vars.insert(
            "MOBIND_TARGET_OS".to_string(),
            self.platform.as_str().to_string(),
        );
        vars.insert(
            "MOBIND_TARGET_ARCH".to_string(),
            self.arch.as_str().to_string(),
        );
        vars.insert(format!("CC_{}", lower), path_string(&self.cc));
        vars.insert(format!("CXX_{}", lower), path_string(&self.cxx));
        vars.insert(format!("CFLAGS_{}", lower), cflags.clone());
        vars.insert(format!("CXXFLAGS_{}", lower), cflags);
        if let Some(ar) = &self.ar {
            vars.insert(format!("AR_{}", lower), path_string(ar));
        }

        match self.platform {
            Platform::Android => {
                vars.insert(format!("CARGO_TARGET_{}_LINKER", upper), path_string(&self.cc));
            }
            Platform::Ios => {
                if let Some(target) = &self.deployment_target {
                    vars.insert("IPHONEOS_DEPLOYMENT_TARGET".to_string(), target.clone());
                }
            }
        }

        if !self.ldflags.is_empty() {
            let rustflags = self
                .ldflags
                .iter()
                .map(|flag| format!("-Clink-arg={}", flag))
                .collect::<Vec<_>>()
                .join(" ");
            vars.insert(format!("CARGO_TARGET_{}_RUSTFLAGS", upper), rustflags);
        }

        for (key, value) in &self.overrides {
            vars.insert(key.clone(), value.clone());
        }
        vars
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Derives `clang++` from a `clang` path, keeping any prefix or suffix
/// (`aarch64-linux-android24-clang` -> `aarch64-linux-android24-clang++`).
fn cxx_for(cc: &Path) -> PathBuf {
    let Some(name) = cc.file_name().and_then(|n| n.to_str()) else {
        return cc.to_path_buf();
    };
    match name.rfind("clang") {
        Some(idx) => {
            let (head, tail) = name.split_at(idx + "clang".len());
            cc.with_file_name(format!("{}++{}", head, tail))
        }
        None => cc.to_path_buf(),
    }
}

/// Produces [`BuildEnvironment`]s from a toolchain locator and shared settings.
pub struct EnvironmentBuilder<'a> {
    locator: &'a dyn ToolchainLocator,
    settings: &'a EnvSettings,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(locator: &'a dyn ToolchainLocator, settings: &'a EnvSettings) -> Self {
        Self { locator, settings }
    }

    /// Builds the environment for one architecture. Runs no build.
    pub fn build(&self, arch: Arch, platform: Platform) -> Result<BuildEnvironment, BindError> {
        let triple = platform.rust_triple(arch)?;
        let mut env = match platform {
            Platform::Ios => self.ios(arch, triple)?,
            Platform::Android => self.android(arch, triple)?,
        };

        if let Some(include) = &self.settings.include_dir {
            env.cflags.push(format!("-I{}", include.display()));
        }
        env.cflags.extend(self.settings.cflags.iter().cloned());
        env.ldflags.extend(self.settings.ldflags.iter().cloned());
        env.overrides = self.settings.overrides.clone();

        tracing::debug!(
            %platform,
            %arch,
            cc = %env.cc.display(),
            sysroot = %env.sysroot.display(),
            "built environment"
        );
        Ok(env)
    }

    fn ios(&self, arch: Arch, triple: &'static str) -> Result<BuildEnvironment, BindError> {
        let clang_arch = Platform::Ios.arch_tag(arch)?;
        let target = &self.settings.ios_deployment_target;
        let (sdk, min_flag) = match arch {
            Arch::X86_64 => (
                "iphonesimulator",
                format!("-mios-simulator-version-min={}", target),
            ),
            _ => ("iphoneos", format!("-miphoneos-version-min={}", target)),
        };

        let cc = self.locator.find_compiler(Platform::Ios, sdk)?;
        let sysroot = self.locator.find_sdk_root(Platform::Ios, sdk)?;
        let cflags = vec![
            "-isysroot".to_string(),
            path_string(&sysroot),
            min_flag,
            "-arch".to_string(),
            clang_arch.to_string(),
        ];

        Ok(BuildEnvironment {
            platform: Platform::Ios,
            arch,
            triple,
            cxx: cxx_for(&cc),
            cc,
            ar: None,
            sysroot,
            cflags,
            ldflags: Vec::new(),
            deployment_target: Some(target.clone()),
            overrides: BTreeMap::new(),
        })
    }

    fn android(&self, arch: Arch, triple: &'static str) -> Result<BuildEnvironment, BindError> {
        let clang_triple = match arch {
            Arch::Arm => "armv7a-linux-androideabi",
            Arch::Arm64 => "aarch64-linux-android",
            Arch::X86 => "i686-linux-android",
            Arch::X86_64 => "x86_64-linux-android",
        };
        let api = self.settings.android_api;
        let sdk = format!("{}{}", clang_triple, api);

        let cc = self.locator.find_compiler(Platform::Android, &sdk)?;
        let sysroot = self.locator.find_sdk_root(Platform::Android, &sdk)?;
        let cflags = vec![
            format!("--sysroot={}", sysroot.display()),
            format!("-D__ANDROID_API__={}", api),
        ];

        Ok(BuildEnvironment {
            platform: Platform::Android,
            arch,
            triple,
            cxx: cxx_for(&cc),
            ar: Some(cc.with_file_name("llvm-ar")),
            cc,
            sysroot,
            cflags,
            ldflags: Vec::new(),
            deployment_target: None,
            overrides: BTreeMap::new(),
        })
    }
}
