//! Multi-architecture build orchestration for mobile bindings
//!
//! `mobind-sdk` cross-compiles one Rust library crate for several mobile
//! architectures at once and packages the results the way native mobile
//! toolchains expect them:
//!
//! - **iOS**: a static `.framework` bundle with a fat (`lipo`) binary, headers,
//!   a module map and an `Info.plist`
//! - **Android**: a `jniLibs/<abi>/lib<name>.so` tree
//!
//! # Quick Start
//!
//! ```no_run
//! use mobind_sdk::{BindOptions, Binder, BuildProfile};
//!
//! fn main() -> Result<(), mobind_sdk::BindError> {
//!     let options = BindOptions::new("ios/arm64,ios/x86_64", "my-crate", "my_crate")
//!         .profile(BuildProfile::Release)
//!         .header("my-crate/include/my_crate.h");
//!
//!     let report = Binder::new(options).bind()?;
//!     println!("Framework: {}", report.bundle.display());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! | Stage | Module | What it does |
//! |-------|--------|--------------|
//! | Parse | [`target`] | `ios/arm64,ios/x86_64` -> platform + architectures |
//! | Environment | [`env`] | compiler, sysroot and flags per architecture |
//! | Dispatch | [`dispatch`] | one concurrent compile per architecture, join-all |
//! | Merge | [`merge`] | `lipo` the per-architecture archives into one |
//! | Assemble | [`bundle`] | framework directories, symlinks, module map |
//!
//! External tools sit behind traits ([`ToolchainLocator`], [`Compiler`],
//! [`ArchiveTool`]) so the whole pipeline can run against fakes, and every side
//! effect goes through an [`Executor`] so `--dry-run` shares the real code path.

pub mod bundle;
pub mod dispatch;
pub mod env;
pub mod exec;
pub mod merge;
pub mod pipeline;
pub mod target;
pub mod templates;
pub mod toolchain;
pub mod types;

pub use bundle::{
    Bundle, BundleConfig, ModuleManifest, Resource, assemble, assemble_jni_libs,
    validate_bundle_root,
};
pub use dispatch::{CargoCompiler, Compiler, dispatch_all};
pub use env::{BuildEnvironment, EnvSettings, EnvironmentBuilder};
pub use exec::Executor;
pub use merge::{ArchiveTool, Lipo, TaggedArtifact, merge};
pub use pipeline::{BindOptions, BindReport, Binder};
pub use target::TargetSpec;
pub use toolchain::{NdkLocator, ToolchainLocator, VersionMarker, XcrunLocator};
pub use types::{Arch, BindError, BuildMode, BuildProfile, BuildResult, ParseError, Platform};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
