//! Concurrent per-architecture builds.
//!
//! [`dispatch_all`] first builds every architecture's environment on the
//! calling thread. Only when all of them exist does it start one scoped thread
//! per architecture, and it always joins every thread before returning.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;

use crate::env::BuildEnvironment;
use crate::exec::Executor;
use crate::types::{Arch, BindError, BuildMode, BuildProfile, BuildResult};

/// Compiles the module for one environment.
///
/// Implementations must be callable from several threads at once. Each call
/// gets its own environment and output path.
pub trait Compiler: Sync {
    fn compile(&self, env: &BuildEnvironment, output: &Path, mode: BuildMode)
    -> Result<(), BindError>;
}

/// Builds a Rust library crate with `cargo build --lib --target <triple>`.
///
/// Each architecture uses its own cargo target directory next to the output
/// artifact (`<scratch>/target-<arch>`), so concurrent builds never wait on
/// each other's cargo lock.
#[derive(Debug, Clone)]
pub struct CargoCompiler {
    crate_dir: PathBuf,
    lib_name: String,
    profile: BuildProfile,
    exec: Executor,
}

impl CargoCompiler {
    /// `lib_name` is the library target name as rustc sees it (underscores,
    /// no `lib` prefix).
    pub fn new(crate_dir: impl Into<PathBuf>, lib_name: impl Into<String>, exec: Executor) -> Self {
        Self {
            crate_dir: crate_dir.into(),
            lib_name: lib_name.into(),
            profile: BuildProfile::Debug,
            exec,
        }
    }

    pub fn profile(mut self, profile: BuildProfile) -> Self {
        self.profile = profile;
        self
    }
}

impl Compiler for CargoCompiler {
    fn compile(
        &self,
        env: &BuildEnvironment,
        output: &Path,
        mode: BuildMode,
    ) -> Result<(), BindError> {
        let arch = env.arch();
        let scratch = output.parent().unwrap_or_else(|| Path::new("."));
        let target_dir = scratch.join(format!("target-{}", arch));

        let mut cmd = Command::new("cargo");
        cmd.args(["build", "--lib", "--target", env.triple()])
            .arg("--target-dir")
            .arg(&target_dir)
            .current_dir(&self.crate_dir)
            .envs(env.to_env_vars());
        if self.profile == BuildProfile::Release {
            cmd.arg("--release");
        }

        self.exec
            .run(cmd, &format!("cargo build for {}", env.triple()))
            .map_err(|diagnostic| BindError::CompileFailed { arch, diagnostic })?;

        let built = target_dir
            .join(env.triple())
            .join(self.profile.as_str())
            .join(format!("lib{}.{}", self.lib_name, mode.extension()));
        if self.exec.should_run() && !built.exists() {
            let crate_type = match mode {
                BuildMode::StaticArchive => "staticlib",
                BuildMode::SharedLibrary => "cdylib",
            };
            return Err(BindError::CompileFailed {
                arch,
                diagnostic: format!(
                    "cargo finished but {} was not produced.\n\
                     Add crate-type = [\"{}\"] to the [lib] section of {}",
                    built.display(),
                    crate_type,
                    self.crate_dir.join("Cargo.toml").display()
                ),
            });
        }
        self.exec.copy_file(&built, output)
    }
}

/// Builds every architecture and returns the artifacts in `archs` order.
///
/// `env_factory` is called for each architecture, in order, before any build
/// starts; its first error is returned without compiling anything. Builds then
/// run concurrently, one per architecture, writing
/// `<scratch>/<artifact_name>-<arch>.<ext>`. All of them are waited for even
/// when one fails, and the error reported is the first in `archs` order.
pub fn dispatch_all<F>(
    archs: &[Arch],
    mut env_factory: F,
    compiler: &dyn Compiler,
    scratch: &Path,
    artifact_name: &str,
    mode: BuildMode,
) -> Result<Vec<BuildResult>, BindError>
where
    F: FnMut(Arch) -> Result<BuildEnvironment, BindError>,
{
    let envs = archs
        .iter()
        .map(|&arch| env_factory(arch))
        .collect::<Result<Vec<_>, _>>()?;

    let outcomes: Vec<Result<BuildResult, BindError>> = thread::scope(|scope| {
        let handles: Vec<_> = envs
            .into_iter()
            .map(|env| {
                let arch = env.arch();
                let output = scratch.join(format!(
                    "{}-{}.{}",
                    artifact_name,
                    arch,
                    mode.extension()
                ));
                let handle = scope.spawn(move || -> Result<BuildResult, BindError> {
                    tracing::info!(%arch, triple = env.triple(), "compiling");
                    compiler.compile(&env, &output, mode)?;
                    tracing::debug!(%arch, artifact = %output.display(), "compiled");
                    Ok(BuildResult {
                        arch,
                        artifact_path: output,
                    })
                });
                (arch, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(arch, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(BindError::CompileFailed {
                        arch,
                        diagnostic: "build task panicked".to_string(),
                    })
                })
            })
            .collect()
    });

    let mut results = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::warn!("discarding {} finished artifact(s) after failure", results.len());
                return Err(e);
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvSettings, EnvironmentBuilder};
    use crate::toolchain::ToolchainLocator;
    use crate::types::Platform;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeLocator;

    impl ToolchainLocator for FakeLocator {
        fn find_compiler(&self, _platform: Platform, sdk: &str) -> Result<PathBuf, BindError> {
            Ok(PathBuf::from(format!("/tc/{}/clang", sdk)))
        }

        fn find_sdk_root(&self, _platform: Platform, sdk: &str) -> Result<PathBuf, BindError> {
            Ok(PathBuf::from(format!("/sdk/{}", sdk)))
        }
    }

    /// Fails for the simulator SDK only.
    struct NoSimulator;

    impl ToolchainLocator for NoSimulator {
        fn find_compiler(&self, platform: Platform, sdk: &str) -> Result<PathBuf, BindError> {
            if sdk == "iphonesimulator" {
                return Err(BindError::ToolchainUnavailable {
                    platform,
                    reason: "simulator SDK missing".into(),
                });
            }
            FakeLocator.find_compiler(platform, sdk)
        }

        fn find_sdk_root(&self, platform: Platform, sdk: &str) -> Result<PathBuf, BindError> {
            FakeLocator.find_sdk_root(platform, sdk)
        }
    }

    #[derive(Default)]
    struct CountingCompiler {
        calls: AtomicUsize,
        fail: Vec<Arch>,
        slow: Vec<Arch>,
        panic_on: Option<Arch>,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl Compiler for CountingCompiler {
        fn compile(
            &self,
            env: &BuildEnvironment,
            output: &Path,
            _mode: BuildMode,
        ) -> Result<(), BindError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(output.to_path_buf());
            if self.slow.contains(&env.arch()) {
                thread::sleep(Duration::from_millis(50));
            }
            if self.panic_on == Some(env.arch()) {
                panic!("compiler blew up");
            }
            if self.fail.contains(&env.arch()) {
                return Err(BindError::CompileFailed {
                    arch: env.arch(),
                    diagnostic: format!("error in {}", env.arch()),
                });
            }
            Ok(())
        }
    }

    fn run(
        archs: &[Arch],
        locator: &dyn ToolchainLocator,
        compiler: &CountingCompiler,
    ) -> Result<Vec<BuildResult>, BindError> {
        let settings = EnvSettings::default();
        let builder = EnvironmentBuilder::new(locator, &settings);
        dispatch_all(
            archs,
            |arch| builder.build(arch, Platform::Ios),
            compiler,
            Path::new("/scratch"),
            "demo",
            BuildMode::StaticArchive,
        )
    }

    #[test]
    fn all_succeed_in_arch_order() {
        let compiler = CountingCompiler {
            slow: vec![Arch::Arm],
            ..Default::default()
        };
        let archs = [Arch::Arm, Arch::Arm64, Arch::X86_64];
        let results = run(&archs, &FakeLocator, &compiler).unwrap();

        assert_eq!(compiler.calls.load(Ordering::SeqCst), 3);
        let got: Vec<Arch> = results.iter().map(|r| r.arch).collect();
        assert_eq!(got, archs);
        assert_eq!(
            results[1].artifact_path,
            PathBuf::from("/scratch/demo-arm64.a")
        );
    }

    #[test]
    fn env_failure_starts_no_builds() {
        let compiler = CountingCompiler::default();
        let err = run(
            &[Arch::Arm64, Arch::X86_64],
            &NoSimulator,
            &compiler,
        )
        .unwrap_err();

        assert!(matches!(err, BindError::ToolchainUnavailable { .. }));
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn one_failure_still_runs_every_build() {
        let compiler = CountingCompiler {
            fail: vec![Arch::Arm64],
            ..Default::default()
        };
        let err = run(
            &[Arch::Arm, Arch::Arm64, Arch::X86_64],
            &FakeLocator,
            &compiler,
        )
        .unwrap_err();

        assert_eq!(compiler.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            err,
            BindError::CompileFailed {
                arch: Arch::Arm64,
                ..
            }
        ));
    }

    #[test]
    fn first_error_is_by_arch_order_not_completion() {
        // arm fails last in time but first in order
        let compiler = CountingCompiler {
            fail: vec![Arch::Arm, Arch::X86_64],
            slow: vec![Arch::Arm],
            ..Default::default()
        };
        let err = run(
            &[Arch::Arm, Arch::Arm64, Arch::X86_64],
            &FakeLocator,
            &compiler,
        )
        .unwrap_err();

        assert!(matches!(err, BindError::CompileFailed { arch: Arch::Arm, .. }));
    }

    #[test]
    fn panicking_task_is_reported_as_failure() {
        let compiler = CountingCompiler {
            panic_on: Some(Arch::X86_64),
            ..Default::default()
        };
        let err = run(&[Arch::Arm64, Arch::X86_64], &FakeLocator, &compiler).unwrap_err();

        assert_eq!(compiler.calls.load(Ordering::SeqCst), 2);
        match err {
            BindError::CompileFailed { arch, diagnostic } => {
                assert_eq!(arch, Arch::X86_64);
                assert_eq!(diagnostic, "build task panicked");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn each_task_writes_its_own_path() {
        let compiler = CountingCompiler::default();
        run(&[Arch::Arm, Arch::Arm64, Arch::X86_64], &FakeLocator, &compiler).unwrap();

        let mut seen = compiler.seen.lock().unwrap().clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn cargo_compiler_dry_run_spawns_nothing() {
        let settings = EnvSettings::default();
        let env = EnvironmentBuilder::new(&FakeLocator, &settings)
            .build(Arch::Arm64, Platform::Ios)
            .unwrap();
        let temp = tempfile::tempdir().unwrap();
        let compiler = CargoCompiler::new(temp.path(), "demo", Executor::new(true, false))
            .profile(BuildProfile::Release);

        compiler
            .compile(&env, &temp.path().join("demo-arm64.a"), BuildMode::StaticArchive)
            .unwrap();
        assert!(std::fs::read_dir(temp.path()).unwrap().next().is_none());
    }
}
