//! The bind pipeline.
//!
//! [`Binder`] wires every stage together:
//!
//! 1. Parse the target specification and validate names and paths
//! 2. Create the scratch directory (`WORK=`) and stage support headers
//! 3. Build every architecture's environment, then compile concurrently
//! 4. iOS: merge into a fat static library and assemble the framework;
//!    Android: lay out the `jniLibs` tree
//!
//! The same code path runs in dry-run mode; only the [`Executor`] decides
//! whether side effects happen.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::bundle::{BundleConfig, Resource, assemble, assemble_jni_libs, validate_bundle_root};
use crate::dispatch::{CargoCompiler, Compiler, dispatch_all};
use crate::env::{DEFAULT_ANDROID_API, DEFAULT_IOS_DEPLOYMENT_TARGET, EnvSettings, EnvironmentBuilder};
use crate::exec::Executor;
use crate::merge::{ArchiveTool, Lipo, merge};
use crate::target::TargetSpec;
use crate::templates::{self, TemplateVar, sanitize_bundle_id_component, to_pascal_case};
use crate::toolchain::{NdkLocator, ToolchainLocator, XcrunLocator};
use crate::types::{Arch, BindError, BuildProfile, BuildResult, Platform};

/// Everything one bind invocation needs, fixed before it starts.
///
/// # Example
///
/// ```
/// use mobind_sdk::{BindOptions, BuildProfile};
///
/// let options = BindOptions::new("ios/arm64,ios/x86_64", ".", "my_lib")
///     .profile(BuildProfile::Release)
///     .header("include/my_lib.h")
///     .dry_run(true);
/// assert!(options.is_dry_run());
/// ```
#[derive(Debug, Clone)]
pub struct BindOptions {
    target: String,
    crate_dir: PathBuf,
    library_name: String,
    output: Option<PathBuf>,
    title: Option<String>,
    profile: BuildProfile,
    headers: Vec<PathBuf>,
    cflags: Vec<String>,
    ldflags: Vec<String>,
    env: BTreeMap<String, String>,
    ios_deployment_target: String,
    android_api: u32,
    ndk_home: Option<PathBuf>,
    version_tag: String,
    bundle_id_prefix: String,
    bundle_version: String,
    keep_work: bool,
    dry_run: bool,
    verbose: bool,
}

impl BindOptions {
    /// `library_name` is the crate's library target name; dashes are
    /// normalized to underscores the way rustc does.
    pub fn new(
        target: impl Into<String>,
        crate_dir: impl Into<PathBuf>,
        library_name: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            crate_dir: crate_dir.into(),
            library_name: library_name.into().replace('-', "_"),
            output: None,
            title: None,
            profile: BuildProfile::Debug,
            headers: Vec::new(),
            cflags: Vec::new(),
            ldflags: Vec::new(),
            env: BTreeMap::new(),
            ios_deployment_target: DEFAULT_IOS_DEPLOYMENT_TARGET.to_string(),
            android_api: DEFAULT_ANDROID_API,
            ndk_home: None,
            version_tag: "A".to_string(),
            bundle_id_prefix: "dev.mobind".to_string(),
            bundle_version: "1.0".to_string(),
            keep_work: false,
            dry_run: false,
            verbose: false,
        }
    }

    /// Bundle path. Defaults to `<crate_dir>/<Title>.framework` for iOS and
    /// `<crate_dir>/jniLibs` for Android.
    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Framework title. Defaults to the PascalCase library name.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn profile(mut self, profile: BuildProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Adds a pre-generated header to ship in the bundle.
    pub fn header(mut self, header: impl Into<PathBuf>) -> Self {
        self.headers.push(header.into());
        self
    }

    pub fn headers<I, P>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.headers.extend(headers.into_iter().map(Into::into));
        self
    }

    pub fn cflags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cflags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn ldflags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ldflags.extend(flags.into_iter().map(Into::into));
        self
    }

    /// Sets a build variable, replacing any computed value with the same name.
    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn ios_deployment_target(mut self, version: impl Into<String>) -> Self {
        self.ios_deployment_target = version.into();
        self
    }

    pub fn android_api(mut self, api: u32) -> Self {
        self.android_api = api;
        self
    }

    pub fn ndk_home(mut self, ndk_home: Option<PathBuf>) -> Self {
        self.ndk_home = ndk_home;
        self
    }

    pub fn version_tag(mut self, tag: impl Into<String>) -> Self {
        self.version_tag = tag.into();
        self
    }

    pub fn bundle_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bundle_id_prefix = prefix.into();
        self
    }

    pub fn bundle_version(mut self, version: impl Into<String>) -> Self {
        self.bundle_version = version.into();
        self
    }

    /// Keeps the scratch directory instead of deleting it.
    pub fn keep_work(mut self, keep: bool) -> Self {
        self.keep_work = keep;
        self
    }

    /// Prints every side effect instead of performing it.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn library_name(&self) -> &str {
        &self.library_name
    }
}

/// Summary of a bind run, serializable for `--report`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BindReport {
    pub platform: Platform,
    pub archs: Vec<Arch>,
    /// Bundle root (`*.framework` or `jniLibs`).
    pub bundle: PathBuf,
    /// Final binaries inside the bundle.
    pub binaries: Vec<PathBuf>,
    /// Per-architecture artifacts, valid only while the scratch dir exists.
    pub builds: Vec<BuildResult>,
    /// Scratch directory, when kept.
    pub work_dir: Option<PathBuf>,
    pub dry_run: bool,
}

impl BindReport {
    pub fn to_json(&self) -> Result<String, BindError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BindError::Config(format!("cannot serialize bind report: {}", e)))
    }
}

/// The per-invocation scratch directory.
enum Scratch {
    /// Dry run: nothing is created.
    Planned(PathBuf),
    /// Removed on drop unless created with `keep`.
    Temp(tempfile::TempDir),
}

impl Scratch {
    fn create(exec: &Executor, keep: bool) -> Result<Self, BindError> {
        let scratch = if exec.should_run() {
            let dir = tempfile::Builder::new()
                .prefix("mobind-work-")
                .keep(keep)
                .tempdir()
                .map_err(|e| BindError::fs("create scratch dir in", std::env::temp_dir(), e))?;
            Scratch::Temp(dir)
        } else {
            Scratch::Planned(PathBuf::from("$WORK"))
        };
        if exec.should_print() || keep {
            println!("WORK={}", scratch.path().display());
        }
        Ok(scratch)
    }

    fn path(&self) -> &Path {
        match self {
            Scratch::Planned(path) => path,
            Scratch::Temp(dir) => dir.path(),
        }
    }
}

/// Runs the bind pipeline for one [`BindOptions`].
pub struct Binder {
    options: BindOptions,
    exec: Executor,
}

impl Binder {
    pub fn new(options: BindOptions) -> Self {
        let exec = Executor::new(options.dry_run, options.verbose);
        Self { options, exec }
    }

    pub fn options(&self) -> &BindOptions {
        &self.options
    }

    /// Binds with the shipped collaborators: `cargo`, `xcrun`/the NDK and `lipo`.
    pub fn bind(&self) -> Result<BindReport, BindError> {
        let platform = TargetSpec::parse(&self.options.target)?.platform();
        let compiler = CargoCompiler::new(
            &self.options.crate_dir,
            &self.options.library_name,
            self.exec,
        )
        .profile(self.options.profile);
        let lipo = Lipo::new(self.exec);

        match platform {
            Platform::Ios => self.bind_with(&XcrunLocator::new(self.exec), &compiler, &lipo),
            Platform::Android => {
                let locator = NdkLocator::new(self.options.ndk_home.clone());
                self.bind_with(&locator, &compiler, &lipo)
            }
        }
    }

    /// Binds with caller-provided collaborators.
    pub fn bind_with(
        &self,
        locator: &dyn ToolchainLocator,
        compiler: &dyn Compiler,
        archiver: &dyn ArchiveTool,
    ) -> Result<BindReport, BindError> {
        let opts = &self.options;
        let spec = TargetSpec::parse(&opts.target)?;
        let platform = spec.platform();

        let lib_name = &opts.library_name;
        if lib_name.is_empty() || !lib_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(BindError::Config(format!(
                "invalid library name {:?}: use the crate's [lib] name",
                lib_name
            )));
        }
        let title = opts
            .title
            .clone()
            .unwrap_or_else(|| to_pascal_case(lib_name));
        let output = self.output_path(platform, &title);
        validate_bundle_root(platform, &output)?;

        let framework = match platform {
            Platform::Ios => {
                let config = BundleConfig::new(&output, &title).version_tag(&opts.version_tag);
                config.validate()?;
                Some(config)
            }
            Platform::Android => None,
        };
        let mut header_names = Vec::with_capacity(opts.headers.len());
        for header in &opts.headers {
            if !header.is_file() {
                return Err(BindError::Config(format!(
                    "header {} does not exist",
                    header.display()
                )));
            }
            // headers are staged flat into one include dir
            let name = header.file_name();
            if header_names.contains(&name) {
                return Err(BindError::Config(format!(
                    "two headers are named {:?}; header file names must be unique",
                    name.unwrap_or_default()
                )));
            }
            header_names.push(name);
        }

        let scratch = Scratch::create(&self.exec, opts.keep_work)?;
        println!("Building {} for {}...", lib_name, spec);
        let staged = self.stage_headers(scratch.path())?;

        let settings = EnvSettings {
            ios_deployment_target: opts.ios_deployment_target.clone(),
            android_api: opts.android_api,
            cflags: opts.cflags.clone(),
            ldflags: opts.ldflags.clone(),
            overrides: opts.env.clone(),
            include_dir: (!staged.is_empty()).then(|| scratch.path().join("include")),
        };
        let envs = EnvironmentBuilder::new(locator, &settings);
        let builds = dispatch_all(
            spec.archs(),
            |arch| envs.build(arch, platform),
            compiler,
            scratch.path(),
            lib_name,
            platform.build_mode(),
        )?;

        let binaries = match framework {
            Some(config) => {
                println!("Merging {} architecture(s)...", builds.len());
                let merged = scratch.path().join(format!("lib{}.a", lib_name));
                merge(platform, &builds, &merged, archiver)?;

                println!("Assembling {}...", output.display());
                let plist = self.info_plist(&title)?;
                let bundle = assemble(&self.exec, &config, &merged, &staged, &[plist])?;
                vec![bundle.binary]
            }
            None => {
                println!("Copying libraries into {}...", output.display());
                assemble_jni_libs(&self.exec, &output, lib_name, &builds)?
            }
        };

        let work_dir = (opts.keep_work && self.exec.should_run())
            .then(|| scratch.path().to_path_buf());
        Ok(BindReport {
            platform,
            archs: spec.archs().to_vec(),
            bundle: output,
            binaries,
            builds,
            work_dir,
            dry_run: opts.dry_run,
        })
    }

    fn output_path(&self, platform: Platform, title: &str) -> PathBuf {
        if let Some(output) = &self.options.output {
            return output.clone();
        }
        let name = match platform {
            Platform::Ios => format!("{}.framework", title),
            Platform::Android => "jniLibs".to_string(),
        };
        self.options.crate_dir.join(name)
    }

    /// Copies support headers into `<scratch>/include`, where every build task
    /// can read them.
    fn stage_headers(&self, scratch: &Path) -> Result<Vec<PathBuf>, BindError> {
        if self.options.headers.is_empty() {
            return Ok(Vec::new());
        }
        let include = scratch.join("include");
        self.exec.mkdir(&include)?;
        let mut staged = Vec::with_capacity(self.options.headers.len());
        for header in &self.options.headers {
            let Some(name) = header.file_name() else {
                return Err(BindError::Config(format!(
                    "invalid header path {}",
                    header.display()
                )));
            };
            let dest = include.join(name);
            self.exec.copy_file(header, &dest)?;
            staged.push(dest);
        }
        Ok(staged)
    }

    fn info_plist(&self, title: &str) -> Result<Resource, BindError> {
        let opts = &self.options;
        let bundle_id = format!(
            "{}.{}",
            opts.bundle_id_prefix.trim_end_matches('.'),
            sanitize_bundle_id_component(title)
        );
        let contents = templates::render(
            templates::INFO_PLIST,
            &[
                TemplateVar::new("TITLE", title),
                TemplateVar::new("BUNDLE_ID", bundle_id),
                TemplateVar::new("VERSION", opts.bundle_version.as_str()),
                TemplateVar::new("MIN_OS_VERSION", opts.ios_deployment_target.as_str()),
            ],
        )?;
        Ok(Resource::new("Info.plist", contents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::BuildEnvironment;
    use crate::merge::TaggedArtifact;
    use crate::types::BuildMode;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLocator;

    impl ToolchainLocator for FakeLocator {
        fn find_compiler(&self, _platform: Platform, sdk: &str) -> Result<PathBuf, BindError> {
            Ok(PathBuf::from(format!("/tc/{}-clang", sdk)))
        }

        fn find_sdk_root(&self, _platform: Platform, sdk: &str) -> Result<PathBuf, BindError> {
            Ok(PathBuf::from(format!("/sdk/{}", sdk)))
        }
    }

    /// Writes `<arch>` into each output unless running dry.
    struct FakeCompiler {
        calls: AtomicUsize,
        dry_run: bool,
    }

    impl FakeCompiler {
        fn new(dry_run: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                dry_run,
            }
        }
    }

    impl Compiler for FakeCompiler {
        fn compile(
            &self,
            env: &BuildEnvironment,
            output: &Path,
            _mode: BuildMode,
        ) -> Result<(), BindError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(env.cflags().iter().any(|f| f.ends_with("include")));
            if !self.dry_run {
                fs::write(output, env.arch().as_str()).unwrap();
            }
            Ok(())
        }
    }

    /// Concatenates its inputs, like a very naive lipo.
    struct CatTool {
        dry_run: bool,
    }

    impl ArchiveTool for CatTool {
        fn merge_architectures(
            &self,
            inputs: &[TaggedArtifact],
            output: &Path,
        ) -> Result<(), BindError> {
            if self.dry_run {
                return Ok(());
            }
            let mut merged = Vec::new();
            for input in inputs {
                merged.extend(fs::read(&input.path).unwrap());
                merged.push(b'|');
            }
            fs::write(output, merged).unwrap();
            Ok(())
        }
    }

    struct Project {
        temp: tempfile::TempDir,
        header: PathBuf,
    }

    fn project() -> Project {
        let temp = tempfile::tempdir().unwrap();
        let header = temp.path().join("demo.h");
        fs::write(&header, b"void demo(void);\n").unwrap();
        Project { temp, header }
    }

    fn options(project: &Project, target: &str) -> BindOptions {
        BindOptions::new(target, project.temp.path(), "demo-lib").header(&project.header)
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        let mut names: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        names.sort();
        names
    }

    #[cfg(unix)]
    #[test]
    fn ios_bind_produces_framework() {
        let project = project();
        let binder = Binder::new(options(&project, "ios/arm64,ios/x86_64"));
        let compiler = FakeCompiler::new(false);
        let report = binder
            .bind_with(&FakeLocator, &compiler, &CatTool { dry_run: false })
            .unwrap();

        let root = project.temp.path().join("DemoLib.framework");
        assert_eq!(report.bundle, root);
        assert_eq!(report.archs, [Arch::Arm64, Arch::X86_64]);
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fs::read(root.join("DemoLib")).unwrap(), b"arm64|x86_64|");
        assert!(root.join("Headers/demo.h").is_file());

        let plist = fs::read_to_string(root.join("Resources/Info.plist")).unwrap();
        assert!(plist.contains("<string>dev.mobind.demolib</string>"));
        assert!(plist.contains("<string>12.0</string>"));
        // scratch dir is removed after the run
        assert_eq!(report.work_dir, None);
    }

    #[test]
    fn android_bind_produces_jni_libs() {
        let project = project();
        let binder = Binder::new(options(&project, "android/arm,android/x86_64"));
        let report = binder
            .bind_with(
                &FakeLocator,
                &FakeCompiler::new(false),
                &CatTool { dry_run: false },
            )
            .unwrap();

        let root = project.temp.path().join("jniLibs");
        assert_eq!(
            report.binaries,
            [
                root.join("armeabi-v7a/libdemo_lib.so"),
                root.join("x86_64/libdemo_lib.so")
            ]
        );
        assert_eq!(
            fs::read(root.join("x86_64/libdemo_lib.so")).unwrap(),
            b"x86_64"
        );
    }

    #[test]
    fn dry_run_leaves_filesystem_untouched() {
        let project = project();
        let before = entries(project.temp.path());
        let binder = Binder::new(options(&project, "ios").dry_run(true));
        let compiler = FakeCompiler::new(true);
        let report = binder
            .bind_with(&FakeLocator, &compiler, &CatTool { dry_run: true })
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(compiler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(entries(project.temp.path()), before);
        assert_eq!(
            report.builds[0].artifact_path,
            PathBuf::from("$WORK/demo_lib-arm.a")
        );
    }

    #[test]
    fn dry_run_reports_the_same_validation_errors() {
        let project = project();
        let cases: Vec<(&str, Box<dyn Fn(BindOptions) -> BindOptions>)> = vec![
            ("ios/bogus", Box::new(|o: BindOptions| o)),
            ("ios", Box::new(|o: BindOptions| o.output("out/Demo.bundle"))),
            ("android", Box::new(|o: BindOptions| o.output("out/libs"))),
            ("ios", Box::new(|o: BindOptions| o.header("/definitely/missing.h"))),
            ("ios", Box::new(|o: BindOptions| o.title("a/b"))),
            ("ios/arm64", Box::new(|o: BindOptions| o.title("Headers"))),
            ("ios/arm64", Box::new(|o: BindOptions| o.version_tag("Current"))),
        ];

        for (target, tweak) in cases {
            let real = Binder::new(tweak(options(&project, target)))
                .bind_with(
                    &FakeLocator,
                    &FakeCompiler::new(false),
                    &CatTool { dry_run: false },
                )
                .unwrap_err();
            let dry = Binder::new(tweak(options(&project, target)).dry_run(true))
                .bind_with(
                    &FakeLocator,
                    &FakeCompiler::new(true),
                    &CatTool { dry_run: true },
                )
                .unwrap_err();
            assert_eq!(real.to_string(), dry.to_string(), "target {target}");
        }
    }

    #[test]
    fn android_dry_run_checks_the_ndk_like_a_real_run() {
        let project = project();
        let missing = project.temp.path().join("no-ndk");
        for ndk_home in [None, Some(missing)] {
            let mut errors = Vec::new();
            for dry_run in [false, true] {
                let binder = Binder::new(
                    options(&project, "android/arm64")
                        .ndk_home(ndk_home.clone())
                        .dry_run(dry_run),
                );
                let compiler = FakeCompiler::new(dry_run);
                let err = binder
                    .bind_with(
                        &NdkLocator::new(ndk_home.clone()),
                        &compiler,
                        &CatTool { dry_run },
                    )
                    .unwrap_err();
                assert!(matches!(err, BindError::ToolchainUnavailable { .. }));
                assert_eq!(compiler.calls.load(Ordering::SeqCst), 0);
                errors.push(err.to_string());
            }
            assert_eq!(errors[0], errors[1]);
        }
        assert!(!project.temp.path().join("jniLibs").exists());
    }

    #[test]
    fn duplicate_header_names_fail_before_building() {
        let project = project();
        let other = project.temp.path().join("nested");
        fs::create_dir_all(&other).unwrap();
        fs::write(other.join("demo.h"), b"void other(void);\n").unwrap();

        for dry_run in [false, true] {
            let compiler = FakeCompiler::new(dry_run);
            let err = Binder::new(
                options(&project, "ios/arm64")
                    .header(other.join("demo.h"))
                    .dry_run(dry_run),
            )
            .bind_with(&FakeLocator, &compiler, &CatTool { dry_run })
            .unwrap_err();

            assert!(matches!(err, BindError::Config(_)));
            assert!(err.to_string().contains("demo.h"));
            assert_eq!(compiler.calls.load(Ordering::SeqCst), 0);
        }
        assert!(!project.temp.path().join("DemoLib.framework").exists());
    }

    #[test]
    fn keep_work_reports_scratch_dir() {
        let project = project();
        let binder = Binder::new(options(&project, "android/arm64").keep_work(true));
        let report = binder
            .bind_with(
                &FakeLocator,
                &FakeCompiler::new(false),
                &CatTool { dry_run: false },
            )
            .unwrap();

        let work = report.work_dir.expect("work dir kept");
        assert!(work.join("include/demo.h").is_file());
        assert!(work.join("demo_lib-arm64.so").is_file());
        fs::remove_dir_all(work).unwrap();
    }

    #[test]
    fn report_serializes() {
        let report = BindReport {
            platform: Platform::Ios,
            archs: vec![Arch::Arm64],
            bundle: PathBuf::from("Demo.framework"),
            binaries: vec![PathBuf::from("Demo.framework/Versions/A/Demo")],
            builds: vec![],
            work_dir: None,
            dry_run: true,
        };
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["platform"], "ios");
        assert_eq!(value["archs"][0], "arm64");
        assert_eq!(value["dry_run"], true);
    }
}
