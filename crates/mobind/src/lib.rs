//! # mobind
//!
//! Command-line tool that cross-compiles a Rust library for several mobile
//! architectures and packages the result for native mobile projects.
//!
//! ## Installation
//!
//! ```bash
//! cargo install mobind
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Check the toolchain and record its version
//! cargo mobind init --target ios
//!
//! # Fat static framework for device and simulator
//! cargo mobind bind --target ios --header include/my_lib.h --release
//!
//! # Per-ABI shared libraries for an Android app
//! cargo mobind bind --target android/arm64,android/x86_64 -o app/src/main/jniLibs
//!
//! # See every command without running anything
//! cargo mobind --dry-run bind --target ios/arm64
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bind` | Build every requested architecture and assemble the bundle |
//! | `init` | Verify Rust targets and the platform toolchain, record the compiler version |
//! | `config` | Write a starter `mobind.toml` |
//! | `targets` | List supported platforms and architectures |
//!
//! ## CLI Flags
//!
//! Global flags available on all commands:
//!
//! - **`--dry-run`** - Print every command and file operation without performing it
//! - **`--verbose` / `-v`** - Print every command and enable debug logging
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `mobind.toml`

#![cfg_attr(docsrs, feature(doc_cfg))]

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use mobind_sdk::env::{EnvSettings, EnvironmentBuilder};
use mobind_sdk::toolchain::{check_rust_targets, current_compiler_version};
use mobind_sdk::{
    BindOptions, Binder, BuildProfile, Executor, NdkLocator, Platform, TargetSpec,
    ToolchainLocator, VersionMarker, XcrunLocator,
};

pub mod config;

use config::{ConfigResolver, MobindConfig};

/// Cross-compile a Rust library into an iOS framework or Android jniLibs.
#[derive(Parser, Debug)]
#[command(name = "mobind", author, version, about = "Multi-architecture mobile library builder", long_about = None)]
struct Cli {
    /// Print what would be done without actually doing it
    #[arg(long, global = true)]
    dry_run: bool,

    /// Print verbose output including all commands
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the library for every requested architecture and assemble the bundle.
    Bind {
        #[arg(
            long,
            short = 't',
            help = "Target spec: ios, android, or platform/arch pairs such as ios/arm64,ios/x86_64"
        )]
        target: String,
        #[arg(long, short = 'o', help = "Bundle path (*.framework for iOS, .../jniLibs for Android)")]
        output: Option<PathBuf>,
        #[arg(long, help = "Build with the release profile")]
        release: bool,
        #[arg(long, help = "Crate directory (default: current directory)")]
        crate_path: Option<PathBuf>,
        #[arg(long, help = "Framework title (default: PascalCase library name)")]
        title: Option<String>,
        #[arg(long = "header", help = "Header to ship in the framework (repeatable)")]
        headers: Vec<PathBuf>,
        #[arg(long = "env", value_parser = parse_key_val, help = "Extra build variable KEY=VALUE (repeatable)")]
        env: Vec<(String, String)>,
        #[arg(long, allow_hyphen_values = true, help = "Extra C flags, space separated")]
        cflags: Option<String>,
        #[arg(long, allow_hyphen_values = true, help = "Extra linker flags, space separated")]
        ldflags: Option<String>,
        #[arg(long, help = "Print the scratch directory and keep it after the run")]
        work: bool,
        #[arg(long, help = "Write a JSON report of the run to this path")]
        report: Option<PathBuf>,
        #[arg(long, help = "Do not require a toolchain recorded by `mobind init`")]
        skip_toolchain_check: bool,
    },
    /// Verify the toolchain for a platform and record the compiler version.
    Init {
        #[arg(long, short = 't', help = "Target spec to prepare, e.g. ios or android")]
        target: String,
    },
    /// Write a starter mobind.toml.
    Config {
        #[arg(long, default_value = "mobind.toml")]
        output: PathBuf,
        #[arg(long = "crate", help = "Crate name (default: read from ./Cargo.toml)")]
        crate_name: Option<String>,
    },
    /// List supported platforms and architectures.
    Targets,
}

/// Runs the CLI with the process arguments.
pub fn run() -> Result<()> {
    run_from(std::env::args_os())
}

/// Runs the CLI with explicit arguments (the first one is the program name).
pub fn run_from<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    load_dotenv();
    let cli = Cli::parse_from(args);
    init_tracing(cli.verbose);
    let exec = Executor::new(cli.dry_run, cli.verbose);

    match cli.command {
        Command::Bind {
            target,
            output,
            release,
            crate_path,
            title,
            headers,
            env,
            cflags,
            ldflags,
            work,
            report,
            skip_toolchain_check,
        } => cmd_bind(
            BindArgs {
                target,
                output,
                release,
                crate_path,
                title,
                headers,
                env,
                cflags,
                ldflags,
                work,
                report,
                skip_toolchain_check,
            },
            exec,
        ),
        Command::Init { target } => cmd_init(&target, exec),
        Command::Config { output, crate_name } => cmd_config(&output, crate_name),
        Command::Targets => {
            cmd_targets();
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    // a second init (tests calling run_from twice) is harmless
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn load_dotenv() {
    if let Ok(cwd) = std::env::current_dir() {
        let root = find_project_root(&cwd).unwrap_or(cwd);
        let _ = dotenvy::from_path(root.join(".env.local"));
    }
}

fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|candidate| {
            candidate.join(config::CONFIG_FILE_NAME).is_file() || candidate.join(".git").exists()
        })
        .map(Path::to_path_buf)
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", raw)),
    }
}

#[derive(Debug)]
struct BindArgs {
    target: String,
    output: Option<PathBuf>,
    release: bool,
    crate_path: Option<PathBuf>,
    title: Option<String>,
    headers: Vec<PathBuf>,
    env: Vec<(String, String)>,
    cflags: Option<String>,
    ldflags: Option<String>,
    work: bool,
    report: Option<PathBuf>,
    skip_toolchain_check: bool,
}

/// Merges CLI arguments with `mobind.toml` into the options of one bind run.
fn resolve_bind_options(args: &BindArgs, resolver: &ConfigResolver, cwd: &Path) -> Result<BindOptions> {
    let config = resolver.config();
    let crate_dir = match &args.crate_path {
        Some(path) => cwd.join(path),
        None => cwd.to_path_buf(),
    };

    let library_name = match resolver.library_name() {
        Some(name) => name,
        None => detect_library_name(&crate_dir)?,
    };

    let mut headers: Vec<PathBuf> = config
        .build
        .headers
        .iter()
        .map(|h| resolver.resolve_path(h))
        .collect();
    headers.extend(args.headers.iter().map(|h| cwd.join(h)));

    let mut cflags = config.build.cflags.clone();
    cflags.extend(split_flags(args.cflags.as_deref()));
    let mut ldflags = config.build.ldflags.clone();
    ldflags.extend(split_flags(args.ldflags.as_deref()));

    let output = args
        .output
        .as_ref()
        .map(|o| cwd.join(o))
        .or_else(|| config.project.output.as_deref().map(|o| resolver.resolve_path(o)));
    let title = resolver.resolve(args.title.clone().map(Some), |c| Some(c.project.title.clone()), None);
    let ndk_home = config
        .android
        .ndk_home
        .as_deref()
        .map(|p| resolver.resolve_path(p))
        .or_else(NdkLocator::discover_root);

    let mut options = BindOptions::new(&args.target, crate_dir, library_name)
        .profile(if args.release || config.build.release {
            BuildProfile::Release
        } else {
            BuildProfile::Debug
        })
        .headers(headers)
        .cflags(cflags)
        .ldflags(ldflags)
        .ios_deployment_target(config.ios.deployment_target.as_str())
        .version_tag(config.ios.version_tag.as_str())
        .bundle_id_prefix(config.ios.bundle_id_prefix.as_str())
        .bundle_version(config.ios.bundle_version.as_str())
        .android_api(config.android.min_sdk)
        .ndk_home(ndk_home)
        .keep_work(args.work);
    if let Some(output) = output {
        options = options.output(output);
    }
    if let Some(title) = title {
        options = options.title(title);
    }
    for (key, value) in config.env.iter().chain(args.env.iter().map(|(k, v)| (k, v))) {
        options = options.env_var(key.as_str(), value.as_str());
    }
    Ok(options)
}

fn split_flags(flags: Option<&str>) -> Vec<String> {
    flags
        .map(|f| f.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn cmd_bind(args: BindArgs, exec: Executor) -> Result<()> {
    let resolver = ConfigResolver::new().context("loading mobind.toml")?;
    if let Some(config_path) = &resolver.config_path {
        println!("Using config file: {:?}", config_path);
    }
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    let options = resolve_bind_options(&args, &resolver, &cwd)?
        .dry_run(exec.is_dry_run())
        .verbose(exec.is_verbose());

    if exec.is_dry_run() {
        tracing::debug!("dry run: skipping toolchain version check");
    } else if !args.skip_toolchain_check {
        check_toolchain_marker(&exec)?;
    }

    let report = Binder::new(options)
        .bind()
        .with_context(|| format!("binding target {}", args.target))?;

    if exec.is_dry_run() {
        println!("\nDry run complete; nothing was written.");
    } else {
        println!("\nBundle ready: {}", report.bundle.display());
        for binary in &report.binaries {
            println!("  {}", binary.display());
        }
    }

    if let Some(path) = &args.report {
        let json = report.to_json()?;
        if exec.is_dry_run() {
            println!("Would write report to {:?}", path);
        } else {
            ensure_parent_dir(path)?;
            fs::write(path, json).with_context(|| format!("writing report {:?}", path))?;
            println!("Report: {:?}", path);
        }
    }
    Ok(())
}

fn marker() -> Result<VersionMarker> {
    let home = VersionMarker::default_home()
        .ok_or_else(|| anyhow!("cannot locate a home directory; set MOBIND_HOME"))?;
    Ok(VersionMarker::in_home(&home))
}

fn check_toolchain_marker(exec: &Executor) -> Result<()> {
    let marker = marker()?;
    let Some(current) = current_compiler_version(exec)? else {
        return Ok(());
    };
    marker
        .check(&current)
        .context("pass --skip-toolchain-check to build anyway")?;
    Ok(())
}

fn cmd_init(target: &str, exec: Executor) -> Result<()> {
    let spec = TargetSpec::parse(target)?;
    let platform = spec.platform();
    let resolver = ConfigResolver::new().context("loading mobind.toml")?;
    let config = resolver.config();

    println!("Checking Rust targets for {}...", spec);
    check_rust_targets(&exec, platform, spec.archs())?;

    println!("Checking {} toolchain...", platform);
    let locator: Box<dyn ToolchainLocator> = match platform {
        Platform::Ios => Box::new(XcrunLocator::new(exec)),
        Platform::Android => Box::new(NdkLocator::new(
            config
                .android
                .ndk_home
                .as_deref()
                .map(|p| resolver.resolve_path(p))
                .or_else(NdkLocator::discover_root),
        )),
    };
    let settings = EnvSettings {
        ios_deployment_target: config.ios.deployment_target.clone(),
        android_api: config.android.min_sdk,
        ..EnvSettings::default()
    };
    let builder = EnvironmentBuilder::new(locator.as_ref(), &settings);
    for &arch in spec.archs() {
        let env = builder.build(arch, platform)?;
        if exec.is_verbose() {
            println!("  {}: {}", arch, env.cc().display());
        }
    }

    let marker = marker()?;
    match current_compiler_version(&exec)? {
        Some(version) => {
            marker.write(&exec, &version)?;
            println!("Recorded {} in {:?}", version, marker.path());
        }
        None => println!("Would record the rustc version in {:?}", marker.path()),
    }
    Ok(())
}

fn cmd_config(output: &Path, crate_name: Option<String>) -> Result<()> {
    let crate_name = match crate_name {
        Some(name) => name,
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            detect_package_name(&cwd)?
        }
    };
    ensure_can_write(output)?;
    fs::write(output, MobindConfig::generate_starter_toml(&crate_name))
        .with_context(|| format!("writing config {:?}", output))?;
    println!("Wrote {:?}", output);
    Ok(())
}

fn cmd_targets() {
    for platform in Platform::ALL {
        let archs: Vec<String> = platform
            .supported_archs()
            .iter()
            .map(|&arch| match platform.arch_tag(arch) {
                Ok(tag) if tag != arch.as_str() => format!("{} ({})", arch, tag),
                _ => arch.to_string(),
            })
            .collect();
        println!("{:<8} {}", platform.as_str(), archs.join(", "));
    }
}

fn read_manifest(crate_dir: &Path) -> Result<toml::Value> {
    let manifest = crate_dir.join("Cargo.toml");
    let contents = fs::read_to_string(&manifest)
        .with_context(|| format!("reading crate manifest at {:?}", manifest))?;
    toml::from_str(&contents).with_context(|| format!("parsing crate manifest {:?}", manifest))
}

fn detect_package_name(crate_dir: &Path) -> Result<String> {
    let value = read_manifest(crate_dir)?;
    value
        .get("package")
        .and_then(|pkg| pkg.get("name"))
        .and_then(|n| n.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            anyhow!(
                "package.name missing in {:?}; pass --crate",
                crate_dir.join("Cargo.toml")
            )
        })
}

/// Library target name: `[lib] name`, else the package name with dashes
/// replaced by underscores.
fn detect_library_name(crate_dir: &Path) -> Result<String> {
    let value = read_manifest(crate_dir).context(
        "Run from the crate directory, pass --crate-path, or set library_name in mobind.toml",
    )?;
    if let Some(name) = value
        .get("lib")
        .and_then(|lib| lib.get("name"))
        .and_then(|n| n.as_str())
    {
        return Ok(name.to_string());
    }
    let name = value
        .get("package")
        .and_then(|pkg| pkg.get("name"))
        .and_then(|n| n.as_str())
        .ok_or_else(|| anyhow!("package.name missing in {:?}", crate_dir.join("Cargo.toml")))?;
    Ok(name.replace('-', "_"))
}

fn ensure_can_write(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("refusing to overwrite existing file: {:?}", path);
    }
    ensure_parent_dir(path)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating parent directory {:?}", parent))?;
        }
    }
    Ok(())
}
