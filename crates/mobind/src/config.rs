//! Configuration file support for mobind.
//!
//! A `mobind.toml` file persists project settings so they do not have to be
//! passed as CLI flags on every run.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. Current working directory (`./mobind.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! Relative paths inside the file are resolved against the directory that
//! contains it.
//!
//! ## Example Configuration
//!
//! ```toml
//! [project]
//! crate = "my-lib"
//! library_name = "my_lib"
//! title = "MyLib"
//!
//! [build]
//! release = true
//! headers = ["include/my_lib.h"]
//!
//! [env]
//! MY_FEATURE_FLAG = "1"
//!
//! [ios]
//! deployment_target = "13.0"
//!
//! [android]
//! min_sdk = 24
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "mobind.toml";

/// Root configuration structure for `mobind.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MobindConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,

    /// Compiler and packaging inputs.
    pub build: BuildConfig,

    /// Extra build variables; they replace computed ones with the same name.
    pub env: BTreeMap<String, String>,

    /// iOS-specific configuration.
    pub ios: IosConfig,

    /// Android-specific configuration.
    pub android: AndroidConfig,
}

/// Project-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Name of the crate to bind (e.g., "my-lib").
    #[serde(rename = "crate")]
    pub crate_name: Option<String>,

    /// Library target name (e.g., "my_lib").
    ///
    /// If not specified, it is read from the crate's `Cargo.toml`.
    pub library_name: Option<String>,

    /// Framework title. Defaults to the PascalCase library name.
    pub title: Option<String>,

    /// Bundle path (`*.framework` or `.../jniLibs`).
    pub output: Option<PathBuf>,
}

/// Compiler and packaging inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Build with `--release`.
    pub release: bool,

    /// Extra C flags for every architecture.
    pub cflags: Vec<String>,

    /// Extra linker flags for every architecture.
    pub ldflags: Vec<String>,

    /// Pre-generated headers to ship in the framework.
    pub headers: Vec<PathBuf>,
}

/// iOS-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IosConfig {
    /// Minimum iOS version.
    ///
    /// Defaults to "12.0".
    pub deployment_target: String,

    /// Directory name under `Versions/` inside the framework.
    ///
    /// Defaults to "A".
    pub version_tag: String,

    /// Prefix of the framework's `CFBundleIdentifier`.
    ///
    /// Defaults to "dev.mobind".
    pub bundle_id_prefix: String,

    /// `CFBundleShortVersionString` of the framework.
    ///
    /// Defaults to "1.0".
    pub bundle_version: String,
}

impl Default for IosConfig {
    fn default() -> Self {
        Self {
            deployment_target: "12.0".to_string(),
            version_tag: "A".to_string(),
            bundle_id_prefix: "dev.mobind".to_string(),
            bundle_version: "1.0".to_string(),
        }
    }
}

/// Android-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AndroidConfig {
    /// Minimum Android API level.
    ///
    /// Defaults to 24 (Android 7.0).
    pub min_sdk: u32,

    /// Android NDK location. Falls back to `ANDROID_NDK_HOME`.
    pub ndk_home: Option<PathBuf>,
}

impl Default for AndroidConfig {
    fn default() -> Self {
        Self {
            min_sdk: 24,
            ndk_home: None,
        }
    }
}

impl MobindConfig {
    /// Loads configuration from the specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: MobindConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Finds and loads `mobind.toml` from the current directory or a parent.
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Finds and loads `mobind.toml` starting from `start_dir`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Returns the library name, either from config or derived from crate name.
    pub fn library_name(&self) -> Option<String> {
        self.project.library_name.clone().or_else(|| {
            self.project
                .crate_name
                .as_ref()
                .map(|c| c.replace('-', "_"))
        })
    }

    /// Generates a commented starter `mobind.toml`.
    pub fn generate_starter_toml(crate_name: &str) -> String {
        let library_name = crate_name.replace('-', "_");

        format!(
            r#"# mobind configuration file
# CLI flags override these settings when provided.

[project]
# Name of the crate to bind
crate = "{crate_name}"

# Library target name (typically the crate name with hyphens replaced by underscores)
library_name = "{library_name}"

# Framework title (default: PascalCase library name)
# title = "MyLib"

# Bundle path (default: <Title>.framework for iOS, jniLibs for Android)
# output = "build/MyLib.framework"

[build]
# Build with --release
release = false

# Extra compiler and linker flags for every architecture
# cflags = ["-O2"]
# ldflags = ["-lz"]

# Pre-generated headers copied into the framework's Headers directory
# headers = ["include/{library_name}.h"]

[env]
# Extra build variables, e.g.
# MY_FEATURE = "1"

[ios]
# Minimum iOS version (default: 12.0)
deployment_target = "12.0"

# Versions/<tag> directory inside the framework (default: A)
version_tag = "A"

# CFBundleIdentifier prefix (default: dev.mobind)
bundle_id_prefix = "dev.mobind"

[android]
# Minimum Android API level (default: 24 / Android 7.0)
min_sdk = 24

# Android NDK location (default: $ANDROID_NDK_HOME)
# ndk_home = "/opt/android-ndk"
"#,
            crate_name = crate_name,
            library_name = library_name,
        )
    }
}

/// Configuration resolver that merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<MobindConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Creates a new resolver by discovering and loading configuration.
    pub fn new() -> Result<Self> {
        Ok(match MobindConfig::discover()? {
            Some((config, path)) => Self {
                config: Some(config),
                config_path: Some(path),
            },
            None => Self::default(),
        })
    }

    /// Returns the loaded configuration, or defaults when there is none.
    pub fn config(&self) -> MobindConfig {
        self.config.clone().unwrap_or_default()
    }

    /// Returns the library name from config, derived from crate name if needed.
    pub fn library_name(&self) -> Option<String> {
        self.config.as_ref().and_then(|c| c.library_name())
    }

    /// Resolves `path` against the config file's directory when it is relative.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match self.config_path.as_deref().and_then(Path::parent) {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Resolves a CLI value, using config as fallback.
    ///
    /// # Arguments
    ///
    /// * `cli_value` - Value from CLI argument (None if not provided)
    /// * `config_getter` - Function to get value from config
    /// * `default` - Default value if neither CLI nor config provides a value
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&MobindConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = MobindConfig::default();
        assert_eq!(config.android.min_sdk, 24);
        assert_eq!(config.ios.deployment_target, "12.0");
        assert_eq!(config.ios.version_tag, "A");
        assert!(!config.build.release);
        assert!(config.env.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("mobind.toml");

        let toml_content = r#"
[project]
crate = "test-lib"
title = "TestKit"
output = "out/TestKit.framework"

[build]
release = true
cflags = ["-O2", "-DNDEBUG"]
headers = ["include/test_lib.h"]

[env]
FEATURE = "on"

[ios]
deployment_target = "14.0"

[android]
min_sdk = 21
ndk_home = "/opt/ndk"
"#;
        std::fs::write(&config_path, toml_content).unwrap();

        let config = MobindConfig::load_from_file(&config_path).unwrap();

        assert_eq!(config.project.crate_name, Some("test-lib".to_string()));
        assert_eq!(config.library_name(), Some("test_lib".to_string()));
        assert_eq!(config.project.title, Some("TestKit".to_string()));
        assert!(config.build.release);
        assert_eq!(config.build.cflags, ["-O2", "-DNDEBUG"]);
        assert_eq!(config.env["FEATURE"], "on");
        assert_eq!(config.ios.deployment_target, "14.0");
        // unspecified keys keep their defaults
        assert_eq!(config.ios.version_tag, "A");
        assert_eq!(config.android.min_sdk, 21);
        assert_eq!(config.android.ndk_home, Some(PathBuf::from("/opt/ndk")));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("mobind.toml");
        std::fs::write(&config_path, "[android]\nmin_sdk = \"high\"\n").unwrap();

        let err = MobindConfig::load_from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_discover_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("mobind.toml");
        std::fs::write(&config_path, "[project]\ncrate = \"discovered\"\n").unwrap();
        let nested = temp_dir.path().join("crates/discovered/src");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, path) = MobindConfig::discover_from(&nested).unwrap().unwrap();
        assert_eq!(config.project.crate_name, Some("discovered".to_string()));
        assert_eq!(path, config_path);
    }

    #[test]
    fn test_discover_no_config() {
        let temp_dir = TempDir::new().unwrap();
        // Create a .git directory to stop the search
        std::fs::create_dir(temp_dir.path().join(".git")).unwrap();

        let result = MobindConfig::discover_from(temp_dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_config_resolver() {
        let mut config = MobindConfig::default();
        config.android.min_sdk = 26;
        config.project.crate_name = Some("my-lib".to_string());
        let resolver = ConfigResolver {
            config: Some(config),
            config_path: Some(PathBuf::from("/project/mobind.toml")),
        };

        // CLI value takes precedence
        assert_eq!(resolver.resolve(Some(30), |c| Some(c.android.min_sdk), 24), 30);
        // Config value used when CLI is None
        assert_eq!(resolver.resolve(None, |c| Some(c.android.min_sdk), 24), 26);
        // Default when neither has it
        let title = resolver.resolve(None, |c| c.project.title.clone(), "Default".to_string());
        assert_eq!(title, "Default");
        // crate name only reaches callers as a library name
        assert_eq!(resolver.library_name(), Some("my_lib".to_string()));

        assert_eq!(
            resolver.resolve_path(Path::new("include/a.h")),
            PathBuf::from("/project/include/a.h")
        );
        assert_eq!(
            resolver.resolve_path(Path::new("/abs/a.h")),
            PathBuf::from("/abs/a.h")
        );
    }

    #[test]
    fn test_generate_starter_toml() {
        let toml = MobindConfig::generate_starter_toml("my-lib");
        assert!(toml.contains("crate = \"my-lib\""));
        assert!(toml.contains("library_name = \"my_lib\""));
        assert!(toml.contains("min_sdk = 24"));
        assert!(toml.contains("deployment_target = \"12.0\""));

        // the starter file must parse back
        let parsed: MobindConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.library_name(), Some("my_lib".to_string()));
    }
}
