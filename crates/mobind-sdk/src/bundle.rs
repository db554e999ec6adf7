//! Bundle assembly.
//!
//! An iOS framework bundle has a versioned internal layout and a set of
//! relative symlinks presenting a version-independent public view over it:
//!
//! ```text
//! Demo.framework/
//! ├── Demo -> Versions/Current/Demo
//! ├── Headers -> Versions/Current/Headers
//! ├── Modules -> Versions/Current/Modules
//! ├── Resources -> Versions/Current/Resources
//! └── Versions/
//!     ├── A/
//!     │   ├── Demo                  (merged static library)
//!     │   ├── Headers/*.h
//!     │   ├── Modules/module.modulemap
//!     │   └── Resources/Info.plist
//!     └── Current -> A
//! ```
//!
//! Android output is a plain `jniLibs/<abi>/lib<name>.so` tree (see
//! [`assemble_jni_libs`]).
//!
//! Both assemblers remove the destination first, so re-running after a
//! partial failure produces the same end state.

use std::path::{Path, PathBuf};

use crate::exec::Executor;
use crate::templates::{self, TemplateVar};
use crate::types::{BindError, BuildResult, Platform};

/// Entries the framework layout itself creates at the bundle root or under
/// `Versions/`. Compared case-insensitively, as on the default macOS filesystem.
const RESERVED_NAMES: [&str; 5] = ["Headers", "Resources", "Modules", "Versions", "Current"];

fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// Where and under which names a framework bundle is assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleConfig {
    root: PathBuf,
    title: String,
    module_name: String,
    version_tag: String,
}

impl BundleConfig {
    /// The module name defaults to `title` and the version tag to `A`.
    pub fn new(root: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            root: root.into(),
            module_name: title.clone(),
            title,
            version_tag: "A".to_string(),
        }
    }

    pub fn module_name(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = module_name.into();
        self
    }

    pub fn version_tag(mut self, version_tag: impl Into<String>) -> Self {
        self.version_tag = version_tag.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Checks names without touching the filesystem.
    pub fn validate(&self) -> Result<(), BindError> {
        validate_bundle_root(Platform::Ios, &self.root)?;
        for (what, value) in [
            ("title", &self.title),
            ("module name", &self.module_name),
            ("version tag", &self.version_tag),
        ] {
            if value.is_empty() || value.contains(['/', '\\']) || value == "." || value == ".." {
                return Err(BindError::Config(format!(
                    "invalid framework {} {:?}",
                    what, value
                )));
            }
        }
        if is_reserved(&self.title) {
            return Err(BindError::Config(format!(
                "framework title {:?} clashes with the bundle layout; pick a name other than {}",
                self.title,
                RESERVED_NAMES.join(", ")
            )));
        }
        if self.version_tag.eq_ignore_ascii_case("Current") {
            return Err(BindError::Config(
                "framework version tag \"Current\" is reserved for the Versions/Current link"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Checks that `root` carries the suffix the platform's bundle requires
/// (`*.framework` for iOS, a final `jniLibs` component for Android).
pub fn validate_bundle_root(platform: Platform, root: &Path) -> Result<(), BindError> {
    let expected = platform.bundle_suffix();
    let name = root.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let valid = match platform {
        Platform::Ios => name.len() > expected.len() && name.ends_with(expected),
        Platform::Android => name == expected,
    };
    if valid {
        Ok(())
    } else {
        Err(BindError::InvalidBundleName {
            path: root.to_path_buf(),
            expected,
        })
    }
}

/// The declarative module description written to `Modules/module.modulemap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleManifest {
    pub module_name: String,
    pub header_names: Vec<String>,
}

impl ModuleManifest {
    pub fn render(&self) -> Result<String, BindError> {
        let headers = self
            .header_names
            .iter()
            .map(|name| format!("    header \"{}\"", name))
            .collect::<Vec<_>>()
            .join("\n");
        templates::render(
            templates::MODULE_MAP,
            &[
                TemplateVar::new("MODULE_NAME", self.module_name.as_str()),
                TemplateVar::new("HEADERS", headers),
            ],
        )
    }
}

/// A file written verbatim into the bundle's `Resources` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub contents: Vec<u8>,
}

impl Resource {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// A finished framework bundle.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Bundle {
    pub root: PathBuf,
    /// Merged binary inside the versioned layout.
    pub binary: PathBuf,
    /// Header file names referenced by the module map, in order.
    pub headers: Vec<String>,
}

/// Assembles a framework bundle at `config.root`.
///
/// Directories are created first, then symlinks, then files. Any existing
/// tree at the root is removed beforehand.
pub fn assemble(
    exec: &Executor,
    config: &BundleConfig,
    merged_binary: &Path,
    headers: &[PathBuf],
    resources: &[Resource],
) -> Result<Bundle, BindError> {
    config.validate()?;

    let mut header_names: Vec<String> = Vec::with_capacity(headers.len());
    for header in headers {
        let name = header
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BindError::Config(format!("invalid header path {:?}", header)))?;
        if header_names.iter().any(|n| n == name) {
            return Err(BindError::Config(format!(
                "two headers are named {:?}; header file names must be unique",
                name
            )));
        }
        header_names.push(name.to_string());
    }
    let manifest = ModuleManifest {
        module_name: config.module_name.clone(),
        header_names,
    };
    let modulemap = manifest.render()?;

    let root = &config.root;
    let versions = root.join("Versions");
    let versioned = versions.join(&config.version_tag);

    exec.remove_all(root)?;
    for dir in ["Headers", "Resources", "Modules"] {
        exec.mkdir(&versioned.join(dir))?;
    }

    let current = Path::new("Versions").join("Current");
    exec.symlink(Path::new(&config.version_tag), &versions.join("Current"))?;
    for public in ["Headers", "Resources", "Modules", config.title.as_str()] {
        exec.symlink(&current.join(public), &root.join(public))?;
    }

    for (header, name) in headers.iter().zip(&manifest.header_names) {
        exec.copy_file(header, &versioned.join("Headers").join(name))?;
    }
    for resource in resources {
        exec.write_file(
            &versioned.join("Resources").join(&resource.name),
            &resource.contents,
        )?;
    }
    exec.write_file(
        &versioned.join("Modules").join("module.modulemap"),
        modulemap.as_bytes(),
    )?;

    let binary = versioned.join(&config.title);
    exec.copy_file(merged_binary, &binary)?;

    tracing::info!(bundle = %root.display(), "assembled framework");
    Ok(Bundle {
        root: root.clone(),
        binary,
        headers: manifest.header_names,
    })
}

/// Lays out per-ABI shared libraries as `<root>/<abi>/lib<lib_name>.so`.
///
/// Returns the installed library paths in `results` order.
pub fn assemble_jni_libs(
    exec: &Executor,
    root: &Path,
    lib_name: &str,
    results: &[BuildResult],
) -> Result<Vec<PathBuf>, BindError> {
    validate_bundle_root(Platform::Android, root)?;
    let placed = results
        .iter()
        .map(|result| {
            let abi = Platform::Android.arch_tag(result.arch)?;
            Ok((result, root.join(abi).join(format!("lib{}.so", lib_name))))
        })
        .collect::<Result<Vec<_>, BindError>>()?;

    exec.remove_all(root)?;
    let mut installed = Vec::with_capacity(placed.len());
    for (result, dest) in placed {
        exec.copy_file(&result.artifact_path, &dest)?;
        installed.push(dest);
    }

    tracing::info!(root = %root.display(), count = installed.len(), "assembled jniLibs");
    Ok(installed)
}
