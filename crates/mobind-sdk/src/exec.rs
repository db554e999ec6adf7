//! Side-effect execution with dry-run and verbose support.
//!
//! Every filesystem mutation and every external process the pipeline starts goes
//! through an [`Executor`]. The pipeline makes the same decisions in a dry run
//! and a real run; only the executor decides whether the effect actually happens.
//!
//! When printing is enabled (verbose or dry-run) each effect is echoed as the
//! equivalent shell command, e.g. `mkdir -p ...`, `ln -s ...`, `cp ...`.

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::types::BindError;

/// Runs (or, in dry-run mode, only describes) side effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Executor {
    dry_run: bool,
    verbose: bool,
}

impl Executor {
    pub fn new(dry_run: bool, verbose: bool) -> Self {
        Self { dry_run, verbose }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Whether side effects are echoed.
    pub fn should_print(&self) -> bool {
        self.dry_run || self.verbose
    }

    /// Whether side effects are executed.
    pub fn should_run(&self) -> bool {
        !self.dry_run
    }

    fn print(&self, line: impl AsRef<str>) {
        if self.should_print() {
            println!("{}", line.as_ref());
        }
    }

    /// Creates a directory and all missing parents.
    pub fn mkdir(&self, dir: &Path) -> Result<(), BindError> {
        self.print(format!("mkdir -p {}", dir.display()));
        if self.should_run() {
            fs::create_dir_all(dir).map_err(|e| BindError::fs("mkdir", dir, e))?;
        }
        Ok(())
    }

    /// Creates `link` pointing at `target`. `target` is stored verbatim, so a
    /// relative target stays relative to the link's directory.
    pub fn symlink(&self, target: &Path, link: &Path) -> Result<(), BindError> {
        self.print(format!("ln -s {} {}", target.display(), link.display()));
        if self.should_run() {
            create_symlink(target, link).map_err(|e| BindError::fs("symlink", link, e))?;
        }
        Ok(())
    }

    /// Removes a file or directory tree. A missing path is not an error.
    pub fn remove_all(&self, path: &Path) -> Result<(), BindError> {
        self.print(format!("rm -r -f {}", path.display()));
        if !self.should_run() {
            return Ok(());
        }
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(BindError::fs("remove", path, e)),
        };
        let result = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| BindError::fs("remove", path, e))
    }

    /// Writes `contents` to `path`, creating parent directories first.
    pub fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), BindError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            self.mkdir(parent)?;
        }
        self.print(format!("write {}", path.display()));
        if self.should_run() {
            fs::write(path, contents).map_err(|e| BindError::fs("write", path, e))?;
        }
        Ok(())
    }

    /// Copies `src` to `dst`, creating the destination's parent directories first.
    pub fn copy_file(&self, src: &Path, dst: &Path) -> Result<(), BindError> {
        if let Some(parent) = dst.parent()
            && !parent.as_os_str().is_empty()
        {
            self.mkdir(parent)?;
        }
        self.print(format!("cp {} {}", src.display(), dst.display()));
        if self.should_run() {
            fs::copy(src, dst).map_err(|e| BindError::fs("copy", src, e))?;
        }
        Ok(())
    }

    /// Runs an external command to completion.
    ///
    /// On failure the returned string is a diagnostic containing the command
    /// line, the exit status and the captured output, ready to be wrapped into
    /// the caller's error variant.
    pub fn run(&self, mut cmd: Command, description: &str) -> Result<(), String> {
        self.print(render_command(&cmd));
        if !self.should_run() {
            return Ok(());
        }

        let output = cmd.output().map_err(|e| {
            format!(
                "Failed to start {}.\n\n\
                 Error: {}\n\n\
                 Ensure the tool is installed and available on PATH.",
                description, e
            )
        })?;

        if self.verbose {
            print!("{}", String::from_utf8_lossy(&output.stdout));
            eprint!("{}", String::from_utf8_lossy(&output.stderr));
        }

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} failed.\n\n\
                 Command: {}\n\
                 Exit status: {}\n\n\
                 Stdout:\n{}\n\n\
                 Stderr:\n{}",
                description,
                render_command(&cmd),
                output.status,
                stdout,
                stderr
            ));
        }
        Ok(())
    }

    /// Runs a command and returns its trimmed stdout, or `None` in dry-run mode.
    pub fn output(&self, mut cmd: Command, description: &str) -> Result<Option<String>, String> {
        self.print(render_command(&cmd));
        if !self.should_run() {
            return Ok(None);
        }

        let output = cmd
            .output()
            .map_err(|e| format!("Failed to start {}: {}", description, e))?;
        if !output.status.success() {
            return Err(format!(
                "{} failed ({}):\n{}",
                description,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }
}

/// Formats a command the way a shell user would type it, with explicitly set
/// environment variables in front.
pub fn render_command(cmd: &Command) -> String {
    let mut parts = Vec::new();
    if let Some(dir) = cmd.get_current_dir() {
        parts.push(format!("PWD={}", dir.display()));
    }
    for (key, value) in cmd.get_envs() {
        if let Some(value) = value {
            parts.push(format!(
                "{}={}",
                key.to_string_lossy(),
                value.to_string_lossy()
            ));
        }
    }
    parts.push(cmd.get_program().to_string_lossy().into_owned());
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "framework bundles need symlinks; build on macOS or Linux",
    ))
}
