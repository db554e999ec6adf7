//! Multi-architecture ("fat") binary merging.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::exec::Executor;
use crate::types::{BindError, BuildResult, Platform};

/// One input of a merge: an artifact and the architecture identifier the
/// archiving tool knows it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedArtifact {
    pub tag: &'static str,
    pub path: PathBuf,
}

/// Combines single-architecture binaries into one file.
pub trait ArchiveTool {
    fn merge_architectures(
        &self,
        inputs: &[TaggedArtifact],
        output: &Path,
    ) -> Result<(), BindError>;
}

/// `xcrun lipo -create -arch <tag> <path> ... -o <output>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lipo {
    exec: Executor,
}

impl Lipo {
    pub fn new(exec: Executor) -> Self {
        Self { exec }
    }
}

impl ArchiveTool for Lipo {
    fn merge_architectures(
        &self,
        inputs: &[TaggedArtifact],
        output: &Path,
    ) -> Result<(), BindError> {
        let mut cmd = Command::new("xcrun");
        cmd.args(["lipo", "-create"]);
        for input in inputs {
            cmd.arg("-arch").arg(input.tag).arg(&input.path);
        }
        cmd.arg("-o").arg(output);

        self.exec
            .run(cmd, "lipo")
            .map_err(|diagnostic| BindError::MergeFailed { diagnostic })
    }
}

/// Merges `results` into a single binary at `output`.
///
/// Every architecture is mapped through [`Platform::arch_tag`] before the tool
/// runs, so an unmapped architecture fails without invoking it. Inputs are
/// passed in the order given and are left in place.
pub fn merge(
    platform: Platform,
    results: &[BuildResult],
    output: &Path,
    tool: &dyn ArchiveTool,
) -> Result<(), BindError> {
    if results.is_empty() {
        return Err(BindError::MergeFailed {
            diagnostic: "no architectures were built".to_string(),
        });
    }

    let inputs = results
        .iter()
        .map(|result| {
            Ok(TaggedArtifact {
                tag: platform.arch_tag(result.arch)?,
                path: result.artifact_path.clone(),
            })
        })
        .collect::<Result<Vec<_>, BindError>>()?;

    tracing::debug!(
        count = inputs.len(),
        output = %output.display(),
        "merging architectures"
    );
    tool.merge_architectures(&inputs, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Arch;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingTool {
        calls: RefCell<Vec<Vec<TaggedArtifact>>>,
    }

    impl ArchiveTool for RecordingTool {
        fn merge_architectures(
            &self,
            inputs: &[TaggedArtifact],
            _output: &Path,
        ) -> Result<(), BindError> {
            self.calls.borrow_mut().push(inputs.to_vec());
            Ok(())
        }
    }

    fn result(arch: Arch, path: &str) -> BuildResult {
        BuildResult {
            arch,
            artifact_path: PathBuf::from(path),
        }
    }

    #[test]
    fn tags_are_mapped_in_input_order() {
        let tool = RecordingTool::default();
        let results = [
            result(Arch::X86_64, "/w/demo-x86_64.a"),
            result(Arch::Arm, "/w/demo-arm.a"),
            result(Arch::Arm64, "/w/demo-arm64.a"),
        ];
        merge(Platform::Ios, &results, Path::new("/w/demo.a"), &tool).unwrap();

        let calls = tool.calls.borrow();
        assert_eq!(calls.len(), 1);
        let tags: Vec<&str> = calls[0].iter().map(|t| t.tag).collect();
        assert_eq!(tags, ["x86_64", "armv7", "arm64"]);
        assert_eq!(calls[0][1].path, PathBuf::from("/w/demo-arm.a"));
    }

    #[test]
    fn unmapped_arch_never_reaches_the_tool() {
        let tool = RecordingTool::default();
        let results = [result(Arch::Arm64, "/w/a.a"), result(Arch::X86, "/w/b.a")];
        let err = merge(Platform::Ios, &results, Path::new("/w/out.a"), &tool).unwrap_err();

        assert!(matches!(
            err,
            BindError::UnmappedArch {
                arch: Arch::X86,
                ..
            }
        ));
        assert!(tool.calls.borrow().is_empty());
    }

    #[test]
    fn empty_input_is_an_error() {
        let tool = RecordingTool::default();
        let err = merge(Platform::Ios, &[], Path::new("/w/out.a"), &tool).unwrap_err();
        assert!(matches!(err, BindError::MergeFailed { .. }));
    }

    #[test]
    fn lipo_dry_run_succeeds_without_xcrun() {
        let lipo = Lipo::new(Executor::new(true, false));
        let inputs = [TaggedArtifact {
            tag: "arm64",
            path: PathBuf::from("/w/demo-arm64.a"),
        }];
        lipo.merge_architectures(&inputs, Path::new("/w/demo.a"))
            .unwrap();
    }

    #[test]
    fn lipo_failure_is_merge_failed() {
        let temp = tempfile::tempdir().unwrap();
        let lipo = Lipo::new(Executor::default());
        let inputs = [TaggedArtifact {
            tag: "arm64",
            path: temp.path().join("missing.a"),
        }];
        // either xcrun is absent or lipo rejects the missing input
        let err = lipo
            .merge_architectures(&inputs, &temp.path().join("out.a"))
            .unwrap_err();
        assert!(matches!(err, BindError::MergeFailed { .. }));
    }
}
