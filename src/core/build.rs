use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Project;
use crate::error::{Error, Result};
use crate::utils::command::{self, CapturedOutput};
use crate::version::Version;

/// Runs the external build for the shared library and locates its artifact.
#[derive(Debug, Clone)]
pub struct ArtifactBuilder {
    pub command: String,
    pub working_dir: PathBuf,
    /// Artifact path template; `{version}` is substituted.
    pub artifact_template: String,
    pub clean_output_dir: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    pub build_command: String,
    pub working_dir: String,
    pub artifact: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_stale: Vec<String>,
    #[serde(flatten)]
    pub output: CapturedOutput,
}

impl ArtifactBuilder {
    pub fn from_project(project: &Project) -> Self {
        let build = &project.config.build;
        Self {
            command: build.command.clone(),
            working_dir: project.build_dir(),
            artifact_template: project.resolve(&build.artifact).display().to_string(),
            clean_output_dir: build.clean_output_dir,
        }
    }

    pub fn artifact_path(&self, version: &Version) -> PathBuf {
        PathBuf::from(
            self.artifact_template
                .replace("{version}", &version.to_string()),
        )
    }

    /// Build `version` and require its artifact to exist afterwards.
    pub fn build(&self, version: &Version) -> Result<BuildOutput> {
        if !self.working_dir.is_dir() {
            return Err(Error::validation_invalid_argument(
                "build.workingDir",
                format!("Build directory does not exist: {}", self.working_dir.display()),
                None,
                None,
            ));
        }

        let artifact = self.artifact_path(version);
        let removed_stale = if self.clean_output_dir {
            remove_stale_artifacts(&artifact)?
        } else {
            Vec::new()
        };

        crate::log_status!("build", "Running '{}' in {}", self.command, self.working_dir.display());
        let output = command::exec_shell(&self.command, Some(&self.working_dir));

        if !output.success {
            return Err(Error::build_failed(
                format!("Build command failed with exit code {}", output.exit_code),
                output.failure_details(self.command.clone()),
            ));
        }

        if !artifact.is_file() {
            return Err(Error::build_failed(
                format!(
                    "Build succeeded but artifact is missing: {}",
                    artifact.display()
                ),
                output.failure_details(self.command.clone()),
            )
            .with_hint("Check that 'build.artifact' matches the file the build produces"));
        }

        crate::log_status!("build", "Built {}", artifact.display());

        Ok(BuildOutput {
            build_command: self.command.clone(),
            working_dir: self.working_dir.display().to_string(),
            artifact: artifact.display().to_string(),
            removed_stale,
            output: output.captured(),
        })
    }
}

/// Remove files sharing the artifact's extension from its output directory,
/// so the directory holds only the freshly built artifact afterwards.
fn remove_stale_artifacts(artifact: &Path) -> Result<Vec<String>> {
    let (Some(dir), Some(ext)) = (artifact.parent(), artifact.extension()) else {
        return Ok(Vec::new());
    };
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("list {}", dir.display())))
    })?;

    let mut removed = Vec::new();
    for path in entries.flatten().map(|e| e.path()) {
        if path.is_file() && path.extension() == Some(ext) {
            fs::remove_file(&path).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("remove {}", path.display())))
            })?;
            removed.push(path.display().to_string());
        }
    }
    removed.sort();
    Ok(removed)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn builder(root: &Path, command: &str) -> ArtifactBuilder {
        ArtifactBuilder {
            command: command.to_string(),
            working_dir: root.to_path_buf(),
            artifact_template: root
                .join("dist/lib-{version}.whl")
                .display()
                .to_string(),
            clean_output_dir: true,
        }
    }

    #[test]
    fn build_produces_versioned_artifact() {
        let dir = tempdir().unwrap();
        let b = builder(dir.path(), "mkdir -p dist && touch dist/lib-1.2.10.whl");

        let out = b.build(&Version::new(1, 2, 10)).unwrap();
        assert!(out.artifact.ends_with("lib-1.2.10.whl"));
    }

    #[test]
    fn stale_artifacts_are_removed_before_build() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        fs::write(dir.path().join("dist/lib-1.2.9.whl"), "old").unwrap();
        fs::write(dir.path().join("dist/README"), "keep").unwrap();
        let b = builder(dir.path(), "touch dist/lib-1.2.10.whl");

        let out = b.build(&Version::new(1, 2, 10)).unwrap();
        assert_eq!(out.removed_stale.len(), 1);
        assert!(!dir.path().join("dist/lib-1.2.9.whl").exists());
        assert!(dir.path().join("dist/README").exists());
    }

    #[test]
    fn failing_command_is_build_failed() {
        let dir = tempdir().unwrap();
        let b = builder(dir.path(), "echo nope >&2; exit 2");

        let err = b.build(&Version::new(0, 1, 0)).unwrap_err();
        assert_eq!(err.code.as_str(), "build.failed");
        assert_eq!(err.details["exitCode"], 2);
        assert_eq!(err.details["stderr"], "nope\n");
    }

    #[test]
    fn missing_artifact_after_build_is_build_failed() {
        let dir = tempdir().unwrap();
        let b = builder(dir.path(), "true");

        let err = b.build(&Version::new(0, 1, 0)).unwrap_err();
        assert_eq!(err.code.as_str(), "build.failed");
        assert!(err.message.contains("artifact is missing"));
    }
}
