use clap::Args;
use serde::Serialize;

use posctl::build::{ArtifactBuilder, BuildOutput};
use posctl::version::{VersionBump, VersionStore};

use super::CmdResult;

/// Bump the patch version and build the shared library. Takes no flags.
#[derive(Args)]
pub struct ReleaseArgs {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseOutput {
    command: &'static str,
    version: VersionBump,
    build: BuildOutput,
}

pub fn run(_args: ReleaseArgs, global: &super::GlobalArgs) -> CmdResult<ReleaseOutput> {
    let project = global.project()?;
    let version = VersionStore::new(project.metadata_path()).bump()?;

    let builder = ArtifactBuilder::from_project(&project);
    let build = builder.build(&version.new_version).map_err(|mut err| {
        // The bump is already on disk; say so.
        if let Some(details) = err.details.as_object_mut() {
            details.insert(
                "versionBump".to_string(),
                serde_json::to_value(&version).unwrap_or_default(),
            );
        }
        err.with_hint(format!(
            "Version was bumped to {} before the build failed",
            version.new_version
        ))
    })?;

    Ok((
        ReleaseOutput {
            command: "release",
            version,
            build,
        },
        0,
    ))
}
