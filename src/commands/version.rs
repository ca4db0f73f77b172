use clap::Args;
use serde::Serialize;

use posctl::version::{Version, VersionStore};

use super::CmdResult;

/// Show the shared library's current version.
#[derive(Args)]
pub struct VersionArgs {}

#[derive(Serialize)]
pub struct VersionShowOutput {
    command: &'static str,
    path: String,
    version: Version,
}

pub fn run(_args: VersionArgs, global: &super::GlobalArgs) -> CmdResult<VersionShowOutput> {
    let project = global.project()?;
    let store = VersionStore::new(project.metadata_path());
    let version = store.read()?;

    Ok((
        VersionShowOutput {
            command: "version.show",
            path: store.path().display().to_string(),
            version,
        },
        0,
    ))
}
