use clap::Args;
use serde::Serialize;

use posctl::manifest::{ImageStatus, ManifestPinner};

use super::CmdResult;

/// Show how each service's image is referenced in the manifest.
#[derive(Args)]
pub struct StatusArgs {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    command: &'static str,
    manifest: String,
    services: Vec<ImageStatus>,
}

pub fn run(_args: StatusArgs, global: &super::GlobalArgs) -> CmdResult<StatusOutput> {
    let project = global.project()?;
    let registry = &project.config.registry;
    let pinner = ManifestPinner::new(project.manifest_path(), &registry.namespace, &registry.tag);

    Ok((
        StatusOutput {
            command: "status",
            manifest: pinner.path().display().to_string(),
            services: pinner.status()?,
        },
        0,
    ))
}
