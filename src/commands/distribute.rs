use clap::Args;
use serde::Serialize;

use posctl::distribute::{ArtifactDistributor, DistributionReport};
use posctl::error::{Error, ErrorCode};
use posctl::service::ServiceName;
use posctl::version::{Version, VersionStore};

use super::CmdResult;

#[derive(Args)]
pub struct DistributeArgs {
    /// Service to distribute to (default: all services)
    pub service: Option<String>,

    /// Distribute this version instead of the one in the metadata file
    #[arg(long, value_name = "X.Y.Z")]
    pub version: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeOutput {
    command: &'static str,
    version: Version,
    services: Vec<ServiceName>,
    #[serde(flatten)]
    report: DistributionReport,
}

pub fn run(args: DistributeArgs, global: &super::GlobalArgs) -> CmdResult<DistributeOutput> {
    let project = global.project()?;
    let services = super::select_services(args.service.as_deref())?;

    let version = match args.version.as_deref() {
        Some(raw) => Version::parse(raw).ok_or_else(|| {
            Error::validation_invalid_argument(
                "version",
                format!("'{}' is not a MAJOR.MINOR.PATCH version", raw),
                Some(raw.to_string()),
                None,
            )
        })?,
        None => VersionStore::new(project.metadata_path()).read()?,
    };

    let artifact = project.artifact_path(&version.to_string());
    let distributor = ArtifactDistributor::new(project.distribution_log())
        .with_prune_pattern(project.config.distribute.prune_pattern.clone());
    let report = distributor
        .distribute(&artifact, &project.destinations(&services))
        .map_err(|err| match err.code {
            ErrorCode::ArtifactMissing => {
                err.with_hint("Run `posctl release` to build the artifact first")
            }
            _ => err,
        })?;

    Ok((
        DistributeOutput {
            command: "distribute",
            version,
            services,
            report,
        },
        0,
    ))
}
