use clap::{ArgGroup, Args};

use posctl::digest_update::{self, DigestMode, DigestUpdateReport};
use posctl::manifest::ManifestPinner;
use posctl::registry::DigestResolver;

use super::CmdResult;

#[derive(Args)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["fetch_digests", "use_env", "revert_to_latest"])
))]
pub struct DigestArgs {
    /// Resolve each service's current digest from the registry and pin it
    #[arg(long)]
    pub fetch_digests: bool,

    /// Pin digests supplied as <SERVICE>_DIGEST environment variables
    #[arg(long)]
    pub use_env: bool,

    /// Point every digest-pinned image back at the mutable tag
    #[arg(long)]
    pub revert_to_latest: bool,

    /// Only touch this service
    #[arg(long)]
    pub service: Option<String>,

    /// Exit non-zero if any service could not be pinned
    #[arg(long)]
    pub strict: bool,
}

impl DigestArgs {
    fn mode(&self) -> DigestMode {
        if self.fetch_digests {
            DigestMode::FetchDigests
        } else if self.use_env {
            DigestMode::UseEnv
        } else {
            DigestMode::RevertToLatest
        }
    }
}

pub fn run(args: DigestArgs, global: &super::GlobalArgs) -> CmdResult<DigestUpdateReport> {
    let project = global.project()?;
    let services = super::select_services(args.service.as_deref())?;
    let registry = &project.config.registry;
    let pinner = ManifestPinner::new(project.manifest_path(), &registry.namespace, &registry.tag);
    let strict = args.strict || project.config.digests.fail_on_unresolved;

    let report = match args.mode() {
        DigestMode::FetchDigests => {
            let resolver = DigestResolver::from_config(registry);
            digest_update::pin_services(
                &pinner,
                DigestMode::FetchDigests,
                &services,
                |service| resolver.resolve(&registry.namespace, service, &registry.tag),
                strict,
            )?
        }
        DigestMode::UseEnv => digest_update::pin_services(
            &pinner,
            DigestMode::UseEnv,
            &services,
            digest_update::env_lookup(|key| std::env::var(key).ok()),
            strict,
        )?,
        DigestMode::RevertToLatest => digest_update::revert_services(&pinner, &services)?,
    };

    Ok((report, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: DigestArgs,
    }

    #[test]
    fn exactly_one_mode_is_required() {
        assert!(Harness::try_parse_from(["digest"]).is_err());
        assert!(Harness::try_parse_from(["digest", "--use-env", "--revert-to-latest"]).is_err());
        assert!(Harness::try_parse_from(["digest", "--bogus"]).is_err());

        let parsed = Harness::try_parse_from(["digest", "--fetch-digests", "--service", "cart"]).unwrap();
        assert_eq!(parsed.args.mode(), DigestMode::FetchDigests);
        assert_eq!(parsed.args.service.as_deref(), Some("cart"));
    }
}
