//! Batch digest update across services.
//!
//! Digests are gathered per service first; a service whose digest cannot be
//! obtained is skipped and the rest are still pinned. All pins of one batch
//! go through a single manifest pass.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::image::Digest;
use crate::manifest::{Edit, ManifestPinner, RewriteReport};
use crate::output::BatchSummary;
use crate::service::ServiceName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestMode {
    FetchDigests,
    UseEnv,
    RevertToLatest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pinned,
    Reverted,
    Unchanged,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOutcome {
    pub service: ServiceName,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestUpdateReport {
    pub mode: DigestMode,
    pub manifest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    pub services: Vec<ServiceOutcome>,
    pub summary: BatchSummary,
}

/// Pin each of `services` to the digest `lookup` returns for it.
///
/// Lookup failures are per-service skips. With `fail_on_unresolved` any skip
/// turns the finished batch into `digest.partial`; the pins that did succeed
/// are written either way.
pub fn pin_services<F>(
    pinner: &ManifestPinner,
    mode: DigestMode,
    services: &[ServiceName],
    mut lookup: F,
    fail_on_unresolved: bool,
) -> Result<DigestUpdateReport>
where
    F: FnMut(ServiceName) -> Result<Digest>,
{
    pinner.ensure_exists()?;

    let mut pins = Vec::new();
    let mut skipped = Vec::new();
    for &service in services {
        match lookup(service) {
            Ok(digest) => pins.push((service, digest)),
            Err(err) => {
                crate::log_status!("digest", "Skipping {}: {}", service, err.message);
                skipped.push(ServiceOutcome {
                    service,
                    outcome: Outcome::Skipped,
                    reference: None,
                    reason: Some(err.message),
                });
            }
        }
    }

    let rewrite = if pins.is_empty() {
        None
    } else {
        Some(pinner.pin_all(&pins)?)
    };

    let report = build_report(pinner, mode, rewrite, Outcome::Pinned, skipped);
    if fail_on_unresolved && report.summary.failed > 0 {
        let details = serde_json::to_value(&report)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize report".to_string())))?;
        return Err(Error::digest_update_partial(report.summary.failed, details));
    }
    Ok(report)
}

/// Revert `services` to the mutable tag in one pass.
pub fn revert_services(pinner: &ManifestPinner, services: &[ServiceName]) -> Result<DigestUpdateReport> {
    let edits: Vec<Edit> = services.iter().copied().map(Edit::Revert).collect();
    let rewrite = pinner.apply(&edits)?;
    Ok(build_report(
        pinner,
        DigestMode::RevertToLatest,
        Some(rewrite),
        Outcome::Reverted,
        Vec::new(),
    ))
}

/// Digest lookup from `<SERVICE>_DIGEST` variables, read through `getter`.
/// Only full-length `sha256:<64 hex>` values are accepted.
pub fn env_lookup<G>(getter: G) -> impl FnMut(ServiceName) -> Result<Digest>
where
    G: Fn(&str) -> Option<String>,
{
    move |service| {
        let key = service.env_key();
        let value = match getter(&key) {
            Some(value) if !value.trim().is_empty() => value,
            _ => return Err(Error::validation_missing_argument(vec![key])),
        };

        let digest = Digest::parse(&value)?;
        if !digest.is_canonical() {
            return Err(Error::validation_invalid_argument(
                key,
                format!("'{}' is not a full sha256 digest", digest),
                Some(value.trim().to_string()),
                None,
            ));
        }
        Ok(digest)
    }
}

fn build_report(
    pinner: &ManifestPinner,
    mode: DigestMode,
    rewrite: Option<RewriteReport>,
    changed_outcome: Outcome,
    skipped: Vec<ServiceOutcome>,
) -> DigestUpdateReport {
    let mut services: Vec<ServiceOutcome> = Vec::new();
    let mut backup = None;

    if let Some(rewrite) = rewrite {
        backup = Some(rewrite.backup);
        services.extend(rewrite.services.into_iter().map(|s| {
            let (outcome, reason) = match (s.matched, s.changed) {
                (0, _) => (
                    Outcome::Unchanged,
                    Some("no matching image line in manifest".to_string()),
                ),
                (_, 0) => (Outcome::Unchanged, None),
                _ => (changed_outcome, None),
            };
            ServiceOutcome {
                service: s.service,
                outcome,
                reference: Some(s.reference),
                reason,
            }
        }));
    }

    let failed = skipped.len();
    services.extend(skipped);
    services.sort_by_key(|s| s.service);

    DigestUpdateReport {
        mode,
        manifest: pinner.path().display().to_string(),
        backup,
        summary: BatchSummary::new(services.len() - failed, failed),
        services,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::FakeRegistry;
    use crate::registry::DigestResolver;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn compose() -> String {
        let mut text = String::from("services:\n");
        for service in ServiceName::ALL {
            text.push_str(&format!(
                "  {}:\n    image: zyg5467/{}:latest\n",
                service,
                service.image_name()
            ));
        }
        text
    }

    fn setup() -> (tempfile::TempDir, ManifestPinner) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docker-compose.prod.yml");
        fs::write(&path, compose()).unwrap();
        (dir, ManifestPinner::new(path, "zyg5467", "latest"))
    }

    fn hex(n: usize) -> String {
        format!("sha256:{:064x}", n)
    }

    fn registry_with_one_gap() -> DigestResolver {
        let mut fake = FakeRegistry::default();
        for (n, service) in ServiceName::ALL.into_iter().enumerate() {
            let answer = if service == ServiceName::Report {
                Some(String::new())
            } else {
                Some(hex(n + 1))
            };
            fake = fake.with(service, Ok(answer));
        }
        DigestResolver::new("docker.io", Box::new(fake))
    }

    #[test]
    fn one_unresolved_service_does_not_block_the_other_six() {
        let (_dir, pinner) = setup();
        let resolver = registry_with_one_gap();

        let report = pin_services(
            &pinner,
            DigestMode::FetchDigests,
            &ServiceName::ALL,
            |s| resolver.resolve("zyg5467", s, "latest"),
            false,
        )
        .unwrap();

        assert_eq!(report.summary.succeeded, 6);
        assert_eq!(report.summary.failed, 1);
        let text = fs::read_to_string(pinner.path()).unwrap();
        assert_eq!(text.matches("@sha256:").count(), 6);
        assert!(text.contains("image: zyg5467/pos-report:latest\n"));

        let report_outcome = report
            .services
            .iter()
            .find(|s| s.service == ServiceName::Report)
            .unwrap();
        assert_eq!(report_outcome.outcome, Outcome::Skipped);
        assert!(report.backup.is_some());
    }

    #[test]
    fn strict_policy_reports_partial_but_keeps_pins() {
        let (_dir, pinner) = setup();
        let resolver = registry_with_one_gap();

        let err = pin_services(
            &pinner,
            DigestMode::FetchDigests,
            &ServiceName::ALL,
            |s| resolver.resolve("zyg5467", s, "latest"),
            true,
        )
        .unwrap_err();

        assert_eq!(err.code.as_str(), "digest.partial");
        assert_eq!(err.details["summary"]["failed"], 1);
        let text = fs::read_to_string(pinner.path()).unwrap();
        assert_eq!(text.matches("@sha256:").count(), 6);
    }

    #[test]
    fn env_lookup_reads_service_keys() {
        let (_dir, pinner) = setup();
        let vars: HashMap<String, String> = [
            ("CART_DIGEST".to_string(), hex(7)),
            ("MASTER_DATA_DIGEST".to_string(), "garbage".to_string()),
        ]
        .into_iter()
        .collect();

        let report = pin_services(
            &pinner,
            DigestMode::UseEnv,
            &[ServiceName::Cart, ServiceName::MasterData, ServiceName::Stock],
            env_lookup(|key| vars.get(key).cloned()),
            false,
        )
        .unwrap();

        let outcomes: Vec<Outcome> = report.services.iter().map(|s| s.outcome).collect();
        // Sorted by service: master-data, cart, stock.
        assert_eq!(
            outcomes,
            vec![Outcome::Skipped, Outcome::Pinned, Outcome::Skipped]
        );
        assert_eq!(report.services[1].reference.as_deref(), Some(format!("zyg5467/pos-cart@{}", hex(7)).as_str()));
    }

    #[test]
    fn env_lookup_skips_truncated_digest() {
        let (_dir, pinner) = setup();
        let before = fs::read_to_string(pinner.path()).unwrap();

        let report = pin_services(
            &pinner,
            DigestMode::UseEnv,
            &[ServiceName::Cart],
            env_lookup(|key| (key == "CART_DIGEST").then(|| "sha256:ab".to_string())),
            false,
        )
        .unwrap();

        assert_eq!(report.services[0].outcome, Outcome::Skipped);
        assert!(report.services[0]
            .reason
            .as_deref()
            .unwrap()
            .contains("not a full sha256 digest"));
        assert_eq!(fs::read_to_string(pinner.path()).unwrap(), before);
    }

    #[test]
    fn nothing_resolved_writes_no_backup() {
        let (dir, pinner) = setup();

        let report = pin_services(
            &pinner,
            DigestMode::UseEnv,
            &ServiceName::ALL,
            env_lookup(|_| None),
            false,
        )
        .unwrap();

        assert!(report.backup.is_none());
        assert_eq!(report.summary.failed, 7);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_manifest_fails_before_lookup() {
        let dir = tempdir().unwrap();
        let pinner = ManifestPinner::new(dir.path().join("absent.yml"), "zyg5467", "latest");
        let mut calls = 0;

        let err = pin_services(
            &pinner,
            DigestMode::FetchDigests,
            &ServiceName::ALL,
            |_| {
                calls += 1;
                Digest::parse("sha256:abc")
            },
            false,
        )
        .unwrap_err();

        assert_eq!(err.code.as_str(), "manifest.not_found");
        assert_eq!(calls, 0);
    }

    #[test]
    fn revert_marks_changed_and_unchanged() {
        let (_dir, pinner) = setup();
        pinner
            .pin_to_digest(ServiceName::Cart, &Digest::parse(&hex(3)).unwrap())
            .unwrap();

        let report = revert_services(&pinner, &[ServiceName::Cart, ServiceName::Stock]).unwrap();

        assert_eq!(report.services[0].outcome, Outcome::Reverted);
        assert_eq!(report.services[1].outcome, Outcome::Unchanged);
        assert!(report.summary.is_complete());
    }
}
