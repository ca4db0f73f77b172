//! Fan-out copy of one built artifact into every dependent service.
//!
//! Destinations are independent: each one is attempted even when others fail,
//! and successful copies stay in place. Every attempt is appended to the
//! activity log, which is write-only from this module's point of view.

use chrono::{SecondsFormat, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::output::BatchSummary;
use crate::utils::io;

/// Outcome of one destination attempt. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionResult {
    pub destination: String,
    pub succeeded: bool,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pruned: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionReport {
    pub run_id: String,
    pub artifact: String,
    pub checksum: String,
    pub results: Vec<DistributionResult>,
    pub summary: BatchSummary,
}

/// Append-only activity log shared by all destination tasks.
struct ActivityLog {
    path: PathBuf,
    run_id: String,
    guard: Mutex<()>,
}

impl ActivityLog {
    fn record(&self, artifact: &Path, result: &DistributionResult) {
        let status = if result.succeeded { "OK" } else { "FAIL" };
        let mut line = format!(
            "{} {} {} {} -> {}",
            result.timestamp,
            self.run_id,
            status,
            artifact.display(),
            result.destination
        );
        if let Some(error) = &result.error {
            line.push_str(&format!(" [{}]", error));
        }

        let _lock = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = io::append_line(&self.path, &line) {
            crate::log_status!("distribute", "Could not write activity log: {}", e.details);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactDistributor {
    pub log_path: PathBuf,
    /// Glob of stale artifacts removed from each destination before copying.
    pub prune_pattern: Option<String>,
}

impl ArtifactDistributor {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            prune_pattern: None,
        }
    }

    pub fn with_prune_pattern(mut self, pattern: Option<String>) -> Self {
        self.prune_pattern = pattern;
        self
    }

    /// Copy `artifact` into each destination directory.
    ///
    /// Fails fast with `artifact.missing` before touching any destination.
    /// Otherwise every destination is attempted; if any failed the call
    /// returns `distribution.partial` whose details carry the full report.
    pub fn distribute(&self, artifact: &Path, destinations: &[PathBuf]) -> Result<DistributionReport> {
        if !artifact.is_file() {
            return Err(Error::artifact_missing(artifact.display().to_string()));
        }

        let file_name = artifact
            .file_name()
            .ok_or_else(|| Error::artifact_missing(artifact.display().to_string()))?;
        let checksum = io::sha256_file(artifact)?;

        let unique: BTreeSet<&PathBuf> = destinations.iter().collect();
        let log = ActivityLog {
            path: self.log_path.clone(),
            run_id: Uuid::new_v4().to_string(),
            guard: Mutex::new(()),
        };

        let results: Vec<DistributionResult> = unique
            .into_par_iter()
            .map(|dest| {
                let result = self.copy_one(artifact, Path::new(file_name), &checksum, dest);
                log.record(artifact, &result);
                result
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.succeeded).count();
        let failed = results.len() - succeeded;
        let report = DistributionReport {
            run_id: log.run_id.clone(),
            artifact: artifact.display().to_string(),
            checksum,
            summary: BatchSummary::new(succeeded, failed),
            results,
        };

        crate::log_status!(
            "distribute",
            "{} of {} destinations updated",
            succeeded,
            report.summary.total
        );

        if failed > 0 {
            let details = serde_json::to_value(&report)
                .map_err(|e| Error::internal_json(e.to_string(), Some("serialize report".to_string())))?;
            return Err(Error::distribution_partial(failed, report.summary.total, details));
        }

        Ok(report)
    }

    fn copy_one(
        &self,
        artifact: &Path,
        file_name: &Path,
        checksum: &str,
        dest: &Path,
    ) -> DistributionResult {
        let outcome = self.try_copy(artifact, file_name, checksum, dest);
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let destination = dest.display().to_string();

        match outcome {
            Ok((bytes, pruned)) => {
                crate::log_status!("distribute", "Copied to {}", destination);
                DistributionResult {
                    destination,
                    succeeded: true,
                    timestamp,
                    bytes: Some(bytes),
                    pruned,
                    error: None,
                }
            }
            Err(err) => {
                let reason = err.details["error"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or(err.message);
                crate::log_status!("distribute", "Failed {}: {}", destination, reason);
                DistributionResult {
                    destination,
                    succeeded: false,
                    timestamp,
                    bytes: None,
                    pruned: Vec::new(),
                    error: Some(reason),
                }
            }
        }
    }

    fn try_copy(
        &self,
        artifact: &Path,
        file_name: &Path,
        checksum: &str,
        dest: &Path,
    ) -> Result<(u64, Vec<String>)> {
        io::ensure_dir(dest)?;

        let target = dest.join(file_name);
        let bytes = io::copy_file(artifact, &target)?;

        let copied = io::sha256_file(&target)?;
        if copied != checksum {
            return Err(Error::internal_io(
                format!("checksum mismatch after copy ({} != {})", copied, checksum),
                Some(format!("verify {}", target.display())),
            ));
        }

        // Stale artifacts go only once the new one is verified in place.
        let pruned = self.prune(dest, file_name)?;
        Ok((bytes, pruned))
    }

    fn prune(&self, dest: &Path, keep: &Path) -> Result<Vec<String>> {
        let Some(pattern) = &self.prune_pattern else {
            return Ok(Vec::new());
        };

        let entries = fs::read_dir(dest).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("list {}", dest.display())))
        })?;

        let mut pruned = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if Path::new(name.as_ref()) == keep || !entry.path().is_file() {
                continue;
            }
            if glob_match::glob_match(pattern, &name) {
                fs::remove_file(entry.path()).map_err(|e| {
                    Error::internal_io(e.to_string(), Some(format!("prune {}", name)))
                })?;
                pruned.push(name.to_string());
            }
        }
        pruned.sort();
        Ok(pruned)
    }
}
