use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    VersionNotFound,
    VersionInvalidFormat,
    VersionWriteFailed,

    BuildFailed,

    ArtifactMissing,
    DistributionPartial,

    RegistryDigestUnavailable,
    RegistryRequestFailed,

    ManifestNotFound,
    ManifestLocked,
    ManifestInvalid,
    DigestUpdatePartial,

    WorkflowNoRuns,
    WorkflowRunFailed,
    CiCommandFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::VersionNotFound => "version.not_found",
            ErrorCode::VersionInvalidFormat => "version.invalid_format",
            ErrorCode::VersionWriteFailed => "version.write_failed",

            ErrorCode::BuildFailed => "build.failed",

            ErrorCode::ArtifactMissing => "artifact.missing",
            ErrorCode::DistributionPartial => "distribution.partial",

            ErrorCode::RegistryDigestUnavailable => "registry.digest_unavailable",
            ErrorCode::RegistryRequestFailed => "registry.request_failed",

            ErrorCode::ManifestNotFound => "manifest.not_found",
            ErrorCode::ManifestLocked => "manifest.locked",
            ErrorCode::ManifestInvalid => "manifest.invalid",
            ErrorCode::DigestUpdatePartial => "digest.partial",

            ErrorCode::WorkflowNoRuns => "workflow.no_runs",
            ErrorCode::WorkflowRunFailed => "workflow.run_failed",
            ErrorCode::CiCommandFailed => "ci.command_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCode::ConfigInvalidJson
            | ErrorCode::ConfigInvalidValue
            | ErrorCode::ValidationMissingArgument
            | ErrorCode::ValidationInvalidArgument
            | ErrorCode::VersionInvalidFormat
            | ErrorCode::ManifestInvalid => 2,

            ErrorCode::DistributionPartial | ErrorCode::DigestUpdatePartial => 3,

            ErrorCode::VersionNotFound
            | ErrorCode::ArtifactMissing
            | ErrorCode::ManifestNotFound
            | ErrorCode::WorkflowNoRuns => 4,

            ErrorCode::ManifestLocked => 5,

            ErrorCode::BuildFailed
            | ErrorCode::RegistryDigestUnavailable
            | ErrorCode::RegistryRequestFailed
            | ErrorCode::WorkflowRunFailed
            | ErrorCode::CiCommandFailed => 20,

            ErrorCode::VersionWriteFailed
            | ErrorCode::InternalIoError
            | ErrorCode::InternalJsonError
            | ErrorCode::InternalUnexpected => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingPathDetails {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            serde_json::json!({ "args": args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
            tried,
        });

        Self::new(ErrorCode::ValidationInvalidArgument, problem, details)
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            serde_json::json!({ "path": path.into(), "error": err.to_string() }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            serde_json::json!({
                "key": key.into(),
                "value": value,
                "problem": problem.into(),
            }),
        )
    }

    pub fn version_not_found(path: impl Into<String>, marker: Option<String>) -> Self {
        let path = path.into();
        let message = match &marker {
            Some(marker) => format!("Version marker '{}' not found in {}", marker, path),
            None => format!("Metadata file not found: {}", path),
        };
        Self::new(
            ErrorCode::VersionNotFound,
            message,
            to_details(MissingPathDetails { path, marker }),
        )
        .with_hint("Set 'metadataFile' in posctl.json to the file carrying __version__")
    }

    pub fn version_invalid_format(path: impl Into<String>, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self::new(
            ErrorCode::VersionInvalidFormat,
            format!("Version '{}' is not a MAJOR.MINOR.PATCH number triple", raw),
            serde_json::json!({ "path": path.into(), "value": raw }),
        )
    }

    pub fn version_write_failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::VersionWriteFailed,
            format!("Could not write version to {}", path),
            serde_json::json!({ "path": path, "error": error.into() }),
        )
    }

    pub fn build_failed(message: impl Into<String>, details: CommandFailedDetails) -> Self {
        Self::new(ErrorCode::BuildFailed, message, to_details(details))
    }

    pub fn artifact_missing(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ArtifactMissing,
            format!("Artifact not found: {}", path),
            to_details(MissingPathDetails { path, marker: None }),
        )
        .with_hint("Run 'posctl release' to build the artifact first")
    }

    /// Aggregate failure after a fan-out where at least one destination failed.
    /// `report` carries every per-destination result, successes included.
    pub fn distribution_partial(failed: usize, total: usize, report: Value) -> Self {
        Self::new(
            ErrorCode::DistributionPartial,
            format!("Distribution failed for {} of {} destinations", failed, total),
            report,
        )
    }

    pub fn digest_unavailable(reference: impl Into<String>, raw: Option<String>) -> Self {
        let reference = reference.into();
        Self::new(
            ErrorCode::RegistryDigestUnavailable,
            format!("No digest available for {}", reference),
            serde_json::json!({ "reference": reference, "value": raw }),
        )
    }

    pub fn registry_request_failed(reference: impl Into<String>, error: impl Into<String>) -> Self {
        let reference = reference.into();
        Self::new(
            ErrorCode::RegistryRequestFailed,
            format!("Registry query failed for {}", reference),
            serde_json::json!({ "reference": reference, "error": error.into() }),
        )
    }

    pub fn manifest_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ManifestNotFound,
            format!("Manifest not found: {}", path),
            to_details(MissingPathDetails { path, marker: None }),
        )
        .with_hint("Set 'manifest.path' in posctl.json or pass --root")
    }

    pub fn manifest_locked(lock_path: impl Into<String>) -> Self {
        let mut err = Self::new(
            ErrorCode::ManifestLocked,
            "Manifest is being rewritten by another process",
            serde_json::json!({ "lock": lock_path.into() }),
        )
        .with_hint("Remove the lock file if no other posctl process is running");
        err.retryable = Some(true);
        err
    }

    pub fn manifest_invalid(path: impl Into<String>, problem: impl Into<String>) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::ManifestInvalid,
            format!("Manifest rewrite rejected: {}", problem),
            serde_json::json!({ "path": path.into(), "problem": problem }),
        )
    }

    pub fn digest_update_partial(skipped: usize, report: Value) -> Self {
        Self::new(
            ErrorCode::DigestUpdatePartial,
            format!("{} service(s) could not be pinned", skipped),
            report,
        )
    }

    pub fn workflow_no_runs(workflow: impl Into<String>) -> Self {
        let workflow = workflow.into();
        Self::new(
            ErrorCode::WorkflowNoRuns,
            format!("No runs found for workflow {}", workflow),
            serde_json::json!({ "workflow": workflow }),
        )
    }

    pub fn workflow_run_failed(report: Value) -> Self {
        Self::new(ErrorCode::WorkflowRunFailed, "Workflow run failed", report)
    }

    pub fn ci_command_failed(details: CommandFailedDetails) -> Self {
        Self::new(
            ErrorCode::CiCommandFailed,
            format!("CI query failed: {}", details.command),
            to_details(details),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_errors_share_not_found_exit_code() {
        assert_eq!(Error::artifact_missing("/x.whl").code.exit_code(), 4);
        assert_eq!(Error::manifest_not_found("/c.yml").code.exit_code(), 4);
        assert_eq!(Error::version_not_found("/a.py", None).code.exit_code(), 4);
    }

    #[test]
    fn version_format_error_keeps_raw_value() {
        let err = Error::version_invalid_format("/a.py", "1.2");
        assert_eq!(err.code.as_str(), "version.invalid_format");
        assert_eq!(err.details["value"], "1.2");
    }

    #[test]
    fn manifest_locked_is_retryable() {
        let err = Error::manifest_locked("/c.yml.lock");
        assert_eq!(err.retryable, Some(true));
        assert!(!err.hints.is_empty());
    }
}
