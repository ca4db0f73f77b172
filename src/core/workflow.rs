//! Point-in-time status of a CI workflow.
//!
//! Nothing is cached or polled: every check asks the backend for the latest
//! run once, and fetches its log only when that run failed.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::{command, parser};

const RUN_FIELDS: &str = "databaseId,status,conclusion,createdAt,headBranch,displayTitle";
const DETAIL_FIELDS: &str =
    "databaseId,status,conclusion,createdAt,headBranch,displayTitle,event,url,jobs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    #[serde(rename = "databaseId")]
    pub id: u64,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(rename = "headBranch", default)]
    pub branch: String,
    #[serde(rename = "displayTitle", default)]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunJob {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetail {
    #[serde(flatten)]
    pub summary: RunSummary,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub jobs: Vec<RunJob>,
}

/// Read-only queries against a CI backend.
pub trait CiBackend {
    fn latest_run(&self, workflow: &str) -> Result<Option<RunSummary>>;
    fn view_run(&self, id: u64) -> Result<RunDetail>;
    fn run_log(&self, id: u64) -> Result<String>;
}

/// GitHub Actions through the `gh` CLI.
#[derive(Debug, Clone)]
pub struct GhCli {
    pub program: String,
}

impl GhCli {
    fn query(&self, args: &[&str]) -> Result<String> {
        let output = command::exec(&self.program, args, None);
        if !output.success {
            return Err(Error::ci_command_failed(
                output.failure_details(command::display(&self.program, args)),
            ));
        }
        Ok(output.stdout)
    }
}

impl CiBackend for GhCli {
    fn latest_run(&self, workflow: &str) -> Result<Option<RunSummary>> {
        let stdout = self.query(&[
            "run", "list", "--workflow", workflow, "--limit", "1", "--json", RUN_FIELDS,
        ])?;
        let runs: Vec<RunSummary> = serde_json::from_str(stdout.trim())
            .map_err(|e| Error::internal_json(e.to_string(), Some("parse gh run list".to_string())))?;
        Ok(runs.into_iter().next())
    }

    fn view_run(&self, id: u64) -> Result<RunDetail> {
        let id = id.to_string();
        let stdout = self.query(&["run", "view", &id, "--json", DETAIL_FIELDS])?;
        serde_json::from_str(stdout.trim())
            .map_err(|e| Error::internal_json(e.to_string(), Some("parse gh run view".to_string())))
    }

    fn run_log(&self, id: u64) -> Result<String> {
        let id = id.to_string();
        self.query(&["run", "view", &id, "--log"])
    }
}

/// Classified state of the latest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunState {
    NoRunsFound,
    Queued,
    Running,
    Succeeded,
    /// A log that could not be fetched leaves `log_tail` empty and sets `log_error`.
    Failed {
        #[serde(rename = "logTail", skip_serializing_if = "Option::is_none")]
        log_tail: Option<String>,
        #[serde(rename = "logError", skip_serializing_if = "Option::is_none")]
        log_error: Option<String>,
    },
    Cancelled,
    Unknown { raw: String },
}

impl RunState {
    pub fn label(&self) -> &'static str {
        match self {
            RunState::NoRunsFound => "no runs found",
            RunState::Queued => "queued",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed { .. } => "failed",
            RunState::Cancelled => "cancelled",
            RunState::Unknown { .. } => "unknown",
        }
    }

    /// Whether this observation should make the command exit non-zero.
    pub fn is_failure(&self) -> bool {
        matches!(self, RunState::NoRunsFound | RunState::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    pub workflow: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunSummary>,
    #[serde(flatten)]
    pub state: RunState,
}

pub struct WorkflowMonitor<B: CiBackend> {
    backend: B,
    log_tail: usize,
}

impl<B: CiBackend> WorkflowMonitor<B> {
    pub fn new(backend: B, log_tail: usize) -> Self {
        Self { backend, log_tail }
    }

    pub fn check(&self, workflow: &str) -> Result<WorkflowReport> {
        let Some(run) = self.backend.latest_run(workflow)? else {
            return Ok(WorkflowReport {
                workflow: workflow.to_string(),
                run: None,
                state: RunState::NoRunsFound,
            });
        };

        let state = match (run.status.as_str(), run.conclusion.as_deref()) {
            ("queued" | "waiting" | "requested" | "pending", _) => RunState::Queued,
            ("in_progress", _) => RunState::Running,
            ("completed", Some("success")) => RunState::Succeeded,
            ("completed", Some("failure")) => match self.backend.run_log(run.id) {
                Ok(log) => RunState::Failed {
                    log_tail: Some(parser::tail_lines(&log, self.log_tail)),
                    log_error: None,
                },
                Err(err) => {
                    crate::log_status!("workflow", "Could not fetch log for run {}: {}", run.id, err.message);
                    RunState::Failed {
                        log_tail: None,
                        log_error: Some(err.message),
                    }
                }
            },
            ("completed", Some("cancelled")) => RunState::Cancelled,
            ("completed", other) => RunState::Unknown {
                raw: other.unwrap_or_default().to_string(),
            },
            (status, _) => RunState::Unknown {
                raw: status.to_string(),
            },
        };

        crate::log_status!("workflow", "{} run {}: {}", workflow, run.id, state.label());

        Ok(WorkflowReport {
            workflow: workflow.to_string(),
            run: Some(run),
            state,
        })
    }

    pub fn detail(&self, id: u64) -> Result<RunDetail> {
        self.backend.view_run(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct FakeCi {
        run: Option<RunSummary>,
        log: String,
        log_unavailable: bool,
        list_calls: Cell<usize>,
        log_calls: Cell<usize>,
    }

    impl FakeCi {
        fn with_run(status: &str, conclusion: Option<&str>) -> Self {
            Self {
                run: Some(RunSummary {
                    id: 42,
                    status: status.to_string(),
                    conclusion: conclusion.map(str::to_string),
                    created_at: "2026-10-17T08:00:00Z".to_string(),
                    branch: "main".to_string(),
                    title: "Publish images".to_string(),
                }),
                log: (1..=80).map(|n| format!("line {}\n", n)).collect(),
                ..Default::default()
            }
        }
    }

    impl CiBackend for &FakeCi {
        fn latest_run(&self, _workflow: &str) -> Result<Option<RunSummary>> {
            self.list_calls.set(self.list_calls.get() + 1);
            Ok(self.run.clone())
        }

        fn view_run(&self, _id: u64) -> Result<RunDetail> {
            let summary = self
                .run
                .clone()
                .ok_or_else(|| Error::internal_unexpected("no run"))?;
            Ok(RunDetail {
                summary,
                event: Some("push".to_string()),
                url: None,
                jobs: Vec::new(),
            })
        }

        fn run_log(&self, _id: u64) -> Result<String> {
            self.log_calls.set(self.log_calls.get() + 1);
            if self.log_unavailable {
                return Err(Error::internal_unexpected("log expired"));
            }
            Ok(self.log.clone())
        }
    }

    #[test]
    fn no_runs_found_skips_log_fetch() {
        let ci = FakeCi::default();
        let report = WorkflowMonitor::new(&ci, 50).check("nightly.yml").unwrap();

        assert_eq!(report.state, RunState::NoRunsFound);
        assert!(report.state.is_failure());
        assert_eq!(ci.list_calls.get(), 1);
        assert_eq!(ci.log_calls.get(), 0);
    }

    #[test]
    fn failure_fetches_log_tail_once() {
        let ci = FakeCi::with_run("completed", Some("failure"));
        let report = WorkflowMonitor::new(&ci, 50).check("docker-publish.yml").unwrap();

        let RunState::Failed {
            log_tail: Some(log_tail),
            log_error: None,
        } = &report.state
        else {
            panic!("expected failure with log, got {:?}", report.state);
        };
        assert_eq!(log_tail.lines().count(), 50);
        assert!(log_tail.starts_with("line 31"));
        assert!(log_tail.ends_with("line 80"));
        assert_eq!(ci.list_calls.get(), 1);
        assert_eq!(ci.log_calls.get(), 1);
    }

    #[test]
    fn failed_run_stays_failed_when_log_is_unavailable() {
        let ci = FakeCi {
            log_unavailable: true,
            ..FakeCi::with_run("completed", Some("failure"))
        };
        let report = WorkflowMonitor::new(&ci, 50).check("docker-publish.yml").unwrap();

        assert!(report.state.is_failure());
        assert_eq!(
            report.state,
            RunState::Failed {
                log_tail: None,
                log_error: Some("Unexpected error".to_string()),
            }
        );
        assert_eq!(ci.log_calls.get(), 1);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["state"], "failed");
        assert_eq!(value["logError"], "Unexpected error");
        assert!(value.get("logTail").is_none());
    }

    #[test]
    fn classifies_non_failing_states_without_logs() {
        let cases = [
            ("in_progress", None, RunState::Running),
            ("queued", None, RunState::Queued),
            ("completed", Some("success"), RunState::Succeeded),
            ("completed", Some("cancelled"), RunState::Cancelled),
            (
                "completed",
                Some("startup_failure"),
                RunState::Unknown {
                    raw: "startup_failure".to_string(),
                },
            ),
        ];

        for (status, conclusion, expected) in cases {
            let ci = FakeCi::with_run(status, conclusion);
            let report = WorkflowMonitor::new(&ci, 50).check("ci.yml").unwrap();
            assert_eq!(report.state, expected);
            assert!(!report.state.is_failure());
            assert_eq!(ci.log_calls.get(), 0);
        }
    }

    #[test]
    fn parses_gh_run_list_json() {
        let json = r#"[{"conclusion":"","createdAt":"2026-10-17T08:00:00Z","databaseId":123,"displayTitle":"Bump","headBranch":"main","status":"in_progress"}]"#;
        let runs: Vec<RunSummary> = serde_json::from_str(json).unwrap();
        assert_eq!(runs[0].id, 123);
        assert_eq!(runs[0].branch, "main");
        assert_eq!(runs[0].title, "Bump");
    }

    #[test]
    fn report_serializes_state_inline() {
        let ci = FakeCi::with_run("completed", Some("success"));
        let report = WorkflowMonitor::new(&ci, 50).check("ci.yml").unwrap();
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["state"], "succeeded");
        assert_eq!(value["run"]["databaseId"], 42);
    }

    #[test]
    fn failed_state_uses_camel_case_keys() {
        let ci = FakeCi::with_run("completed", Some("failure"));
        let report = WorkflowMonitor::new(&ci, 2).check("ci.yml").unwrap();
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["logTail"], "line 79\nline 80");
        assert!(value.get("log_tail").is_none());
    }
}
