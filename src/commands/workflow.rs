use clap::Args;
use serde::Serialize;

use posctl::error::Error;
use posctl::workflow::{GhCli, RunDetail, RunState, WorkflowMonitor, WorkflowReport};

use super::CmdResult;

#[derive(Args)]
pub struct WorkflowArgs {
    /// Workflow file name (default from config)
    pub name: Option<String>,

    /// Show one run by id instead of the latest run's status
    #[arg(long, value_name = "ID", conflicts_with = "name")]
    pub run: Option<u64>,
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum WorkflowOutput {
    #[serde(rename = "workflow.status")]
    Status(WorkflowReport),
    #[serde(rename = "workflow.run")]
    Run(RunDetail),
}

pub fn run(args: WorkflowArgs, global: &super::GlobalArgs) -> CmdResult<WorkflowOutput> {
    let project = global.project()?;
    let config = &project.config.workflow;
    let monitor = WorkflowMonitor::new(
        GhCli {
            program: config.gh_command.clone(),
        },
        config.log_tail,
    );

    if let Some(id) = args.run {
        return Ok((WorkflowOutput::Run(monitor.detail(id)?), 0));
    }

    let name = args.name.unwrap_or_else(|| config.default.clone());
    let report = monitor.check(&name)?;
    into_result(report).map(|report| (WorkflowOutput::Status(report), 0))
}

/// No runs and failed runs are reported as errors so the command exits non-zero.
fn into_result(report: WorkflowReport) -> posctl::Result<WorkflowReport> {
    match report.state {
        RunState::NoRunsFound => Err(Error::workflow_no_runs(report.workflow)),
        RunState::Failed { .. } => {
            let details = serde_json::to_value(&report).map_err(|e| {
                Error::internal_json(e.to_string(), Some("serialize report".to_string()))
            })?;
            Err(Error::workflow_run_failed(details))
        }
        _ => Ok(report),
    }
}
