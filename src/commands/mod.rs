use std::path::PathBuf;

use posctl::config::Project;
use posctl::service::ServiceName;

pub type CmdResult<T> = posctl::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    /// Project root, already expanded.
    pub root: PathBuf,
}

impl GlobalArgs {
    pub fn project(&self) -> posctl::Result<Project> {
        Project::load(&self.root)
    }
}

/// One named service, or all of them when none is given.
pub(crate) fn select_services(service: Option<&str>) -> posctl::Result<Vec<ServiceName>> {
    match service {
        Some(name) => Ok(vec![name.parse()?]),
        None => Ok(ServiceName::ALL.to_vec()),
    }
}

pub mod digest;
pub mod distribute;
pub mod release;
pub mod status;
pub mod version;
pub mod workflow;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (posctl::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Release(args) => dispatch!(args, global, release),
        crate::Commands::Distribute(args) => dispatch!(args, global, distribute),
        crate::Commands::Digest(args) => dispatch!(args, global, digest),
        crate::Commands::Status(args) => dispatch!(args, global, status),
        crate::Commands::Workflow(args) => dispatch!(args, global, workflow),
        crate::Commands::Version(args) => dispatch!(args, global, version),
    }
}
