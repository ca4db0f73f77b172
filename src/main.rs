use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{digest, distribute, release, status, version, workflow, GlobalArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "posctl")]
#[command(version = VERSION)]
#[command(about = "Release, distribution and image pinning for the POS services")]
struct Cli {
    /// Project root containing posctl.json
    #[arg(long, global = true, default_value = ".")]
    root: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bump the shared library version and build its artifact
    Release(release::ReleaseArgs),
    /// Copy the built artifact into service directories
    Distribute(distribute::DistributeArgs),
    /// Pin manifest images to registry digests, or revert to the tag
    Digest(digest::DigestArgs),
    /// Show how each service image is referenced in the manifest
    Status(status::StatusArgs),
    /// Report the latest run of a CI workflow
    Workflow(workflow::WorkflowArgs),
    /// Show the shared library version
    Version(version::VersionArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let global = match posctl::config::expand_root(&cli.root) {
        Ok(root) => GlobalArgs { root },
        Err(err) => {
            let exit_code = err.code.exit_code();
            output::print_json_result(Err(err));
            return std::process::ExitCode::from(exit_code_to_u8(exit_code));
        }
    };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    code.clamp(0, 255) as u8
}
