pub mod build;
pub mod config;
pub mod digest_update;
pub mod distribute;
pub mod error;
pub mod image;
pub mod manifest;
pub mod output;
pub mod registry;
pub mod service;
pub mod version;
pub mod workflow;

pub use error::{Error, ErrorCode, Result};
pub use output::{BatchStatus, BatchSummary};
