//! idsync - reconcile Google Workspace users and groups into an AWS IAM
//! Identity Center store over SCIM.
//!
//! The binary parses [`config::Cli`], validates it into a
//! [`config::SyncConfig`], runs one pass through [`runner::run`] and maps the
//! result to an exit code via [`error::AppError::exit_code`].

pub mod config;
pub mod error;
pub mod logging;
pub mod runner;

pub use config::{Cli, OutputFormat, SyncConfig};
pub use error::{AppError, AppResult};
