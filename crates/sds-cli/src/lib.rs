//! # sds-cli
//!
//! Command-line tool for the Spine Directory Service query client.
//!
//! This crate provides:
//! - Ad hoc subtree searches (`sds query`)
//! - Named queries from the settings file (`sds named`)
//! - Certificate inspection and key checks (`sds cert inspect`)
//! - A connectivity check (`sds check`)

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![allow(clippy::uninlined_format_args)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::Cli;
pub use error::{CliError, CliResult};
