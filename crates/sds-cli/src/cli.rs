//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::OutputFormat;

/// SDS CLI - query the Spine Directory Service.
#[derive(Debug, Parser)]
#[command(name = "sds")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file.
    #[arg(short, long, env = "SDS_CONFIG", default_value = "sds.toml")]
    pub config: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Session id recorded in the audit trail.
    #[arg(long, env = "SDS_SESSION_ID")]
    pub session_id: Option<i32>,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run an ad hoc subtree search.
    Query(QueryArgs),

    /// Run a named query from the settings file.
    Named(NamedArgs),

    /// Certificate utilities.
    #[command(subcommand)]
    Cert(CertCommand),

    /// Check that the directory answers.
    Check,
}

/// Arguments for `sds query`.
#[derive(Debug, clap::Args)]
pub struct QueryArgs {
    /// Search base DN.
    #[arg(short, long)]
    pub base: String,

    /// LDAP filter.
    #[arg(short, long)]
    pub filter: String,

    /// Attributes to return (comma-separated); all when omitted.
    #[arg(short, long, value_delimiter = ',')]
    pub attributes: Option<Vec<String>>,
}

/// Arguments for `sds named`.
#[derive(Debug, clap::Args)]
pub struct NamedArgs {
    /// Query name.
    pub name: String,

    /// Placeholder value as `name=value`; repeat for several.
    #[arg(short, long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,
}

/// Certificate commands.
#[derive(Debug, Subcommand)]
pub enum CertCommand {
    /// Show certificate details and check the key matches.
    ///
    /// Without file arguments the paths from the settings file are used.
    Inspect {
        /// Client certificate file.
        #[arg(long)]
        cert: Option<PathBuf>,

        /// Client private key file.
        #[arg(long)]
        key: Option<PathBuf>,

        /// Server CA chain file.
        #[arg(long)]
        chain: Option<PathBuf>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))?;
    if name.is_empty() {
        return Err(format!("parameter name is empty in {raw:?}"));
    }
    Ok((name.to_string(), value.to_string()))
}
