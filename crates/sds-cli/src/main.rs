//! # SDS CLI
//!
//! Command-line tool for querying the Spine Directory Service.

#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use sds_cli::{
    cli::{Cli, Command},
    commands::{build_executor, run_cert, run_check, run_named, run_query},
    config::load_settings,
    output::error,
    CliResult,
};
use sds_ldap::QueryContext;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli).await.context("sds command failed") {
        error(&format!("{e:#}"));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> CliResult<()> {
    let ctx = QueryContext {
        session_id: cli.session_id,
    };

    match cli.command {
        Command::Cert(cmd) => run_cert(cmd, &cli.config, cli.output),
        Command::Query(args) => {
            let executor = build_executor(&load_settings(&cli.config)?)?;
            run_query(args, &executor, &ctx, cli.output).await
        }
        Command::Named(args) => {
            let executor = build_executor(&load_settings(&cli.config)?)?;
            run_named(args, &executor, &ctx, cli.output).await
        }
        Command::Check => {
            let executor = build_executor(&load_settings(&cli.config)?)?;
            run_check(&executor).await
        }
    }
}
