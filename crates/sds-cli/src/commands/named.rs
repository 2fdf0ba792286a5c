//! Named query command.

use std::collections::BTreeMap;

use sds_ldap::{QueryContext, SdsQueryExecutor};

use crate::cli::NamedArgs;
use crate::config::OutputFormat;
use crate::output::output_attributes;
use crate::CliError;

/// Runs `sds named`.
pub async fn run_named(
    args: NamedArgs,
    executor: &SdsQueryExecutor,
    ctx: &QueryContext,
    format: OutputFormat,
) -> crate::CliResult<()> {
    if executor.query(&args.name).is_none() {
        return Err(CliError::InvalidArgument(format!(
            "no query named {} in the settings file",
            args.name
        )));
    }

    let params: Vec<(&str, &str)> = args
        .params
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();

    let result: Option<BTreeMap<String, String>> = executor
        .execute_named_query(ctx, &args.name, &params)
        .await?;

    output_attributes(result.as_ref(), format)
}
