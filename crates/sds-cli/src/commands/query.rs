//! Ad hoc query command.

use std::collections::BTreeMap;

use sds_ldap::{QueryContext, SdsQueryExecutor};

use crate::cli::QueryArgs;
use crate::config::OutputFormat;
use crate::output::output_attributes;

/// Runs `sds query`.
pub async fn run_query(
    args: QueryArgs,
    executor: &SdsQueryExecutor,
    ctx: &QueryContext,
    format: OutputFormat,
) -> crate::CliResult<()> {
    let attributes: Option<Vec<&str>> = args
        .attributes
        .as_ref()
        .map(|attrs| attrs.iter().map(String::as_str).collect());

    let result: Option<BTreeMap<String, String>> = executor
        .execute_query(ctx, &args.base, &args.filter, attributes.as_deref())
        .await?;

    output_attributes(result.as_ref(), format)
}
