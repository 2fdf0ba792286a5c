//! Connectivity check command.

use sds_core::{ServerCertPolicy, SpineConfig};
use sds_ldap::SdsQueryExecutor;

use crate::output::{success, warning};

/// Runs `sds check`.
pub async fn run_check(executor: &SdsQueryExecutor) -> crate::CliResult<()> {
    let config = executor.config();
    if let Some(notice) = policy_notice(config) {
        warning(&notice);
    }

    executor.test_connection().await?;

    success(&format!(
        "Directory {}:{} is reachable (LDAPS: {}, mutual TLS: {})",
        config.host, config.port, config.use_ldaps, config.use_mutual_auth
    ));
    Ok(())
}

/// Notice shown when server certificate failures are only logged.
fn policy_notice(config: &SpineConfig) -> Option<String> {
    (config.use_ldaps && config.server_cert_policy == ServerCertPolicy::AcceptWithWarning).then(
        || {
            format!(
                "Server certificate validation failures for {} are accepted with a warning",
                config.host
            )
        },
    )
}
