//! Command implementations.

pub mod cert;
pub mod check;
pub mod named;
pub mod query;

use std::sync::Arc;

use sds_core::{SdsSettings, TracingAuditSink};
use sds_ldap::{Ldap3Connector, SdsQueryExecutor};

pub use cert::run_cert;
pub use check::run_check;
pub use named::run_named;
pub use query::run_query;

/// Builds an `ldap3`-backed executor for the loaded settings.
///
/// Client certificates are read from the configured files each time a
/// mutually authenticated connection is opened.
pub fn build_executor(settings: &SdsSettings) -> crate::CliResult<SdsQueryExecutor> {
    let connector = match &settings.certificates {
        Some(paths) => Ldap3Connector::with_certificates(Arc::new(paths.clone())),
        None => Ldap3Connector::new(),
    };

    Ok(SdsQueryExecutor::from_settings(
        settings,
        Arc::new(connector),
        Arc::new(TracingAuditSink),
    )?)
}
