//! Classification of `ldap3` failures into the SDS error taxonomy.
//!
//! ## Security Note
//!
//! Server diagnostic text is passed through as-is; it never contains client
//! credentials because the directory is queried anonymously.

use std::io;
use std::time::Duration;

use sds_core::SdsError;

/// Classifies an `ldap3` error.
///
/// `deadline` is the timeout that was in force when the error was raised;
/// it is reported back when `ldap3` signals a timeout of its own.
#[must_use]
pub fn classify_ldap_error(err: ldap3::LdapError, deadline: Duration) -> SdsError {
    match err {
        ldap3::LdapError::LdapResult { result } => classify_result(&result),
        ldap3::LdapError::FilterParsing => SdsError::protocol(0, "malformed search filter"),
        ldap3::LdapError::Timeout { elapsed: _ } => SdsError::ConnectionTimeout(deadline),
        ldap3::LdapError::Io { source } => classify_io(&source, deadline),
        ldap3::LdapError::EndOfStream => {
            SdsError::transport("connection closed unexpectedly")
        }
        other => SdsError::unknown(format!("LDAP error: {other}")),
    }
}

/// Classifies a non-success LDAP result.
#[must_use]
pub fn classify_result(result: &ldap3::LdapResult) -> SdsError {
    let message = if result.text.is_empty() {
        format!("result code {}", result.rc)
    } else {
        result.text.clone()
    };
    SdsError::protocol(result.rc, message)
}

fn classify_io(source: &io::Error, deadline: Duration) -> SdsError {
    match source.kind() {
        io::ErrorKind::TimedOut => SdsError::ConnectionTimeout(deadline),
        _ => SdsError::transport(format!("I/O error: {source}")),
    }
}
