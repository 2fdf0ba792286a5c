//! Certificate commands.

use std::path::{Path, PathBuf};

use sds_core::{CertificatePaths, CertificateSource};
use sds_ldap::{describe_certificates, CertificateBundle, CertificateSummary};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::CertCommand;
use crate::config::{load_settings, OutputFormat};
use crate::output::{output, success};
use crate::CliError;

/// One certificate in the inspected material.
#[derive(Debug, Tabled, Serialize)]
pub struct CertificateRow {
    /// Where the certificate came from.
    #[tabled(rename = "Role")]
    pub role: String,
    /// Subject DN.
    #[tabled(rename = "Subject")]
    pub subject: String,
    /// Issuer DN.
    #[tabled(rename = "Issuer")]
    pub issuer: String,
    /// Start of validity.
    #[tabled(rename = "Not Before")]
    pub not_before: String,
    /// End of validity.
    #[tabled(rename = "Not After")]
    pub not_after: String,
    /// SHA-256 fingerprint.
    #[tabled(rename = "SHA-256")]
    pub fingerprint: String,
}

impl CertificateRow {
    fn new(role: &str, summary: CertificateSummary) -> Self {
        Self {
            role: role.to_string(),
            subject: summary.subject,
            issuer: summary.issuer,
            not_before: summary.not_before,
            not_after: summary.not_after,
            fingerprint: summary.fingerprint,
        }
    }
}

/// Runs a certificate command.
pub fn run_cert(cmd: CertCommand, config_path: &Path, format: OutputFormat) -> crate::CliResult<()> {
    match cmd {
        CertCommand::Inspect { cert, key, chain } => {
            let paths = resolve_paths(cert, key, chain, config_path)?;
            inspect(&paths, format)
        }
    }
}

/// Uses the given files, falling back to the settings file for any not given.
fn resolve_paths(
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    chain: Option<PathBuf>,
    config_path: &Path,
) -> crate::CliResult<CertificatePaths> {
    if let (Some(client_cert), Some(client_private_key), Some(server_ca_certchain)) =
        (cert.clone(), key.clone(), chain.clone())
    {
        return Ok(CertificatePaths {
            client_cert,
            client_private_key,
            server_ca_certchain,
        });
    }

    let configured = load_settings(config_path)?.certificates.ok_or_else(|| {
        CliError::Config(
            "settings have no [certificates] section; pass --cert, --key and --chain".to_string(),
        )
    })?;

    Ok(CertificatePaths {
        client_cert: cert.unwrap_or(configured.client_cert),
        client_private_key: key.unwrap_or(configured.client_private_key),
        server_ca_certchain: chain.unwrap_or(configured.server_ca_certchain),
    })
}

fn inspect(paths: &CertificatePaths, format: OutputFormat) -> crate::CliResult<()> {
    let material = paths.load()?;

    let mut rows = Vec::new();
    for summary in describe_certificates(&material.client_cert)? {
        rows.push(CertificateRow::new("client", summary));
    }
    for summary in describe_certificates(&material.server_ca_certchain)? {
        rows.push(CertificateRow::new("server CA", summary));
    }

    // Fails on a key that does not belong to the client certificate.
    let bundle = CertificateBundle::from_material(&material)?;

    output(&rows, format)?;
    if matches!(format, OutputFormat::Table) {
        success(&format!(
            "Private key ({:?}) matches client certificate {}",
            bundle.key_format(),
            bundle.subject()
        ));
    }
    Ok(())
}
