//! Spine Directory Service configuration.
//!
//! Configuration comes from a TOML file with optional `SPINE_*` environment
//! overrides. Key names in the `[spine]` table follow the names the
//! directory settings have always been stored under (`sds_hostname`,
//! `sds_port`, ...).
//!
//! Certificate material is not part of the file. It is fetched through a
//! [`CertificateSource`] each time a mutually authenticated connection is
//! opened.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audit::SPINE_LDAP_QUERY_MESSAGE_TYPE;
use crate::error::{SdsError, SdsResult};

// ============================================================================
// Server Certificate Policy
// ============================================================================

/// What to do when the server certificate fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerCertPolicy {
    /// Abort the handshake.
    #[default]
    Reject,

    /// Log the validation errors and continue.
    ///
    /// Only for test environments whose directory presents a certificate
    /// the configured CA chain cannot validate.
    AcceptWithWarning,
}

impl std::str::FromStr for ServerCertPolicy {
    type Err = SdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "accept_with_warning" => Ok(Self::AcceptWithWarning),
            other => Err(SdsError::config(format!(
                "unknown server certificate policy: {other:?}"
            ))),
        }
    }
}

// ============================================================================
// Spine Configuration
// ============================================================================

/// Connection settings for the Spine Directory Service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpineConfig {
    /// Directory host name.
    #[serde(rename = "sds_hostname")]
    pub host: String,

    /// Directory port.
    #[serde(rename = "sds_port")]
    pub port: u16,

    /// Connect with LDAPS.
    #[serde(rename = "sds_use_ldaps", default)]
    pub use_ldaps: bool,

    /// Present a client certificate during the handshake.
    #[serde(rename = "sds_use_mutualauth", default)]
    pub use_mutual_auth: bool,

    /// Connect timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Entries per page; 0 lets the server decide.
    #[serde(rename = "sds_batch_size", default)]
    pub batch_size: u32,

    /// Deadline for the search phase in seconds; unset means no deadline.
    #[serde(default)]
    pub search_timeout_seconds: Option<u64>,

    /// Server certificate validation policy.
    #[serde(default)]
    pub server_cert_policy: ServerCertPolicy,

    /// Message type id written to audit records.
    #[serde(default = "default_message_type_id")]
    pub message_type_id: i32,
}

const fn default_timeout_seconds() -> u64 {
    30
}

const fn default_message_type_id() -> i32 {
    SPINE_LDAP_QUERY_MESSAGE_TYPE
}

impl SpineConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> SpineConfigBuilder {
        SpineConfigBuilder::new()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SdsResult<()> {
        if self.host.trim().is_empty() {
            return Err(SdsError::config("sds_hostname cannot be empty"));
        }

        if self.port == 0 {
            return Err(SdsError::config("sds_port must be greater than zero"));
        }

        if self.timeout_seconds == 0 {
            return Err(SdsError::config("timeout_seconds must be greater than zero"));
        }

        if self.search_timeout_seconds == Some(0) {
            return Err(SdsError::config(
                "search_timeout_seconds must be greater than zero when set",
            ));
        }

        // A client certificate can only be presented over TLS.
        if self.use_mutual_auth && !self.use_ldaps {
            return Err(SdsError::config(
                "sds_use_mutualauth requires sds_use_ldaps",
            ));
        }

        Ok(())
    }

    /// Returns the connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Returns the search deadline, if one is configured.
    #[must_use]
    pub fn search_timeout(&self) -> Option<Duration> {
        self.search_timeout_seconds.map(Duration::from_secs)
    }

    /// Applies `SPINE_*` overrides from the process environment.
    pub fn apply_process_env(&mut self) -> SdsResult<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Applies `SPINE_*` overrides using the given lookup.
    ///
    /// Recognised keys: `SPINE_SDS_HOSTNAME`, `SPINE_SDS_PORT`,
    /// `SPINE_SDS_USE_LDAPS`, `SPINE_SDS_USE_MUTUALAUTH`,
    /// `SPINE_TIMEOUT_SECONDS`, `SPINE_SDS_BATCH_SIZE`,
    /// `SPINE_SEARCH_TIMEOUT_SECONDS`, `SPINE_SERVER_CERT_POLICY`.
    ///
    /// The result is validated again afterwards.
    pub fn apply_env<F>(&mut self, lookup: F) -> SdsResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SPINE_SDS_HOSTNAME") {
            self.host = host;
        }
        if let Some(port) = lookup("SPINE_SDS_PORT") {
            self.port = parse_env("SPINE_SDS_PORT", &port)?;
        }
        if let Some(flag) = lookup("SPINE_SDS_USE_LDAPS") {
            self.use_ldaps = parse_env("SPINE_SDS_USE_LDAPS", &flag)?;
        }
        if let Some(flag) = lookup("SPINE_SDS_USE_MUTUALAUTH") {
            self.use_mutual_auth = parse_env("SPINE_SDS_USE_MUTUALAUTH", &flag)?;
        }
        if let Some(timeout) = lookup("SPINE_TIMEOUT_SECONDS") {
            self.timeout_seconds = parse_env("SPINE_TIMEOUT_SECONDS", &timeout)?;
        }
        if let Some(batch) = lookup("SPINE_SDS_BATCH_SIZE") {
            self.batch_size = parse_env("SPINE_SDS_BATCH_SIZE", &batch)?;
        }
        if let Some(deadline) = lookup("SPINE_SEARCH_TIMEOUT_SECONDS") {
            self.search_timeout_seconds =
                Some(parse_env("SPINE_SEARCH_TIMEOUT_SECONDS", &deadline)?);
        }
        if let Some(policy) = lookup("SPINE_SERVER_CERT_POLICY") {
            self.server_cert_policy = policy.parse()?;
        }
        self.validate()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> SdsResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SdsError::config(format!("{key} has an invalid value: {value:?}")))
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for [`SpineConfig`].
#[derive(Debug)]
pub struct SpineConfigBuilder {
    host: Option<String>,
    port: u16,
    use_ldaps: bool,
    use_mutual_auth: bool,
    timeout_seconds: u64,
    batch_size: u32,
    search_timeout_seconds: Option<u64>,
    server_cert_policy: ServerCertPolicy,
    message_type_id: i32,
}

impl Default for SpineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SpineConfigBuilder {
    /// Creates a new builder with defaults (LDAPS on port 636).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            host: None,
            port: 636,
            use_ldaps: true,
            use_mutual_auth: false,
            timeout_seconds: default_timeout_seconds(),
            batch_size: 0,
            search_timeout_seconds: None,
            server_cert_policy: ServerCertPolicy::Reject,
            message_type_id: default_message_type_id(),
        }
    }

    /// Sets the directory host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the directory port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enables or disables LDAPS.
    #[must_use]
    pub const fn use_ldaps(mut self, enabled: bool) -> Self {
        self.use_ldaps = enabled;
        self
    }

    /// Enables or disables mutual TLS.
    #[must_use]
    pub const fn use_mutual_auth(mut self, enabled: bool) -> Self {
        self.use_mutual_auth = enabled;
        self
    }

    /// Sets the connect timeout in seconds.
    #[must_use]
    pub const fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the paging batch size.
    #[must_use]
    pub const fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the search-phase deadline in seconds.
    #[must_use]
    pub const fn search_timeout_seconds(mut self, seconds: u64) -> Self {
        self.search_timeout_seconds = Some(seconds);
        self
    }

    /// Sets the server certificate policy.
    #[must_use]
    pub const fn server_cert_policy(mut self, policy: ServerCertPolicy) -> Self {
        self.server_cert_policy = policy;
        self
    }

    /// Sets the audit message type id.
    #[must_use]
    pub const fn message_type_id(mut self, id: i32) -> Self {
        self.message_type_id = id;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if the host is missing or validation fails.
    pub fn build(self) -> SdsResult<SpineConfig> {
        let config = SpineConfig {
            host: self
                .host
                .ok_or_else(|| SdsError::config("sds_hostname is required"))?,
            port: self.port,
            use_ldaps: self.use_ldaps,
            use_mutual_auth: self.use_mutual_auth,
            timeout_seconds: self.timeout_seconds,
            batch_size: self.batch_size,
            search_timeout_seconds: self.search_timeout_seconds,
            server_cert_policy: self.server_cert_policy,
            message_type_id: self.message_type_id,
        };

        config.validate()?;

        Ok(config)
    }
}

// ============================================================================
// Named Queries
// ============================================================================

/// A named directory query with `{placeholder}` parameters in its filter.
///
/// ```
/// use sds_core::SdsQuery;
///
/// let query = SdsQuery {
///     query_name: "GetOrganisationDetailsByOdsCode".into(),
///     search_base: "ou=organisations, o=nhs".into(),
///     query_text: "(nhsIDCode={odsCode})".into(),
///     query_attributes: Some(vec!["nhsIDCode".into(), "o".into()]),
/// };
/// let filter = query.render(&[("odsCode", "A2*")]).unwrap();
/// assert_eq!(filter, "(nhsIDCode=A2\\2a)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdsQuery {
    /// Query name used to look it up.
    pub query_name: String,

    /// Search base DN.
    pub search_base: String,

    /// Filter template.
    pub query_text: String,

    /// Attributes to request; `None` requests all.
    #[serde(default)]
    pub query_attributes: Option<Vec<String>>,
}

impl SdsQuery {
    /// Renders the filter, substituting escaped parameter values.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if a placeholder is left unresolved.
    pub fn render(&self, params: &[(&str, &str)]) -> SdsResult<String> {
        let mut filter = self.query_text.clone();
        for (name, value) in params {
            filter = filter.replace(&format!("{{{name}}}"), &ldap_escape(value));
        }

        if let Some(start) = filter.find('{') {
            let rest = &filter[start..];
            let end = rest.find('}').map_or(rest.len(), |i| i + 1);
            return Err(SdsError::config(format!(
                "query {} has an unresolved placeholder {}",
                self.query_name,
                &rest[..end]
            )));
        }

        Ok(filter)
    }
}

/// Escapes special characters in LDAP filter values (RFC 4515).
#[must_use]
pub fn ldap_escape(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\5c"),
            '*' => result.push_str("\\2a"),
            '(' => result.push_str("\\28"),
            ')' => result.push_str("\\29"),
            '\0' => result.push_str("\\00"),
            // Braces delimit placeholders in query templates.
            '{' => result.push_str("\\7b"),
            '}' => result.push_str("\\7d"),
            _ => result.push(c),
        }
    }
    result
}

// ============================================================================
// Certificate Material
// ============================================================================

/// Client certificate, private key and server CA chain, as stored.
#[derive(Clone, Default)]
pub struct CertificateMaterial {
    /// Client certificate (PEM, or DER).
    pub client_cert: Vec<u8>,

    /// Client private key (PEM, or DER).
    pub client_private_key: Vec<u8>,

    /// Server CA chain (PEM, possibly several certificates).
    pub server_ca_certchain: Vec<u8>,
}

impl std::fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("client_cert_len", &self.client_cert.len())
            .field("client_private_key", &"<redacted>")
            .field("server_ca_certchain_len", &self.server_ca_certchain.len())
            .finish()
    }
}

/// Supplies certificate material on demand.
///
/// Called once per mutually authenticated connection, so rotating the
/// stored material takes effect on the next query.
pub trait CertificateSource: Send + Sync {
    /// Loads the current certificate material.
    fn load(&self) -> SdsResult<CertificateMaterial>;
}

impl CertificateSource for CertificateMaterial {
    fn load(&self) -> SdsResult<CertificateMaterial> {
        Ok(self.clone())
    }
}

/// Paths to PEM files holding certificate material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePaths {
    /// Client certificate file.
    pub client_cert: PathBuf,

    /// Client private key file.
    pub client_private_key: PathBuf,

    /// Server CA chain file.
    pub server_ca_certchain: PathBuf,
}

impl CertificateSource for CertificatePaths {
    fn load(&self) -> SdsResult<CertificateMaterial> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|e| {
                SdsError::config(format!("cannot read {}: {e}", path.display()))
            })
        };

        Ok(CertificateMaterial {
            client_cert: read(&self.client_cert)?,
            client_private_key: read(&self.client_private_key)?,
            server_ca_certchain: read(&self.server_ca_certchain)?,
        })
    }
}

// ============================================================================
// Settings File
// ============================================================================

/// Contents of an SDS settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdsSettings {
    /// Directory connection settings.
    pub spine: SpineConfig,

    /// Named queries.
    #[serde(default)]
    pub sds_queries: Vec<SdsQuery>,

    /// Certificate files, when mutual TLS material is kept on disk.
    #[serde(default)]
    pub certificates: Option<CertificatePaths>,
}

impl SdsSettings {
    /// Parses settings from TOML and validates them.
    pub fn from_toml_str(content: &str) -> SdsResult<Self> {
        let settings: Self = toml::from_str(content)
            .map_err(|e| SdsError::config(format!("failed to parse settings: {e}")))?;
        settings.spine.validate()?;
        Ok(settings)
    }

    /// Loads settings from a file, then applies environment overrides.
    pub fn load(path: &Path) -> SdsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SdsError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut settings = Self::from_toml_str(&content)?;
        settings.spine.apply_process_env()?;
        settings.spine.validate()?;
        Ok(settings)
    }

    /// Finds a named query.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&SdsQuery> {
        self.sds_queries.iter().find(|q| q.query_name == name)
    }
}
