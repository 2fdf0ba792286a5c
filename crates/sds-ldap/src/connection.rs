//! Directory connection management.
//!
//! Every query opens its own connection and closes it when done. There is
//! no pool and no reuse; a connection is owned by exactly one in-flight
//! query.
//!
//! ## Security Requirements
//!
//! - Mutual TLS identities are provisioned before the socket is opened, so
//!   malformed material fails without touching the network
//! - Connections are anonymous; no bind credentials exist to leak

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use sds_core::{CertificateSource, SdsError, SdsResult, ServerCertPolicy, SpineConfig};
use tokio::task::JoinHandle;

use crate::certificate::CertificateBundle;
use crate::error::classify_ldap_error;
use crate::search::{DirectoryEntry, SearchRequest};
use crate::tls::mutual_tls_config;

/// How long `close` waits for the connection driver to wind down.
const DRIVER_SHUTDOWN: Duration = Duration::from_secs(1);

/// Transport parameters for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Directory host.
    pub host: String,
    /// Directory port.
    pub port: u16,
    /// Connect with LDAPS.
    pub use_ldaps: bool,
    /// Present a client certificate.
    pub use_mutual_auth: bool,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// What to do when server certificate validation fails.
    pub server_cert_policy: ServerCertPolicy,
}

impl ConnectionSettings {
    /// Derives connection settings from the service configuration.
    #[must_use]
    pub fn from_config(config: &SpineConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            use_ldaps: config.use_ldaps,
            use_mutual_auth: config.use_mutual_auth,
            connect_timeout: config.connect_timeout(),
            server_cert_policy: config.server_cert_policy,
        }
    }

    /// Returns the LDAP URL for these settings.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ldaps { "ldaps" } else { "ldap" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Lifecycle of a [`DirectoryConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not yet connected.
    Unopened,
    /// Transport established; searches may run.
    Connected,
    /// Closed; no further operations are possible.
    Closed,
}

/// Opens connections to the directory.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Opens a new connection.
    ///
    /// ## Errors
    ///
    /// - `CertificateFormat` when mutual TLS material cannot be used
    /// - `ConnectionTimeout` when the connect timeout elapses
    /// - `Transport` for socket and handshake failures
    async fn open(&self, settings: &ConnectionSettings) -> SdsResult<Box<dyn DirectoryConnection>>;
}

/// One open connection to the directory.
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Runs a subtree search, handing each returned entry to `on_entry`
    /// as it arrives. Returns the number of entries seen.
    async fn search(
        &mut self,
        request: &SearchRequest,
        on_entry: &mut (dyn FnMut(DirectoryEntry) + Send),
    ) -> SdsResult<usize>;

    /// Reads the root DSE to check the directory answers.
    async fn probe(&mut self) -> SdsResult<()>;

    /// Closes the connection. Closing twice is a no-op.
    async fn close(&mut self) -> SdsResult<()>;

    /// Returns the current lifecycle state.
    fn state(&self) -> ConnectionState;
}

// ============================================================================
// ldap3 Connector
// ============================================================================

/// Connects with `ldap3`.
#[derive(Clone, Default)]
pub struct Ldap3Connector {
    certificates: Option<Arc<dyn CertificateSource>>,
}

impl std::fmt::Debug for Ldap3Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ldap3Connector")
            .field("has_certificates", &self.certificates.is_some())
            .finish()
    }
}

impl Ldap3Connector {
    /// Creates a connector without client certificate material.
    ///
    /// Opening a mutually authenticated connection with it fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connector that provisions client identities from `source`.
    #[must_use]
    pub fn with_certificates(source: Arc<dyn CertificateSource>) -> Self {
        Self {
            certificates: Some(source),
        }
    }

    fn conn_settings(&self, settings: &ConnectionSettings) -> SdsResult<LdapConnSettings> {
        let conn_settings = LdapConnSettings::new().set_conn_timeout(settings.connect_timeout);

        if settings.use_mutual_auth {
            if !settings.use_ldaps {
                return Err(SdsError::config("mutual TLS requires LDAPS"));
            }

            let source = self.certificates.as_ref().ok_or_else(|| {
                SdsError::config("mutual TLS is enabled but no certificate source is configured")
            })?;
            let bundle = CertificateBundle::from_material(&source.load()?)?;

            tracing::debug!(
                subject = %bundle.subject(),
                fingerprint = %bundle.fingerprint(),
                "Provisioned client identity"
            );

            let tls = mutual_tls_config(&bundle, settings.server_cert_policy)?;
            return Ok(conn_settings.set_config(Arc::new(tls)));
        }

        if settings.use_ldaps && settings.server_cert_policy == ServerCertPolicy::AcceptWithWarning {
            tracing::warn!(
                host = %settings.host,
                "Server certificate verification disabled by policy"
            );
            return Ok(conn_settings.set_no_tls_verify(true));
        }

        Ok(conn_settings)
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    async fn open(&self, settings: &ConnectionSettings) -> SdsResult<Box<dyn DirectoryConnection>> {
        let conn_settings = self.conn_settings(settings)?;
        let url = settings.url();
        let deadline = settings.connect_timeout;

        tracing::debug!(%url, mutual_tls = settings.use_mutual_auth, "Connecting to directory");

        let (conn, ldap) =
            match tokio::time::timeout(deadline, LdapConnAsync::with_settings(conn_settings, &url)).await {
                Ok(result) => result.map_err(|e| classify_ldap_error(e, deadline))?,
                Err(_) => return Err(SdsError::ConnectionTimeout(deadline)),
            };

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!(error = %e, "Directory connection driver stopped");
            }
        });

        Ok(Box::new(Ldap3Connection {
            ldap,
            driver: Some(driver),
            state: ConnectionState::Connected,
            deadline,
        }))
    }
}

/// An `ldap3` connection and its driver task.
///
/// Dropping it without `close` aborts the driver, which tears down the
/// socket.
struct Ldap3Connection {
    ldap: Ldap,
    driver: Option<JoinHandle<()>>,
    state: ConnectionState,
    deadline: Duration,
}

impl Ldap3Connection {
    fn ensure_connected(&self) -> SdsResult<()> {
        match self.state {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Unopened | ConnectionState::Closed => {
                Err(SdsError::transport("connection is not open"))
            }
        }
    }
}

#[async_trait]
impl DirectoryConnection for Ldap3Connection {
    async fn search(
        &mut self,
        request: &SearchRequest,
        on_entry: &mut (dyn FnMut(DirectoryEntry) + Send),
    ) -> SdsResult<usize> {
        self.ensure_connected()?;
        let deadline = self.deadline;

        let attrs = request
            .attributes
            .clone()
            .unwrap_or_else(|| vec!["*".to_string()]);

        let mut adapters: Vec<Box<dyn Adapter<'_, String, Vec<String>>>> =
            vec![Box::new(EntriesOnly::new())];
        if request.batch_size > 0 {
            let page_size = i32::try_from(request.batch_size).unwrap_or(i32::MAX);
            adapters.push(Box::new(PagedResults::new(page_size)));
        }

        let mut stream = self
            .ldap
            .streaming_search_with(
                adapters,
                &request.search_base,
                Scope::Subtree,
                &request.filter,
                attrs,
            )
            .await
            .map_err(|e| classify_ldap_error(e, deadline))?;

        let mut count = 0;
        while let Some(entry) = stream
            .next()
            .await
            .map_err(|e| classify_ldap_error(e, deadline))?
        {
            on_entry(DirectoryEntry::from_search_entry(SearchEntry::construct(entry)));
            count += 1;
        }

        stream
            .finish()
            .await
            .success()
            .map_err(|e| classify_ldap_error(e, deadline))?;

        Ok(count)
    }

    async fn probe(&mut self) -> SdsResult<()> {
        self.ensure_connected()?;
        let deadline = self.deadline;

        self.ldap
            .search("", Scope::Base, "(objectClass=*)", vec!["1.1"])
            .await
            .map_err(|e| classify_ldap_error(e, deadline))?
            .success()
            .map_err(|e| classify_ldap_error(e, deadline))?;

        Ok(())
    }

    async fn close(&mut self) -> SdsResult<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closed;

        let unbind = self.ldap.unbind().await;

        if let Some(driver) = self.driver.take() {
            let abort = driver.abort_handle();
            if tokio::time::timeout(DRIVER_SHUTDOWN, driver).await.is_err() {
                abort.abort();
            }
        }

        unbind.map_err(|e| classify_ldap_error(e, self.deadline))
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

impl Drop for Ldap3Connection {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}
