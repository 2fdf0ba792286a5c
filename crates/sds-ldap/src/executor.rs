//! Query execution against the Spine Directory Service.
//!
//! [`SdsQueryExecutor`] ties the pieces together for one query:
//!
//! 1. open a connection (provisioning a client identity first when mutual
//!    TLS is on)
//! 2. run the subtree search and fold the entries into an attribute map
//! 3. close the connection, whatever the outcome
//! 4. map the attributes onto the caller's type
//! 5. write one audit record
//!
//! The elapsed time in the audit record covers steps 1 to 4.
//!
//! Failures are logged with their class and the query parameters, then
//! returned unchanged. Nothing is retried, and failed queries produce no
//! audit record.

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::Value;
use sds_core::{AuditRecord, AuditSink, SdsError, SdsQuery, SdsResult, SdsSettings, SpineConfig};
use tracing::instrument;

use crate::connection::{ConnectionSettings, DirectoryConnection, DirectoryConnector};
use crate::mapper::{from_document, to_document};
use crate::search::{search, SearchRequest};

/// Per-call context supplied by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryContext {
    /// Session the query is made for, recorded in the audit trail.
    pub session_id: Option<i32>,
}

impl QueryContext {
    /// A context without a session.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { session_id: None }
    }

    /// A context for the given session.
    #[must_use]
    pub const fn for_session(session_id: i32) -> Self {
        Self {
            session_id: Some(session_id),
        }
    }
}

/// Runs typed directory queries.
///
/// Cheap to share behind an `Arc`; every call opens its own connection, so
/// concurrent queries never share transport state.
pub struct SdsQueryExecutor {
    config: Arc<SpineConfig>,
    settings: ConnectionSettings,
    connector: Arc<dyn DirectoryConnector>,
    audit: Arc<dyn AuditSink>,
    queries: Vec<SdsQuery>,
}

impl std::fmt::Debug for SdsQueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdsQueryExecutor")
            .field("config", &self.config)
            .field("queries", &self.queries.len())
            .finish_non_exhaustive()
    }
}

impl SdsQueryExecutor {
    /// Creates an executor.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(
        config: SpineConfig,
        connector: Arc<dyn DirectoryConnector>,
        audit: Arc<dyn AuditSink>,
    ) -> SdsResult<Self> {
        config.validate()?;

        let settings = ConnectionSettings::from_config(&config);
        Ok(Self {
            config: Arc::new(config),
            settings,
            connector,
            audit,
            queries: Vec::new(),
        })
    }

    /// Creates an executor from a settings file, including its named queries.
    pub fn from_settings(
        settings: &SdsSettings,
        connector: Arc<dyn DirectoryConnector>,
        audit: Arc<dyn AuditSink>,
    ) -> SdsResult<Self> {
        Ok(Self::new(settings.spine.clone(), connector, audit)?
            .with_queries(settings.sds_queries.iter().cloned()))
    }

    /// Registers named queries.
    #[must_use]
    pub fn with_queries(mut self, queries: impl IntoIterator<Item = SdsQuery>) -> Self {
        self.queries.extend(queries);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SpineConfig {
        &self.config
    }

    /// Returns a named query.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&SdsQuery> {
        self.queries.iter().find(|q| q.query_name == name)
    }

    /// Runs a subtree search and maps the collected attributes onto `T`.
    ///
    /// Returns `None` when the search found nothing.
    ///
    /// ## Errors
    ///
    /// Any connection, certificate, protocol or mapping failure, classified
    /// by [`SdsError::kind`].
    #[instrument(
        skip(self, ctx, attributes),
        fields(host = %self.config.host, port = self.config.port, session_id = ?ctx.session_id)
    )]
    pub async fn execute_query<T: DeserializeOwned>(
        &self,
        ctx: &QueryContext,
        search_base: &str,
        filter: &str,
        attributes: Option<&[&str]>,
    ) -> SdsResult<Option<T>> {
        let mut request =
            SearchRequest::new(search_base, filter).with_batch_size(self.config.batch_size);
        if let Some(attributes) = attributes {
            request = request.with_attributes(attributes.iter().copied());
        }

        self.run(ctx, &request).await
    }

    /// Runs a named query with its `{placeholder}` parameters filled in.
    ///
    /// ## Errors
    ///
    /// A configuration error when the query is unknown or a placeholder is
    /// left unresolved, otherwise as [`execute_query`](Self::execute_query).
    #[instrument(
        skip(self, ctx, params),
        fields(host = %self.config.host, port = self.config.port, session_id = ?ctx.session_id)
    )]
    pub async fn execute_named_query<T: DeserializeOwned>(
        &self,
        ctx: &QueryContext,
        name: &str,
        params: &[(&str, &str)],
    ) -> SdsResult<Option<T>> {
        let query = self
            .query(name)
            .ok_or_else(|| SdsError::config(format!("unknown SDS query: {name}")))?;
        let filter = query.render(params)?;

        let mut request =
            SearchRequest::new(&query.search_base, filter).with_batch_size(self.config.batch_size);
        if let Some(attributes) = &query.query_attributes {
            request = request.with_attributes(attributes.iter().cloned());
        }

        self.run(ctx, &request).await
    }

    /// Opens a connection, reads the root DSE and closes it again.
    pub async fn test_connection(&self) -> SdsResult<()> {
        let started = Instant::now();

        let result = async {
            let mut conn = self.connector.open(&self.settings).await?;
            let probed = conn.probe().await;
            self.close(conn.as_mut()).await;
            probed
        }
        .await;

        match &result {
            Ok(()) => tracing::info!(
                host = %self.config.host,
                port = self.config.port,
                elapsed_ms = elapsed_ms(started),
                "Directory connection check succeeded"
            ),
            Err(err) => tracing::error!(
                kind = %err.kind(),
                host = %self.config.host,
                port = self.config.port,
                error = %err,
                "Directory connection check failed"
            ),
        }

        result
    }

    async fn run<T: DeserializeOwned>(
        &self,
        ctx: &QueryContext,
        request: &SearchRequest,
    ) -> SdsResult<Option<T>> {
        let started = Instant::now();

        match self.attempt::<T>(request).await {
            Ok(Some((value, payload))) => {
                let record = AuditRecord::new(
                    request.describe(),
                    payload,
                    elapsed_ms(started),
                    self.config.message_type_id,
                    ctx.session_id,
                );
                self.audit.record(record);
                Ok(Some(value))
            }
            Ok(None) => {
                tracing::debug!(
                    base = %request.search_base,
                    filter = %request.filter,
                    "Directory search returned no entries"
                );
                Ok(None)
            }
            Err(err) => {
                tracing::error!(
                    kind = %err.kind(),
                    host = %self.config.host,
                    port = self.config.port,
                    base = %request.search_base,
                    filter = %request.filter,
                    elapsed_ms = elapsed_ms(started),
                    error = %err,
                    "Directory query failed"
                );
                Err(err)
            }
        }
    }

    /// Connects, searches, closes and maps. Returns the value together with
    /// the serialized attribute document.
    async fn attempt<T: DeserializeOwned>(
        &self,
        request: &SearchRequest,
    ) -> SdsResult<Option<(T, String)>> {
        let mut conn = self.connector.open(&self.settings).await?;

        let searched = match self.config.search_timeout() {
            Some(deadline) => {
                match tokio::time::timeout(deadline, search(conn.as_mut(), request)).await {
                    Ok(result) => result,
                    Err(_) => Err(SdsError::SearchTimeout(deadline)),
                }
            }
            None => search(conn.as_mut(), request).await,
        };

        self.close(conn.as_mut()).await;

        let Some(map) = searched? else {
            return Ok(None);
        };

        let document = to_document(&map);
        let payload = Value::Object(document.clone()).to_string();
        let value = from_document::<T>(document)?;

        Ok(Some((value, payload)))
    }

    async fn close(&self, conn: &mut dyn DirectoryConnection) {
        if let Err(err) = conn.close().await {
            tracing::warn!(
                host = %self.config.host,
                port = self.config.port,
                error = %err,
                "Failed to close directory connection"
            );
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
