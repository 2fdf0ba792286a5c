//! Common test utilities and fixtures.

use std::sync::Arc;

use sds_core::{MemoryAuditSink, SpineConfig};
use sds_integration_tests::FakeDirectory;
use sds_ldap::{DirectoryEntry, SdsQueryExecutor};
use serde::Deserialize;

/// Result shape used across the query tests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersonRecord {
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub mail: String,
}

/// Executor wired to a fake directory and an in-memory audit sink.
pub struct TestEnv {
    pub directory: Arc<FakeDirectory>,
    pub audit: Arc<MemoryAuditSink>,
    pub executor: Arc<SdsQueryExecutor>,
}

impl TestEnv {
    /// Creates an environment with default settings.
    pub fn new(directory: FakeDirectory) -> anyhow::Result<Self> {
        Self::with_config(directory, config().build()?)
    }

    /// Creates an environment with the given settings.
    pub fn with_config(directory: FakeDirectory, config: SpineConfig) -> anyhow::Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("sds_ldap=debug,sds=info")
            .with_test_writer()
            .try_init();

        let directory = Arc::new(directory);
        let audit = Arc::new(MemoryAuditSink::new());
        let executor =
            SdsQueryExecutor::new(config, directory.clone(), audit.clone())?;

        Ok(Self {
            directory,
            audit,
            executor: Arc::new(executor),
        })
    }
}

/// Baseline settings for the fake directory.
pub fn config() -> sds_core::SpineConfigBuilder {
    SpineConfig::builder()
        .host("sds.example.nhs.uk")
        .port(636)
        .batch_size(100)
}

/// The person from the worked example.
pub fn jane() -> DirectoryEntry {
    DirectoryEntry::new("uid=ABC123,ou=people,o=nhs")
        .with_attribute("displayName", ["Jane Doe"])
        .with_attribute("mail", ["jane@example.org"])
}
