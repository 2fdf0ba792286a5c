//! Connection lifecycle tests: every opened connection is closed exactly once.

use std::collections::BTreeMap;
use std::time::Duration;

use sds_core::{ErrorKind, SdsError};
use sds_integration_tests::{Failure, FakeDirectory};
use sds_ldap::{DirectoryEntry, QueryContext};

use crate::common::{config, jane, PersonRecord, TestEnv};

fn assert_closed_once(directory: &FakeDirectory) {
    let counters = directory.counters();
    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.closed(), 1);
    assert_eq!(counters.close_calls(), 1);
    assert_eq!(counters.dropped(), 1);
}

/// Tests closure after a successful query.
#[tokio::test]
async fn test_closed_once_on_success() -> anyhow::Result<()> {
    let env = TestEnv::new(FakeDirectory::new().with_entry("(uid=ABC123)", jane()))?;

    let person: Option<PersonRecord> = env
        .executor
        .execute_query(&QueryContext::anonymous(), "o=nhs", "(uid=ABC123)", None)
        .await?;

    assert!(person.is_some());
    assert_closed_once(&env.directory);
    Ok(())
}

/// Tests closure after an empty result.
#[tokio::test]
async fn test_closed_once_on_empty_result() -> anyhow::Result<()> {
    let env = TestEnv::new(FakeDirectory::new())?;

    let person: Option<PersonRecord> = env
        .executor
        .execute_query(&QueryContext::anonymous(), "o=nhs", "(uid=ABC123)", None)
        .await?;

    assert!(person.is_none());
    assert_closed_once(&env.directory);
    Ok(())
}

/// Tests closure after the directory rejects the search.
#[tokio::test]
async fn test_closed_once_on_protocol_error() -> anyhow::Result<()> {
    let env = TestEnv::new(FakeDirectory::new().failing_search(Failure::Protocol {
        code: 32,
        message: "No such object".to_string(),
    }))?;

    let err = env
        .executor
        .execute_query::<PersonRecord>(&QueryContext::anonymous(), "o=nhs", "(uid=ABC123)", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_closed_once(&env.directory);
    Ok(())
}

/// Tests closure when mapping fails after the search succeeded.
#[tokio::test]
async fn test_closed_once_on_mapping_error() -> anyhow::Result<()> {
    let env = TestEnv::new(FakeDirectory::new().with_entry(
        "(uid=ABC123)",
        DirectoryEntry::new("uid=ABC123,o=nhs").with_attribute("cn", ["Jane"]),
    ))?;

    let err = env
        .executor
        .execute_query::<PersonRecord>(&QueryContext::anonymous(), "o=nhs", "(uid=ABC123)", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Mapping);
    assert_closed_once(&env.directory);
    Ok(())
}

/// Tests that a failed connect leaves nothing to close.
#[tokio::test]
async fn test_failed_open_closes_nothing() -> anyhow::Result<()> {
    let env = TestEnv::new(
        FakeDirectory::new().failing_open(Failure::Transport("connection refused".to_string())),
    )?;

    let err = env
        .executor
        .execute_query::<PersonRecord>(&QueryContext::anonymous(), "o=nhs", "(uid=ABC123)", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    let counters = env.directory.counters();
    assert_eq!(counters.opened(), 0);
    assert_eq!(counters.close_calls(), 0);
    Ok(())
}

/// Tests that the search deadline cuts a slow search short and still closes.
#[tokio::test(start_paused = true)]
async fn test_search_deadline_closes_connection() -> anyhow::Result<()> {
    let env = TestEnv::with_config(
        FakeDirectory::new()
            .with_entry("(uid=ABC123)", jane())
            .with_latency(Duration::from_secs(30)),
        config().search_timeout_seconds(5).build()?,
    )?;

    let err = env
        .executor
        .execute_query::<PersonRecord>(&QueryContext::anonymous(), "o=nhs", "(uid=ABC123)", None)
        .await
        .unwrap_err();

    assert!(matches!(err, SdsError::SearchTimeout(d) if d == Duration::from_secs(5)));
    assert_eq!(err.kind(), ErrorKind::ConnectionTimeout);
    assert!(env.audit.is_empty());
    assert_closed_once(&env.directory);
    Ok(())
}

/// Tests that abandoning a query mid-search releases its connection.
#[tokio::test(start_paused = true)]
async fn test_cancelled_query_releases_connection() -> anyhow::Result<()> {
    let env = TestEnv::new(
        FakeDirectory::new()
            .with_entry("(uid=ABC123)", jane())
            .with_latency(Duration::from_secs(60)),
    )?;

    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        env.executor.execute_query::<BTreeMap<String, String>>(
            &QueryContext::anonymous(),
            "o=nhs",
            "(uid=ABC123)",
            None,
        ),
    )
    .await;

    assert!(outcome.is_err());
    let counters = env.directory.counters();
    assert_eq!(counters.opened(), 1);
    assert_eq!(counters.dropped(), 1);
    assert!(env.audit.is_empty());
    Ok(())
}
