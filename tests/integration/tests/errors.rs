//! Error classification tests.

use std::time::Duration;

use sds_core::{ErrorKind, SdsError};
use sds_integration_tests::{Failure, FakeDirectory};
use sds_ldap::QueryContext;

use crate::common::{PersonRecord, TestEnv};

async fn failing_query(directory: FakeDirectory) -> anyhow::Result<(SdsError, TestEnv)> {
    let env = TestEnv::new(directory)?;
    let err = env
        .executor
        .execute_query::<PersonRecord>(&QueryContext::anonymous(), "o=nhs", "(uid=ABC123)", None)
        .await
        .unwrap_err();
    Ok((err, env))
}

/// Tests that server diagnostics survive classification.
#[tokio::test]
async fn test_protocol_error_keeps_server_text() -> anyhow::Result<()> {
    let (err, env) = failing_query(FakeDirectory::new().failing_search(Failure::Protocol {
        code: 87,
        message: "Bad search filter".to_string(),
    }))
    .await?;

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(matches!(err, SdsError::Protocol { code: 87, ref message } if message == "Bad search filter"));
    assert!(env.audit.is_empty());
    Ok(())
}

/// Tests that a connect timeout is reported as such.
#[tokio::test]
async fn test_connect_timeout() -> anyhow::Result<()> {
    let (err, env) = failing_query(
        FakeDirectory::new().failing_open(Failure::ConnectTimeout(Duration::from_secs(30))),
    )
    .await?;

    assert_eq!(err.kind(), ErrorKind::ConnectionTimeout);
    assert!(err.is_connection_error());
    assert!(env.audit.is_empty());
    Ok(())
}

/// Tests that a broken socket is a transport error.
#[tokio::test]
async fn test_transport_error() -> anyhow::Result<()> {
    let (err, _env) = failing_query(
        FakeDirectory::new().failing_search(Failure::Transport("connection reset".to_string())),
    )
    .await?;

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(err.to_string().contains("connection reset"));
    Ok(())
}

/// Tests the connectivity check in both directions.
#[tokio::test]
async fn test_connection_check() -> anyhow::Result<()> {
    let env = TestEnv::new(FakeDirectory::new())?;
    env.executor.test_connection().await?;
    assert_eq!(env.directory.counters().closed(), 1);

    let broken = TestEnv::new(
        FakeDirectory::new().failing_search(Failure::Transport("reset".to_string())),
    )?;
    let err = broken.executor.test_connection().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(broken.directory.counters().closed(), 1);
    Ok(())
}
