//! Audit records for directory queries.
//!
//! One [`AuditRecord`] is written per successful query. Failed queries are
//! not audited; they are reported through `tracing` at the point of
//! failure instead.
//!
//! Storage of audit records belongs to the caller. This crate only defines
//! the record and the [`AuditSink`] it is handed to.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of Spine message recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpineMessageType {
    /// An LDAP query against the Spine Directory Service.
    SpineLdapQuery,
}

impl SpineMessageType {
    /// Returns the numeric id stored with audit records.
    #[must_use]
    pub const fn id(self) -> i32 {
        match self {
            Self::SpineLdapQuery => 1,
        }
    }
}

/// Message type id for an LDAP query against the Spine Directory Service.
pub const SPINE_LDAP_QUERY_MESSAGE_TYPE: i32 = SpineMessageType::SpineLdapQuery.id();

/// Audit record for one completed directory query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record identifier.
    pub id: Uuid,

    /// When the record was produced.
    pub recorded_at: DateTime<Utc>,

    /// Search base, filter and attribute list as sent to the directory.
    pub request_description: String,

    /// The attribute document returned to the caller.
    pub response_payload: String,

    /// Elapsed time from connect to completed mapping.
    pub round_trip_ms: u64,

    /// Message type id recorded for the query.
    pub message_type_id: i32,

    /// Session the query was made on behalf of, when known.
    pub session_id: Option<i32>,
}

impl AuditRecord {
    /// Creates a record stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        request_description: impl Into<String>,
        response_payload: impl Into<String>,
        round_trip_ms: u64,
        message_type_id: i32,
        session_id: Option<i32>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            recorded_at: Utc::now(),
            request_description: request_description.into(),
            response_payload: response_payload.into(),
            round_trip_ms,
            message_type_id,
            session_id,
        }
    }
}

/// Destination for audit records.
///
/// Implementations must be cheap to call from concurrent queries.
pub trait AuditSink: Send + Sync {
    /// Records one completed query.
    fn record(&self, record: AuditRecord);
}

/// Writes audit records as structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "sds::audit",
            id = %record.id,
            request = %record.request_description,
            round_trip_ms = record.round_trip_ms,
            message_type_id = record.message_type_id,
            session_id = ?record.session_id,
            response_bytes = record.response_payload.len(),
            "Spine directory query completed"
        );
    }
}

/// Keeps audit records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record written so far.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Returns the number of records written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}
