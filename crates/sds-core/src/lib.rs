//! # sds-core
//!
//! Core types for the Spine Directory Service (SDS) query client.
//!
//! This crate holds everything the directory client shares with its
//! callers and does not need a network for:
//!
//! - [`config`]: connection settings, certificate material and named queries
//! - [`error`]: the classified error taxonomy returned by every query
//! - [`audit`]: the audit record written after each successful query

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod audit;
pub mod config;
pub mod error;

pub use audit::{
    AuditRecord, AuditSink, MemoryAuditSink, SpineMessageType, TracingAuditSink,
    SPINE_LDAP_QUERY_MESSAGE_TYPE,
};
pub use config::{
    ldap_escape, CertificateMaterial, CertificatePaths, CertificateSource, SdsQuery, SdsSettings,
    ServerCertPolicy, SpineConfig, SpineConfigBuilder,
};
pub use error::{ErrorKind, SdsError, SdsResult};
