//! # sds-ldap
//!
//! LDAP query client for the Spine Directory Service, built on `ldap3`.
//!
//! A query opens its own connection, runs one subtree search, folds the
//! returned entries into an [`AttributeMap`], maps that onto the caller's
//! type and closes the connection. Nothing is pooled or shared between
//! queries.
//!
//! ## Security Requirements
//!
//! - Mutual TLS identities are rebuilt from configured material for every
//!   connection and checked for key/certificate agreement first
//! - Server certificates that fail validation are rejected unless
//!   [`ServerCertPolicy::AcceptWithWarning`](sds_core::ServerCertPolicy) is
//!   configured explicitly
//! - Private keys are never logged

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod certificate;
pub mod connection;
pub mod error;
pub mod executor;
pub mod mapper;
pub mod search;
pub mod tls;

pub use certificate::{describe_certificates, CertificateBundle, CertificateSummary, KeyFormat};
pub use connection::{
    ConnectionSettings, ConnectionState, DirectoryConnection, DirectoryConnector, Ldap3Connector,
};
pub use error::classify_ldap_error;
pub use executor::{QueryContext, SdsQueryExecutor};
pub use mapper::map_attributes;
pub use search::{search, AttributeMap, DirectoryEntry, SearchRequest};
pub use tls::{
    mutual_tls_config, ClientCertificateSelector, FixedClientCertificate, PolicyServerValidator,
    ServerCertificateValidator,
};
