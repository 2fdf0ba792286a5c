//! Handshake-time TLS hooks for mutually authenticated connections.
//!
//! Two capability traits are invoked synchronously while the handshake
//! runs:
//!
//! - [`ServerCertificateValidator`] decides whether the directory's
//!   certificate is acceptable
//! - [`ClientCertificateSelector`] picks the identity offered to the server
//!
//! Adapters bridge them onto the `rustls` verifier and resolver traits.

use std::sync::Arc;
use std::time::SystemTime;

use rustls::client::{ResolvesClientCert, ServerCertVerified, ServerCertVerifier, WebPkiVerifier};
use rustls::sign::CertifiedKey;
use rustls::{Certificate, ClientConfig, RootCertStore, ServerName, SignatureScheme};
use sds_core::{SdsResult, ServerCertPolicy};

use crate::certificate::CertificateBundle;

/// Decides whether a server certificate is acceptable.
pub trait ServerCertificateValidator: Send + Sync {
    /// Validates the server's certificate chain for `server_name`.
    ///
    /// ## Errors
    ///
    /// Returns the TLS error that aborts the handshake.
    fn validate_server_certificate(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        now: SystemTime,
    ) -> Result<(), rustls::Error>;
}

/// Picks the client identity offered during the handshake.
pub trait ClientCertificateSelector: Send + Sync {
    /// Selects an identity, or `None` to offer none.
    fn select_client_certificate(&self, acceptable_issuers: &[&[u8]]) -> Option<Arc<CertifiedKey>>;
}

// ============================================================================
// Server Validation
// ============================================================================

/// Validates against the configured CA chain, then applies a [`ServerCertPolicy`].
pub struct PolicyServerValidator {
    inner: WebPkiVerifier,
    policy: ServerCertPolicy,
}

impl PolicyServerValidator {
    /// Creates a validator trusting `roots`.
    #[must_use]
    pub fn new(roots: RootCertStore, policy: ServerCertPolicy) -> Self {
        Self {
            inner: WebPkiVerifier::new(roots, None),
            policy,
        }
    }
}

impl ServerCertificateValidator for PolicyServerValidator {
    fn validate_server_certificate(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        now: SystemTime,
    ) -> Result<(), rustls::Error> {
        let outcome = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            &mut std::iter::empty(),
            &[],
            now,
        );

        let Err(err) = outcome else {
            return Ok(());
        };

        match self.policy {
            ServerCertPolicy::Reject => {
                tracing::error!(
                    server = ?server_name,
                    error = %err,
                    "Server certificate failed validation, aborting handshake"
                );
                Err(err)
            }
            ServerCertPolicy::AcceptWithWarning => {
                tracing::warn!(
                    server = ?server_name,
                    error = %err,
                    "Server certificate failed validation, accepting by policy"
                );
                Ok(())
            }
        }
    }
}

// ============================================================================
// Client Selection
// ============================================================================

/// Always offers the same identity.
pub struct FixedClientCertificate {
    key: Arc<CertifiedKey>,
}

impl FixedClientCertificate {
    /// Creates a selector for the given identity.
    #[must_use]
    pub fn new(key: Arc<CertifiedKey>) -> Self {
        Self { key }
    }
}

impl ClientCertificateSelector for FixedClientCertificate {
    fn select_client_certificate(&self, _acceptable_issuers: &[&[u8]]) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.key))
    }
}

// ============================================================================
// rustls Adapters
// ============================================================================

struct ValidatorAdapter<V>(V);

impl<V: ServerCertificateValidator> ServerCertVerifier for ValidatorAdapter<V> {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.0
            .validate_server_certificate(end_entity, intermediates, server_name, now)
            .map(|()| ServerCertVerified::assertion())
    }
}

struct SelectorAdapter<S>(S);

impl<S: ClientCertificateSelector> ResolvesClientCert for SelectorAdapter<S> {
    fn resolve(
        &self,
        acceptable_issuers: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        self.0.select_client_certificate(acceptable_issuers)
    }

    fn has_certs(&self) -> bool {
        true
    }
}

/// Builds a TLS client configuration that validates with `validator` and
/// presents the identity chosen by `selector`.
#[must_use]
pub fn client_config_with<V, S>(validator: V, selector: S) -> ClientConfig
where
    V: ServerCertificateValidator + 'static,
    S: ClientCertificateSelector + 'static,
{
    ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(ValidatorAdapter(validator)))
        .with_client_cert_resolver(Arc::new(SelectorAdapter(selector)))
}

/// Builds the mutual TLS configuration for a provisioned bundle.
pub fn mutual_tls_config(bundle: &CertificateBundle, policy: ServerCertPolicy) -> SdsResult<ClientConfig> {
    let validator = PolicyServerValidator::new(bundle.root_store()?, policy);
    let selector = FixedClientCertificate::new(bundle.certified_key()?);

    tracing::debug!(
        subject = %bundle.subject(),
        fingerprint = %bundle.fingerprint(),
        ?policy,
        "Configured mutual TLS identity"
    );

    Ok(client_config_with(validator, selector))
}
