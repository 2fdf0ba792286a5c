//! Client identity provisioning for mutual TLS.
//!
//! Turns the stored client certificate, private key and server CA chain
//! into a [`CertificateBundle`]. The certificate and key are parsed
//! independently and then checked against each other, because a bundle
//! whose key does not belong to its certificate would only fail later,
//! half way through a handshake.
//!
//! Accepted encodings:
//!
//! - PEM, one or more `CERTIFICATE` blocks for certificates
//! - PEM `RSA PRIVATE KEY` (PKCS#1) or `PRIVATE KEY` (PKCS#8) for the key
//! - bare base64 or raw DER for a single certificate or key

use std::sync::Arc;

use aws_lc_rs::digest;
use aws_lc_rs::signature::{
    EcdsaKeyPair, KeyPair, RsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING,
    ECDSA_P384_SHA384_ASN1_SIGNING,
};
use base64::Engine;
use rustls::sign::CertifiedKey;
use rustls::RootCertStore;
use sds_core::{CertificateMaterial, SdsError, SdsResult};
use x509_parser::pem::Pem;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Private key encodings understood by the provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// `RSAPrivateKey` (PKCS#1).
    Pkcs1,
    /// `PrivateKeyInfo` (PKCS#8), RSA or ECDSA.
    Pkcs8,
}

impl KeyFormat {
    const fn pem_label(self) -> &'static str {
        match self {
            Self::Pkcs1 => "RSA PRIVATE KEY",
            Self::Pkcs8 => "PRIVATE KEY",
        }
    }
}

/// A client certificate bound to its private key, plus the server CA chain.
///
/// Immutable once built. Build a new bundle when the stored material
/// changes.
#[derive(Clone)]
pub struct CertificateBundle {
    client_chain: Vec<Vec<u8>>,
    private_key: Vec<u8>,
    key_format: KeyFormat,
    server_chain: Vec<Vec<u8>>,
    subject: String,
    fingerprint: String,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("subject", &self.subject)
            .field("fingerprint", &self.fingerprint)
            .field("client_chain_len", &self.client_chain.len())
            .field("key_format", &self.key_format)
            .field("private_key", &"<redacted>")
            .field("server_chain_len", &self.server_chain.len())
            .finish()
    }
}

impl CertificateBundle {
    /// Builds a bundle from stored certificate material.
    pub fn from_material(material: &CertificateMaterial) -> SdsResult<Self> {
        Self::build(
            &material.client_cert,
            &material.client_private_key,
            &material.server_ca_certchain,
        )
    }

    /// Builds a bundle from raw blobs.
    ///
    /// ## Errors
    ///
    /// Returns [`SdsError::CertificateFormat`] when any blob is malformed,
    /// the server chain is empty, or the key does not belong to the
    /// certificate.
    pub fn build(client_cert: &[u8], private_key: &[u8], server_chain: &[u8]) -> SdsResult<Self> {
        let client_chain = parse_certificates(client_cert, "client certificate")?;
        let (key_format, private_key) = parse_private_key(private_key)?;
        let server_chain = parse_certificates(server_chain, "server CA chain")?;

        let leaf = &client_chain[0];
        let (_, cert) = X509Certificate::from_der(leaf).map_err(|e| {
            SdsError::certificate(format!("client certificate is not valid X.509: {e}"))
        })?;

        verify_key_matches(&cert, key_format, &private_key)?;

        let subject = cert.subject().to_string();
        let fingerprint = fingerprint(leaf);

        Ok(Self {
            client_chain,
            private_key,
            key_format,
            server_chain,
            subject,
            fingerprint,
        })
    }

    /// Returns the client certificate subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the SHA-256 fingerprint of the client certificate (hex).
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Returns the client certificate chain, leaf first (DER).
    #[must_use]
    pub fn client_chain(&self) -> &[Vec<u8>] {
        &self.client_chain
    }

    /// Returns the server CA chain (DER).
    #[must_use]
    pub fn server_chain(&self) -> &[Vec<u8>] {
        &self.server_chain
    }

    /// Returns the private key encoding.
    #[must_use]
    pub const fn key_format(&self) -> KeyFormat {
        self.key_format
    }

    /// Returns the identity in the form the TLS stack presents it.
    pub fn certified_key(&self) -> SdsResult<Arc<CertifiedKey>> {
        let key = rustls::sign::any_supported_type(&rustls::PrivateKey(self.private_key.clone()))
            .map_err(|_| SdsError::certificate("private key type is not supported for TLS"))?;

        let chain = self
            .client_chain
            .iter()
            .cloned()
            .map(rustls::Certificate)
            .collect();

        Ok(Arc::new(CertifiedKey::new(chain, key)))
    }

    /// Returns a root store holding the server CA chain.
    pub fn root_store(&self) -> SdsResult<RootCertStore> {
        let mut roots = RootCertStore::empty();
        for der in &self.server_chain {
            roots
                .add(&rustls::Certificate(der.clone()))
                .map_err(|e| SdsError::certificate(format!("unusable server CA: {e:?}")))?;
        }
        Ok(roots)
    }

    /// Exports the client chain and private key as PEM.
    ///
    /// The output contains the private key unencrypted. It is meant for
    /// operators moving an identity between stores and must never be
    /// logged.
    #[must_use]
    pub fn export_pem(&self) -> String {
        let mut out = String::new();
        for der in &self.client_chain {
            out.push_str(&encode_pem("CERTIFICATE", der));
        }
        out.push_str(&encode_pem(self.key_format.pem_label(), &self.private_key));
        out
    }
}

// ============================================================================
// Certificate Summaries
// ============================================================================

/// Human-readable facts about one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Start of validity.
    pub not_before: String,
    /// End of validity.
    pub not_after: String,
    /// SHA-256 fingerprint (hex).
    pub fingerprint: String,
}

/// Describes every certificate in a blob.
pub fn describe_certificates(blob: &[u8]) -> SdsResult<Vec<CertificateSummary>> {
    parse_certificates(blob, "certificate")?
        .iter()
        .map(|der| {
            let (_, cert) = X509Certificate::from_der(der)
                .map_err(|e| SdsError::certificate(format!("not valid X.509: {e}")))?;
            Ok(CertificateSummary {
                subject: cert.subject().to_string(),
                issuer: cert.issuer().to_string(),
                not_before: cert.validity().not_before.to_string(),
                not_after: cert.validity().not_after.to_string(),
                fingerprint: fingerprint(der),
            })
        })
        .collect()
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses one or more certificates and returns their DER encodings.
pub fn parse_certificates(blob: &[u8], what: &str) -> SdsResult<Vec<Vec<u8>>> {
    let mut certs = Vec::new();
    for (label, der) in decode_blocks(blob, what)? {
        if let Some(label) = label {
            if label != "CERTIFICATE" {
                return Err(SdsError::certificate(format!(
                    "{what} contains an unexpected {label} block"
                )));
            }
        }

        X509Certificate::from_der(&der)
            .map_err(|e| SdsError::certificate(format!("{what} is not valid X.509: {e}")))?;
        certs.push(der);
    }

    if certs.is_empty() {
        return Err(SdsError::certificate(format!("{what} holds no certificates")));
    }

    Ok(certs)
}

/// Parses a private key and returns its encoding and DER bytes.
pub fn parse_private_key(blob: &[u8]) -> SdsResult<(KeyFormat, Vec<u8>)> {
    let mut blocks = decode_blocks(blob, "client private key")?.into_iter();
    let (label, der) = blocks
        .next()
        .ok_or_else(|| SdsError::certificate("client private key is empty"))?;
    if blocks.next().is_some() {
        return Err(SdsError::certificate(
            "client private key holds more than one block",
        ));
    }

    let format = match label.as_deref() {
        Some("RSA PRIVATE KEY") => KeyFormat::Pkcs1,
        Some("PRIVATE KEY") => KeyFormat::Pkcs8,
        Some("ENCRYPTED PRIVATE KEY") => {
            return Err(SdsError::certificate(
                "encrypted private keys are not supported",
            ))
        }
        Some(other) => {
            return Err(SdsError::certificate(format!(
                "unsupported private key type: {other}"
            )))
        }
        None if RsaKeyPair::from_der(&der).is_ok() => KeyFormat::Pkcs1,
        None => KeyFormat::Pkcs8,
    };

    // Parsing the public half here rejects malformed key bytes early.
    public_key_bytes(format, &der)?;

    Ok((format, der))
}

/// Splits a blob into (PEM label, DER) pairs.
///
/// Blobs without PEM armour are treated as a single bare-base64 or raw DER
/// object and come back without a label.
fn decode_blocks(blob: &[u8], what: &str) -> SdsResult<Vec<(Option<String>, Vec<u8>)>> {
    if blob.iter().all(u8::is_ascii_whitespace) {
        return Err(SdsError::certificate(format!("{what} is empty")));
    }

    if contains(blob, b"-----BEGIN") {
        let mut blocks = Vec::new();
        for pem in Pem::iter_from_buffer(blob) {
            let pem: Pem = pem
                .map_err(|e| SdsError::certificate(format!("{what} is not valid PEM: {e:?}")))?;
            blocks.push((Some(pem.label), pem.contents));
        }
        return Ok(blocks);
    }

    let is_base64 = blob
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=') || b.is_ascii_whitespace());
    if is_base64 {
        let compact: Vec<u8> = blob
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| SdsError::certificate(format!("{what} is not valid base64: {e}")))?;
        return Ok(vec![(None, der)]);
    }

    Ok(vec![(None, blob.to_vec())])
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Extracts the public key carried by a private key.
fn public_key_bytes(format: KeyFormat, der: &[u8]) -> SdsResult<Vec<u8>> {
    match format {
        KeyFormat::Pkcs1 => RsaKeyPair::from_der(der)
            .map(|key| key.public_key().as_ref().to_vec())
            .map_err(|e| SdsError::certificate(format!("invalid PKCS#1 RSA key: {e}"))),
        KeyFormat::Pkcs8 => {
            if let Ok(key) = RsaKeyPair::from_pkcs8(der) {
                return Ok(key.public_key().as_ref().to_vec());
            }
            for alg in [&ECDSA_P256_SHA256_ASN1_SIGNING, &ECDSA_P384_SHA384_ASN1_SIGNING] {
                if let Ok(key) = EcdsaKeyPair::from_pkcs8(alg, der) {
                    return Ok(key.public_key().as_ref().to_vec());
                }
            }
            Err(SdsError::certificate(
                "invalid PKCS#8 key: expected RSA, ECDSA P-256 or ECDSA P-384",
            ))
        }
    }
}

fn verify_key_matches(cert: &X509Certificate<'_>, format: KeyFormat, key_der: &[u8]) -> SdsResult<()> {
    let public_key = public_key_bytes(format, key_der)?;
    let spki = cert.public_key();

    if spki.subject_public_key.data.as_ref() == public_key.as_slice() || spki.raw == public_key.as_slice() {
        Ok(())
    } else {
        Err(SdsError::certificate(
            "private key does not match the client certificate",
        ))
    }
}

fn fingerprint(der: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, der).as_ref())
}

fn encode_pem(label: &str, der: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    let mut out = format!("-----BEGIN {label}-----\n");
    for line in b64.as_bytes().chunks(64) {
        // base64 output is ASCII
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}
