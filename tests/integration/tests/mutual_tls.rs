//! Mutual TLS provisioning through the real `ldap3` connector.
//!
//! Certificate problems surface before any socket is opened, so those run
//! without a directory. The handshake tests run against a local TLS
//! listener that requires a client certificate.

use std::sync::Arc;
use std::time::Duration;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair,
};
use sds_core::{CertificateMaterial, ErrorKind, MemoryAuditSink, ServerCertPolicy, SpineConfig};
use sds_ldap::{
    CertificateBundle, ClientCertificateSelector, ConnectionSettings, ConnectionState,
    DirectoryConnector, FixedClientCertificate, Ldap3Connector, QueryContext, SdsQueryExecutor,
};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::common::PersonRecord;

fn identity(name: &str) -> rcgen::CertifiedKey {
    rcgen::generate_simple_self_signed(vec![name.to_string()]).unwrap()
}

fn material(cert: &rcgen::CertifiedKey, key: &rcgen::CertifiedKey) -> CertificateMaterial {
    let ca = identity("sds.example.nhs.uk");
    CertificateMaterial {
        client_cert: cert.cert.pem().into_bytes(),
        client_private_key: key.key_pair.serialize_pem().into_bytes(),
        server_ca_certchain: ca.cert.pem().into_bytes(),
    }
}

fn mutual_executor(
    material: CertificateMaterial,
) -> anyhow::Result<(SdsQueryExecutor, Arc<MemoryAuditSink>)> {
    let config = SpineConfig::builder()
        .host("ldap.invalid")
        .port(636)
        .use_ldaps(true)
        .use_mutual_auth(true)
        .build()?;
    let audit = Arc::new(MemoryAuditSink::new());
    let connector = Ldap3Connector::with_certificates(Arc::new(material));
    let executor = SdsQueryExecutor::new(config, Arc::new(connector), audit.clone())?;
    Ok((executor, audit))
}

/// Tests that unreadable material fails as a certificate error.
#[tokio::test]
async fn test_malformed_material() -> anyhow::Result<()> {
    let (executor, audit) = mutual_executor(CertificateMaterial {
        client_cert: b"not a certificate".to_vec(),
        client_private_key: b"not a key".to_vec(),
        server_ca_certchain: b"not a chain".to_vec(),
    })?;

    let err = executor
        .execute_query::<PersonRecord>(&QueryContext::anonymous(), "o=nhs", "(uid=ABC123)", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CertificateFormat);
    assert!(audit.is_empty());
    Ok(())
}

/// Tests that a key belonging to another certificate is rejected.
#[tokio::test]
async fn test_mismatched_key() -> anyhow::Result<()> {
    let client = identity("client.example.nhs.uk");
    let other = identity("other.example.nhs.uk");
    let (executor, audit) = mutual_executor(material(&client, &other))?;

    let err = executor
        .execute_query::<PersonRecord>(&QueryContext::anonymous(), "o=nhs", "(uid=ABC123)", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CertificateFormat);
    assert!(audit.is_empty());
    Ok(())
}

/// Tests that the provisioned identity is the one offered to the server.
#[test]
fn test_bundle_identity_is_offered() -> anyhow::Result<()> {
    let client = identity("client.example.nhs.uk");
    let bundle = CertificateBundle::from_material(&material(&client, &client))?;

    let selector = FixedClientCertificate::new(bundle.certified_key()?);
    let offered = selector
        .select_client_certificate(&[])
        .expect("identity offered");

    assert_eq!(offered.cert[0].0, bundle.client_chain()[0]);
    assert_eq!(bundle.client_chain()[0], client.cert.der().to_vec());
    Ok(())
}

// ============================================================================
// Handshake
// ============================================================================

struct Authority {
    cert: rcgen::Certificate,
    key: KeyPair,
}

impl Authority {
    fn new(name: &str) -> anyhow::Result<Self> {
        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params.distinguished_name = common_name(name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let key = KeyPair::generate()?;
        let cert = params.self_signed(&key)?;
        Ok(Self { cert, key })
    }

    fn issue(&self, name: &str, usage: ExtendedKeyUsagePurpose) -> anyhow::Result<(rcgen::Certificate, KeyPair)> {
        let mut params = CertificateParams::new(vec![name.to_string()])?;
        params.distinguished_name = common_name(name);
        params.extended_key_usages = vec![usage];
        let key = KeyPair::generate()?;
        let cert = params.signed_by(&key, &self.cert, &self.key)?;
        Ok((cert, key))
    }
}

fn common_name(name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, name);
    dn
}

/// Accepts one TLS connection that must present a client certificate
/// issued by `client_ca`. Resolves to the number of client certificates
/// seen, or `None` when the handshake failed.
async fn serve_once(
    server_ca: &Authority,
    client_ca: &Authority,
) -> anyhow::Result<(u16, JoinHandle<Option<usize>>)> {
    let (cert, key) = server_ca.issue("localhost", ExtendedKeyUsagePurpose::ServerAuth)?;

    let mut client_roots = rustls::RootCertStore::empty();
    client_roots
        .add(&rustls::Certificate(client_ca.cert.der().to_vec()))
        .map_err(|e| anyhow::anyhow!("client CA rejected: {e:?}"))?;

    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_client_cert_verifier(
            rustls::server::AllowAnyAuthenticatedClient::new(client_roots).boxed(),
        )
        .with_single_cert(
            vec![rustls::Certificate(cert.der().to_vec())],
            rustls::PrivateKey(key.serialize_der()),
        )?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.ok()?;
        let mut stream = acceptor.accept(socket).await.ok()?;
        let presented = stream.get_ref().1.peer_certificates().map(<[_]>::len);

        let mut buf = [0u8; 1024];
        while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
        presented
    });

    Ok((port, handle))
}

fn client_material(client_ca: &Authority, trusted: &Authority) -> anyhow::Result<CertificateMaterial> {
    let (cert, key) = client_ca.issue("client.example.nhs.uk", ExtendedKeyUsagePurpose::ClientAuth)?;
    Ok(CertificateMaterial {
        client_cert: cert.pem().into_bytes(),
        client_private_key: key.serialize_pem().into_bytes(),
        server_ca_certchain: trusted.cert.pem().into_bytes(),
    })
}

fn local_settings(port: u16, policy: ServerCertPolicy) -> anyhow::Result<ConnectionSettings> {
    let config = SpineConfig::builder()
        .host("localhost")
        .port(port)
        .use_ldaps(true)
        .use_mutual_auth(true)
        .timeout_seconds(5)
        .server_cert_policy(policy)
        .build()?;
    Ok(ConnectionSettings::from_config(&config))
}

async fn presented(handle: JoinHandle<Option<usize>>) -> anyhow::Result<Option<usize>> {
    Ok(tokio::time::timeout(Duration::from_secs(5), handle).await??)
}

/// Tests a full handshake in which the server sees the provisioned identity.
#[tokio::test]
async fn test_handshake_presents_client_identity() -> anyhow::Result<()> {
    let directory_ca = Authority::new("SDS Test Directory CA")?;
    let client_ca = Authority::new("SDS Test Client CA")?;
    let (port, server) = serve_once(&directory_ca, &client_ca).await?;

    let connector = Ldap3Connector::with_certificates(Arc::new(client_material(
        &client_ca,
        &directory_ca,
    )?));
    let mut conn = connector
        .open(&local_settings(port, ServerCertPolicy::Reject)?)
        .await?;
    assert_eq!(conn.state(), ConnectionState::Connected);

    let _ = conn.close().await;
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert_eq!(presented(server).await?, Some(1));
    Ok(())
}

/// Tests that an unvalidated server certificate aborts the handshake by default.
#[tokio::test]
async fn test_untrusted_server_is_rejected() -> anyhow::Result<()> {
    let impostor_ca = Authority::new("SDS Test Impostor CA")?;
    let directory_ca = Authority::new("SDS Test Directory CA")?;
    let client_ca = Authority::new("SDS Test Client CA")?;
    let (port, server) = serve_once(&impostor_ca, &client_ca).await?;

    let connector = Ldap3Connector::with_certificates(Arc::new(client_material(
        &client_ca,
        &directory_ca,
    )?));
    let err = connector
        .open(&local_settings(port, ServerCertPolicy::Reject)?)
        .await
        .err()
        .expect("handshake rejected");

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(presented(server).await?, None);
    Ok(())
}

/// Tests that the relaxed policy connects to the same untrusted server.
#[tokio::test]
async fn test_untrusted_server_accepted_with_warning() -> anyhow::Result<()> {
    let impostor_ca = Authority::new("SDS Test Impostor CA")?;
    let directory_ca = Authority::new("SDS Test Directory CA")?;
    let client_ca = Authority::new("SDS Test Client CA")?;
    let (port, server) = serve_once(&impostor_ca, &client_ca).await?;

    let connector = Ldap3Connector::with_certificates(Arc::new(client_material(
        &client_ca,
        &directory_ca,
    )?));
    let mut conn = connector
        .open(&local_settings(port, ServerCertPolicy::AcceptWithWarning)?)
        .await?;

    let _ = conn.close().await;
    assert_eq!(presented(server).await?, Some(1));
    Ok(())
}
