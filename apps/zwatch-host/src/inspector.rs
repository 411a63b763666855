use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};
use x509_parser::prelude::*;

use crate::errlog::ErrorLog;

const HTTPS_PORT: u16 = 443;

/// Probes `hostname:443` with an ordinary verifying TLS client and reports
/// the issuer common name of the leaf certificate. Every failure mode
/// (resolution, connect, handshake, certificate parse) collapses to `None`
/// plus one log line; the caller never sees a distinct error.
pub struct IssuerInspector {
    config: Arc<ClientConfig>,
    port: u16,
    timeout: Duration,
    errlog: ErrorLog,
}

impl IssuerInspector {
    /// Inspector trusting the platform root store.
    pub fn new(errlog: ErrorLog, timeout: Duration) -> Self {
        let mut roots = RootCertStore::empty();
        let loaded = rustls_native_certs::load_native_certs();
        for e in loaded.errors {
            warn!("skipping a platform root certificate: {}", e);
        }
        for cert in loaded.certs {
            let _ = roots.add(cert);
        }
        Self::with_roots(roots, errlog, timeout)
    }

    /// Inspector trusting an explicit root store.
    pub fn with_roots(roots: RootCertStore, errlog: ErrorLog, timeout: Duration) -> Self {
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            config: Arc::new(config),
            port: HTTPS_PORT,
            timeout,
            errlog,
        }
    }

    /// Redirects probes away from 443 so tests can hit ephemeral ports.
    #[cfg(test)]
    pub(crate) fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Issuer common name of the certificate presented by `hostname:443`,
    /// or `None` when no verified handshake produced one.
    pub async fn inspect(&self, hostname: &str) -> Option<String> {
        match self.probe(hostname).await {
            Ok(issuer) => issuer,
            Err(e) => {
                // Unreachable, untrusted and timed-out all look the same to
                // the caller; the log line is the only place they differ.
                self.errlog.append(&format!("Error checking {hostname}: {e:#}"));
                debug!("inspection of {} failed: {:#}", hostname, e);
                None
            }
        }
    }

    async fn probe(&self, hostname: &str) -> anyhow::Result<Option<String>> {
        let target = format!("{}:{}", hostname, self.port);

        // 1. TCP Connect
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&target))
            .await
            .context("connect timed out")??;

        // 2. TLS Handshake, full chain and hostname verification. The
        // handshake gets its own deadline so a connected-but-silent peer
        // cannot stall the message loop.
        let server_name = ServerName::try_from(hostname.to_string())?;
        let connector = TlsConnector::from(self.config.clone());
        let tls_stream = tokio::time::timeout(self.timeout, connector.connect(server_name, stream))
            .await
            .context("TLS handshake timed out")??;

        // 3. Extract Certificate
        let (_, session) = tls_stream.get_ref();
        let Some(cert) = session.peer_certificates().and_then(|certs| certs.first()) else {
            return Ok(None);
        };
        issuer_common_name(cert.as_ref())
        // Teardown is best-effort: dropping the stream closes the socket
        // without a close_notify round trip.
    }
}

fn issuer_common_name(cert_der: &[u8]) -> anyhow::Result<Option<String>> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| anyhow::anyhow!("Cert parse error: {:?}", e))?;

    Ok(cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(|cn| cn.to_string()))
}

/// Local verifying-handshake target for tests: a TLS server on an ephemeral
/// port presenting a fresh self-signed certificate for `localhost` whose
/// issuer CN is `issuer_cn`, plus a root store that trusts it.
#[cfg(test)]
pub(crate) async fn spawn_tls_server(issuer_cn: &str) -> (std::net::SocketAddr, RootCertStore) {
    use tokio::io::AsyncReadExt;
    use tokio_rustls::TlsAcceptor;
    use tokio_rustls::rustls::ServerConfig;
    use tokio_rustls::rustls::pki_types::PrivatePkcs8KeyDer;

    let mut params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, issuer_cn);
    let key_pair = rcgen::KeyPair::generate().unwrap();
    let cert = params.self_signed(&key_pair).unwrap();
    let cert_der = cert.der().clone();
    let key_der = PrivatePkcs8KeyDer::from(key_pair.serialize_der());

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key_der.into())
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(server_config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(mut tls) = acceptor.accept(stream).await {
                    let _ = tls.read(&mut [0u8; 1]).await;
                }
            });
        }
    });

    let mut roots = RootCertStore::empty();
    roots.add(cert_der).unwrap();
    (addr, roots)
}
