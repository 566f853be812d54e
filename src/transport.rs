//! WebSocket transport with the headers the world server requires.
//!
//! TLS uses the platform root store by default; `TlsMode::InsecureSkipVerify`
//! accepts any certificate for test servers behind self-signed certs.

use anyhow::{Context, Result};
use rustls::pki_types::CertificateDer;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// Established client-side WebSocket stream.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Certificate verification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum TlsMode {
    /// Verify the server certificate against the platform root store.
    #[default]
    Verified,
    /// Accept any certificate. Test servers only.
    InsecureSkipVerify,
}

/// Connect to the world server.
///
/// Sends the `Origin`, `User-Agent`, `Pragma` and `Cache-Control` headers
/// the server's anti-abuse checks require.
pub async fn connect(url: &str, origin: &str, tls: TlsMode) -> Result<WsStream> {
    let mut request = url
        .into_client_request()
        .with_context(|| format!("invalid server url: {url}"))?;

    let headers = request.headers_mut();
    headers.insert(
        "Origin",
        HeaderValue::from_str(origin).context("invalid origin header")?,
    );
    headers.insert("User-Agent", HeaderValue::from_static("Mozilla/5.0"));
    headers.insert("Pragma", HeaderValue::from_static("no-cache"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));

    // Plain ws:// (loopback test servers) needs no TLS configuration.
    let connector = if request.uri().scheme_str() == Some("wss") {
        Some(Connector::Rustls(Arc::new(client_config(tls)?)))
    } else {
        None
    };
    let (stream, response) = connect_async_tls_with_config(request, None, false, connector)
        .await
        .with_context(|| format!("websocket connect to {url} failed"))?;

    debug!(status = %response.status(), "websocket handshake complete");
    Ok(stream)
}

fn client_config(tls: TlsMode) -> Result<rustls::ClientConfig> {
    // Install default crypto provider if not already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    match tls {
        TlsMode::Verified => {
            let mut roots = rustls::RootCertStore::empty();
            let native = rustls_native_certs::load_native_certs();
            for err in &native.errors {
                warn!("failed to load a native root certificate: {err}");
            }
            for cert in native.certs {
                if let Err(e) = roots.add(cert) {
                    debug!("skipping unusable root certificate: {e}");
                }
            }
            if roots.is_empty() {
                anyhow::bail!("no usable root certificates found");
            }
            Ok(rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth())
        }
        TlsMode::InsecureSkipVerify => Ok(rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
            .with_no_client_auth()),
    }
}

/// Certificate verifier that accepts all certificates (test servers only).
///
/// **WARNING:** This bypasses TLS security and should NEVER be used in production.
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
