//! Stream types for IMAP connections.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::{Error, Result};

/// A stream that can be either plaintext or TLS.
pub enum ImapStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl ImapStream {
    /// Creates a new plaintext stream.
    pub const fn plain(stream: TcpStream) -> Self {
        Self::Plain(stream)
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

/// Ability to wrap an established stream in TLS after STARTTLS.
///
/// Implemented for [`ImapStream`]; test doubles can implement it as a
/// no-op so the STARTTLS negotiation path is exercisable without a
/// real handshake.
pub trait TlsUpgrade: Sized {
    /// Wraps the stream in TLS, validating against `host`.
    ///
    /// With `accept_invalid`, certificate validation findings are
    /// logged and the handshake proceeds anyway.
    fn upgrade_tls(
        self,
        host: &str,
        accept_invalid: bool,
    ) -> impl Future<Output = Result<Self>> + Send;
}

impl TlsUpgrade for ImapStream {
    async fn upgrade_tls(self, host: &str, accept_invalid: bool) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let connector = create_tls_connector(accept_invalid)?;
                let server_name = server_name(host)?;
                let tls = connector.connect(server_name, tcp).await.map_err(|e| {
                    Error::CannotConnect {
                        message: format!("TLS handshake with {host} failed"),
                        source: Some(Box::new(e)),
                    }
                })?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::CommandState("stream is already TLS".to_string())),
        }
    }
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string()).map_err(|e| Error::CannotConnect {
        message: format!("invalid server name {host}"),
        source: Some(Box::new(e)),
    })
}

/// Creates a TLS connector.
///
/// The default configuration validates against the webpki root store;
/// `accept_invalid` installs a verifier that logs and accepts any
/// certificate instead.
pub fn create_tls_connector(accept_invalid: bool) -> Result<TlsConnector> {
    let config = if accept_invalid {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(LoggingVerifier))
            .with_no_client_auth()
    } else {
        let root_store = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Connects to a server with TLS from the start.
pub async fn connect_tls(host: &str, port: u16, accept_invalid: bool) -> Result<ImapStream> {
    let tcp = connect_tcp(host, port).await?;

    let connector = create_tls_connector(accept_invalid)?;
    let name = server_name(host)?;
    let tls = connector
        .connect(name, tcp)
        .await
        .map_err(|e| Error::CannotConnect {
            message: format!("TLS handshake with {host}:{port} failed"),
            source: Some(Box::new(e)),
        })?;

    Ok(ImapStream::Tls(Box::new(tls)))
}

/// Connects to a server without TLS (cleartext or pre-STARTTLS).
pub async fn connect_plain(host: &str, port: u16) -> Result<ImapStream> {
    Ok(ImapStream::Plain(connect_tcp(host, port).await?))
}

async fn connect_tcp(host: &str, port: u16) -> Result<TcpStream> {
    TcpStream::connect((host, port))
        .await
        .map_err(|e| Error::CannotConnect {
            message: format!("TCP connect to {host}:{port} failed"),
            source: Some(Box::new(e)),
        })
}

/// Certificate verifier that logs validation being skipped and accepts
/// the peer. Used only in the Automatic TLS mode.
#[derive(Debug)]
struct LoggingVerifier;

impl ServerCertVerifier for LoggingVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        tracing::warn!(
            ?server_name,
            "accepting server certificate without validation"
        );
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tls_connector() {
        assert!(create_tls_connector(false).is_ok());
        assert!(create_tls_connector(true).is_ok());
    }

    #[test]
    fn test_server_name_rejects_garbage() {
        assert!(server_name("imap.example.com").is_ok());
        assert!(server_name("not a hostname").is_err());
    }
}
