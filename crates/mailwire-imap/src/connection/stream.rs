//! TLS stream setup.
//!
//! Both retrieval and submission use implicit TLS, so this is the only way a
//! connection is opened.

#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::{Error, Result};

/// Default bound on TCP connect plus TLS handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates a TLS connector with default root certificates.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Connects to `host:port` and completes a TLS handshake within `timeout`.
pub async fn connect_tls(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(host.to_string())?;
    let addr = format!("{host}:{port}");

    let handshake = async {
        let tcp = TcpStream::connect(&addr).await.map_err(Error::Connect)?;
        create_tls_connector()
            .connect(server_name, tcp)
            .await
            .map_err(Error::Tls)
    };

    let stream = tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| Error::Timeout(timeout))??;

    debug!(%addr, "TLS connection established");
    Ok(stream)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tls_connector() {
        let _connector = create_tls_connector();
    }

    #[tokio::test]
    async fn test_invalid_dns_name_rejected() {
        let result = connect_tls("not a host name", 993, CONNECT_TIMEOUT).await;
        assert!(matches!(result, Err(Error::InvalidDnsName(_))));
    }
}
