//! Opening connections.
//!
//! The engine never opens sockets itself; it asks a [`Connector`] for a
//! fresh stream per operation. Production uses [`TlsConnector`]; tests
//! substitute scripted in-memory streams.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::Result;

/// Source of connected byte streams.
pub trait Connector: Send + Sync + 'static {
    /// The stream type produced.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Opens a stream to `host:port`.
    fn connect(&self, host: &str, port: u16) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Implicit-TLS connector backed by rustls.
#[derive(Debug, Clone, Copy)]
pub struct TlsConnector {
    timeout: Duration,
}

impl TlsConnector {
    /// Creates a connector whose connect plus handshake is bounded by `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TlsConnector {
    fn default() -> Self {
        Self::new(mailwire_imap::connection::CONNECT_TIMEOUT)
    }
}

impl Connector for TlsConnector {
    type Stream = TlsStream<TcpStream>;

    fn connect(&self, host: &str, port: u16) -> impl Future<Output = Result<Self::Stream>> + Send {
        let timeout = self.timeout;
        async move {
            debug!(host, port, "opening TLS connection");
            Ok(mailwire_imap::connection::connect_tls(host, port, timeout).await?)
        }
    }
}
