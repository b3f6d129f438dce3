//! The transport collaborator (§6): a byte-stream sink + source the
//! connection FSM reads and writes without caring whether it's plaintext TCP
//! or TLS. Grounded on the teacher's `Disconnect` trait, which already
//! implements the same "one trait, two stream types" shape for `TcpStream`
//! and `TlsStream<TcpStream>`.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector as RustlsConnector;

use crate::error::ClientError;

/// Anything the connection FSM can read from and write to. No `open`/
/// `shutdown` methods live here: establishing one is the `Connector`'s job,
/// and the FSM tears it down by simply dropping it.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl Transport for TcpStream {}
impl Transport for TlsStream<TcpStream> {}
#[cfg(test)]
impl Transport for tokio::io::DuplexStream {}

pub(crate) type ConnectFuture<'a> = Pin<Box<dyn Future<Output = Result<Box<dyn Transport>, ClientError>> + Send + 'a>>;

/// Opens a fresh transport to the broker. Implemented once per transport
/// kind; the connection FSM calls it both for the initial connect and for
/// every reconnect attempt, so it must be cheaply retryable.
pub trait Connector: Send + Sync {
    fn connect(&self) -> ConnectFuture<'_>;
}

pub struct TcpConnector {
    pub host: String,
    pub port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> ConnectFuture<'_> {
        Box::pin(async move {
            let stream = TcpStream::connect((self.host.as_str(), self.port))
                .await
                .map_err(ClientError::from)?;
            Ok(Box::new(stream) as Box<dyn Transport>)
        })
    }
}

pub struct TlsTcpConnector {
    pub host: String,
    pub port: u16,
    pub tls_connector: RustlsConnector,
}

impl TlsTcpConnector {
    pub fn new(host: impl Into<String>, port: u16, tls_connector: RustlsConnector) -> Self {
        Self {
            host: host.into(),
            port,
            tls_connector,
        }
    }
}

impl Connector for TlsTcpConnector {
    fn connect(&self) -> ConnectFuture<'_> {
        Box::pin(async move {
            let tcp = TcpStream::connect((self.host.as_str(), self.port))
                .await
                .map_err(ClientError::from)?;
            let server_name = ServerName::try_from(self.host.clone()).map_err(|_| {
                ClientError::new(
                    crate::error::ErrorKind::ProtocolError,
                    format!("{:?} is not a valid DNS name for TLS SNI", self.host),
                )
            })?;
            let stream = self
                .tls_connector
                .connect(server_name, tcp)
                .await
                .map_err(ClientError::from)?;
            Ok(Box::new(stream) as Box<dyn Transport>)
        })
    }
}
