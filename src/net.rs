//! A trait to represent a stream

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_native_tls::{TlsConnector, TlsStream};
use log::debug;
use pin_project::pin_project;
use tokio::io::{AsyncRead as Read, AsyncWrite as Write, ReadBuf};
use tokio::net::{lookup_host, TcpStream};

use crate::error::Error;
use crate::stream::within;

/// Parameters to use for secure clients
#[derive(Clone)]
pub struct ClientTlsParameters {
    /// A connector from `native-tls`, shared between connections
    pub connector: Arc<TlsConnector>,
    /// The domain to send during the TLS handshake
    pub domain: String,
}

impl fmt::Debug for ClientTlsParameters {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("ClientTlsParameters")
            .field("connector", &"TlsConnector")
            .field("domain", &self.domain)
            .finish()
    }
}

impl ClientTlsParameters {
    /// Creates a `ClientTlsParameters`
    pub fn new(domain: String, connector: Arc<TlsConnector>) -> ClientTlsParameters {
        ClientTlsParameters { connector, domain }
    }
}

/// Represents the different types of underlying network streams
#[pin_project(project = NetworkStreamProj)]
pub enum NetworkStream {
    /// Plain TCP stream
    Tcp(#[pin] TcpStream),
    /// Encrypted TCP stream
    Tls(#[pin] TlsStream<TcpStream>),
}

impl NetworkStream {
    /// Opens a connection to `host:port`, wrapped in TLS when parameters are given.
    ///
    /// The timeout applies to the resolution, to each TCP connection attempt and to the
    /// TLS handshake separately.
    pub async fn connect(
        host: &str,
        port: u16,
        timeout: Option<Duration>,
        tls_parameters: Option<&ClientTlsParameters>,
    ) -> Result<NetworkStream, Error> {
        let addresses: Vec<SocketAddr> = within(timeout, async {
            Ok::<_, Error>(lookup_host((host, port)).await?.collect())
        })
        .await?;

        let tcp_stream = connect_any(&addresses, timeout).await?;

        match tls_parameters {
            Some(context) => {
                let tls_stream = within(timeout, async {
                    Ok::<_, Error>(context.connector.connect(&context.domain, tcp_stream).await?)
                })
                .await?;
                Ok(NetworkStream::Tls(tls_stream))
            }
            None => Ok(NetworkStream::Tcp(tcp_stream)),
        }
    }

    /// Upgrades to TLS connection
    pub async fn upgrade_tls(
        self,
        tls_parameters: &ClientTlsParameters,
        timeout: Option<Duration>,
    ) -> Result<NetworkStream, Error> {
        match self {
            NetworkStream::Tcp(stream) => {
                let tls_stream = within(timeout, async {
                    Ok::<_, Error>(
                        tls_parameters
                            .connector
                            .connect(&tls_parameters.domain, stream)
                            .await?,
                    )
                })
                .await?;
                Ok(NetworkStream::Tls(tls_stream))
            }
            tls @ NetworkStream::Tls(_) => Ok(tls),
        }
    }

    /// Is the NetworkStream encrypted
    pub fn is_encrypted(&self) -> bool {
        match *self {
            NetworkStream::Tcp(_) => false,
            NetworkStream::Tls(_) => true,
        }
    }

    /// Returns peer's address
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match *self {
            NetworkStream::Tcp(ref s) => s.peer_addr(),
            NetworkStream::Tls(ref s) => s.get_ref().peer_addr(),
        }
    }
}

/// Tries each address in turn, returning the first connection made.
///
/// Fails with the error of the last attempt, or `Error::Resolution` without addresses.
async fn connect_any(
    addresses: &[SocketAddr],
    timeout: Option<Duration>,
) -> Result<TcpStream, Error> {
    let mut last_error = Error::Resolution;
    for address in addresses {
        debug!("connecting to {}", address);
        let attempt = within(timeout, async {
            Ok::<_, Error>(TcpStream::connect(*address).await?)
        })
        .await;
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!("connection to {} failed: {}", address, err);
                last_error = err;
            }
        }
    }
    Err(last_error)
}

impl fmt::Debug for NetworkStream {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let kind = match *self {
            NetworkStream::Tcp(_) => "Tcp",
            NetworkStream::Tls(_) => "Tls",
        };
        fmt.debug_tuple(kind).field(&self.peer_addr().ok()).finish()
    }
}

impl Read for NetworkStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_read(cx, buf),
            NetworkStreamProj::Tls(s) => s.poll_read(cx, buf),
        }
    }
}

impl Write for NetworkStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_write(cx, buf),
            NetworkStreamProj::Tls(s) => s.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_flush(cx),
            NetworkStreamProj::Tls(s) => s.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_shutdown(cx),
            NetworkStreamProj::Tls(s) => s.poll_shutdown(cx),
        }
    }
}
