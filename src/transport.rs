//! Transport seam between the engine and the network.

use std::io;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Byte stream the engine can run over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Opens the transport for a connection attempt.
///
/// Called once for the initial connect and again for every reconnection
/// attempt. Tests substitute in-memory streams through this.
pub trait Connector: Send {
    fn connect(&mut self, host: &str, port: u16)
        -> BoxFuture<'static, io::Result<Box<dyn AsyncStream>>>;
}

/// Plain TCP with DNS resolution.
#[derive(Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(
        &mut self,
        host: &str,
        port: u16,
    ) -> BoxFuture<'static, io::Result<Box<dyn AsyncStream>>> {
        let host = host.to_string();
        Box::pin(async move {
            let mut addrs = tokio::net::lookup_host((host.as_str(), port)).await?;
            let addr = addrs.next().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no address found for {}", host),
                )
            })?;

            let stream = TcpStream::connect(addr).await?;
            Ok(Box::new(stream) as Box<dyn AsyncStream>)
        })
    }
}
