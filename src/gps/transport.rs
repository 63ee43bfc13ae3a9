//! Trait abstraction for the GPS stream link to enable testing

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Trait for the stream connection to the phone's GPS server
#[async_trait]
pub trait GpsTransport: Send {
    /// Open the connection
    async fn connect(&mut self) -> io::Result<()>;

    /// Whether a connection is currently open
    fn is_connected(&self) -> bool;

    /// Write all data to the stream
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read whatever is available, `Ok(0)` on peer close
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Drop the connection so the next cycle reconnects
    fn disconnect(&mut self);
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "GPS stream not connected")
}

/// TCP link to the ShareGPS server on the phone
pub struct TcpGpsTransport {
    addr: String,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpGpsTransport {
    pub fn new(host: &str, port: u16, connect_timeout: Duration) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            connect_timeout,
            stream: None,
        }
    }

    /// `host:port` this transport connects to
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl std::fmt::Debug for TcpGpsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpGpsTransport")
            .field("addr", &self.addr)
            .field("connected", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GpsTransport for TcpGpsTransport {
    async fn connect(&mut self) -> io::Result<()> {
        debug!("Connecting to GPS server at {}", self.addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", self.addr),
                )
            })??;

        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.write_all(data).await?;
        stream.flush().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.read(buf).await
    }

    fn disconnect(&mut self) {
        self.stream = None;
    }
}
