use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportListener, DEFAULT_MAX_FRAME_SIZE};

/// TCP transport with length-prefix framing
///
/// Messages are sent with a 4-byte big-endian length prefix. Payloads larger
/// than the configured frame limit are refused in both directions: `send`
/// fails before writing anything and `receive` fails after reading only the
/// prefix, leaving the payload unread for [`Transport::discard`].
pub struct TcpTransport {
    stream: TcpStream,
    max_frame_size: usize,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl TcpTransport {
    /// Connect to a remote TCP address with no timeouts
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::builder().address(addr).connect().await
    }

    /// Connect with a connect timeout
    pub async fn connect_timeout(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        Self::builder()
            .address(addr)
            .connect_timeout(timeout)
            .connect()
            .await
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> TcpTransportBuilder {
        TcpTransportBuilder::new()
    }

    /// Create from an existing TcpStream
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            send_timeout: None,
            receive_timeout: None,
        }
    }

    /// Set the largest payload accepted in either direction
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Get the remote address of this connection
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream.peer_addr().map_err(Into::into)
    }

    /// Get the local address of this connection
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.stream.local_addr().map_err(Into::into)
    }
}

fn closed_on_eof(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        e.into()
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size: bytes.len(),
                max: self.max_frame_size,
            });
        }

        let timeout = self.send_timeout;
        let send_op = async {
            // Write length prefix (4 bytes, big-endian)
            let len = u32::try_from(bytes.len())
                .map_err(|_| Error::InvalidFrame("length does not fit in u32".to_string()))?;
            self.stream.write_u32(len).await?;

            // Write data
            self.stream.write_all(bytes).await?;
            self.stream.flush().await?;

            Ok::<(), Error>(())
        };

        if let Some(timeout) = timeout {
            tokio::time::timeout(timeout, send_op)
                .await
                .map_err(|_| Error::Timeout("Send"))?
        } else {
            send_op.await
        }
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        let max = self.max_frame_size;
        let timeout = self.receive_timeout;
        let receive_op = async {
            // Read length prefix
            let len = self.stream.read_u32().await.map_err(closed_on_eof)? as usize;

            if len == 0 {
                return Err(Error::InvalidFrame("empty frame".to_string()));
            }
            if len > max {
                return Err(Error::FrameTooLarge { size: len, max });
            }

            // Read data
            let mut buf = vec![0u8; len];
            self.stream
                .read_exact(&mut buf)
                .await
                .map_err(closed_on_eof)?;

            Ok::<Vec<u8>, Error>(buf)
        };

        if let Some(timeout) = timeout {
            tokio::time::timeout(timeout, receive_op)
                .await
                .map_err(|_| Error::Timeout("Receive"))?
        } else {
            receive_op.await
        }
    }

    async fn discard(&mut self, len: usize) -> Result<()> {
        let mut payload = (&mut self.stream).take(len as u64);
        let skipped = tokio::io::copy(&mut payload, &mut tokio::io::sink()).await?;
        if skipped < len as u64 {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// TCP listener for accepting incoming connections
pub struct TcpTransportListener {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    max_frame_size: usize,
}

impl TcpTransportListener {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Self::from_listener(listener)
    }

    /// Bind to a host name or address string such as `0.0.0.0:8080`
    pub async fn bind_host(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Self::from_listener(listener)
    }

    fn from_listener(listener: TcpListener) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener: Some(listener),
            local_addr,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        })
    }

    /// Frame limit applied to every accepted transport
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Accept an incoming connection
    pub async fn accept(&self) -> Result<(TcpTransport, SocketAddr)> {
        let listener = self.listener.as_ref().ok_or(Error::ConnectionClosed)?;
        let (stream, addr) = listener.accept().await?;
        let transport = TcpTransport::from_stream(stream).with_max_frame_size(self.max_frame_size);
        Ok((transport, addr))
    }

    /// Get the local address this listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    pub fn is_closed(&self) -> bool {
        self.listener.is_none()
    }

    /// Close the listening socket
    ///
    /// Calling this on an already-closed listener is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        self.listener.take();
        Ok(())
    }
}

#[async_trait::async_trait]
impl TransportListener for TcpTransportListener {
    type Transport = TcpTransport;

    async fn accept(&self) -> Result<(Self::Transport, SocketAddr)> {
        TcpTransportListener::accept(self).await
    }

    async fn close(&mut self) -> Result<()> {
        TcpTransportListener::close(self).await
    }
}

/// Builder for configuring TCP transport
#[derive(Default)]
pub struct TcpTransportBuilder {
    address: Option<String>,
    max_frame_size: Option<usize>,
    connect_timeout: Option<Duration>,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl TcpTransportBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address to connect to
    pub fn address(mut self, addr: SocketAddr) -> Self {
        self.address = Some(addr.to_string());
        self
    }

    /// Set a `host:port` target; the host is resolved on connect
    pub fn host(mut self, host: &str, port: u16) -> Self {
        let address = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        self.address = Some(address);
        self
    }

    /// Set the largest payload accepted in either direction
    pub fn max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = Some(max);
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set the receive timeout
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    /// Connect with the configured settings
    pub async fn connect(self) -> Result<TcpTransport> {
        let addr = self
            .address
            .ok_or_else(|| Error::Custom("Address not set".to_string()))?;

        let connect_op = TcpStream::connect(addr.as_str());

        let connected = if let Some(timeout) = self.connect_timeout {
            tokio::time::timeout(timeout, connect_op)
                .await
                .map_err(|_| Error::Timeout("Connect"))?
        } else {
            connect_op.await
        };
        let stream = connected.map_err(|source| Error::Connect {
            addr: addr.clone(),
            source,
        })?;

        tracing::debug!(%addr, "connected");

        Ok(TcpTransport {
            stream,
            max_frame_size: self.max_frame_size.unwrap_or(DEFAULT_MAX_FRAME_SIZE),
            send_timeout: self.send_timeout,
            receive_timeout: self.receive_timeout,
        })
    }
}
