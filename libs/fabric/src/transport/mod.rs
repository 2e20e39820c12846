use std::net::SocketAddr;

use crate::error::Result;

pub mod tcp;

pub use self::tcp::{TcpTransport, TcpTransportBuilder, TcpTransportListener};

/// Largest payload accepted in one frame unless configured otherwise
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024;

/// Transport trait for sending and receiving raw bytes
///
/// Each transport instance represents a single connection.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send bytes over the transport
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receive bytes from the transport
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Skip `len` payload bytes of a frame that was refused
    async fn discard(&mut self, len: usize) -> Result<()>;

    /// Close the transport connection
    async fn close(&mut self) -> Result<()>;
}

/// Listener trait for accepting transports
#[async_trait::async_trait]
pub trait TransportListener: Send + Sync {
    type Transport: Transport;

    /// Accept the next incoming connection
    async fn accept(&self) -> Result<(Self::Transport, SocketAddr)>;

    /// Close the listener
    async fn close(&mut self) -> Result<()>;
}
