//! Listener: binds an address and hands each accepted connection to its own
//! [`ConnectionHandler`] task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};
use wirecall_fabric::transport::{TcpTransport, TcpTransportListener};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::handler::{reject_busy, ConnectionHandler};
use crate::registry::MethodRegistry;

/// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Stops a [`Listener`]'s accept loop; cheap to clone and safe to call repeatedly
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Accepts connections and serves calls against a fixed registry.
///
/// The registry is moved in at bind time and only read afterwards, so every
/// registration happens before the first connection is accepted.
pub struct Listener {
    listener: TcpTransportListener,
    registry: Arc<MethodRegistry>,
    config: ServerConfig,
    permits: Arc<Semaphore>,
    busy_replies: Arc<Semaphore>,
    shutdown: ShutdownHandle,
}

impl Listener {
    /// Bind to `config.host:config.port`
    pub async fn bind(registry: MethodRegistry, config: ServerConfig) -> Result<Self> {
        let listener = TcpTransportListener::bind_host(&config.bind_address())
            .await?
            .with_max_frame_size(config.max_frame_size);

        info!(
            addr = %listener.local_addr()?,
            methods = registry.len(),
            "listening"
        );

        Ok(Self {
            listener,
            registry: Arc::new(registry),
            permits: Arc::new(Semaphore::new(config.max_connections)),
            busy_replies: Arc::new(Semaphore::new(config.max_busy_replies)),
            config,
            shutdown: ShutdownHandle::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Handle for stopping [`Listener::accept_loop`], which consumes the
    /// listener; take it before starting the loop.
    ///
    /// Connections already being served run to completion.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept connections until shut down, then close the listening socket
    pub async fn accept_loop(mut self) -> Result<()> {
        let mut stop = self.shutdown.subscribe();

        loop {
            if *stop.borrow_and_update() {
                break;
            }
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((transport, peer)) => self.spawn_handler(transport, peer),
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        self.listener.close().await?;
        info!("listener shut down");
        Ok(())
    }

    fn spawn_handler(&self, transport: TcpTransport, peer: SocketAddr) {
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => {
                info!(%peer, "accepted connection");
                let registry = Arc::clone(&self.registry);
                tokio::spawn(async move {
                    ConnectionHandler::new(transport, peer, registry).run().await;
                    drop(permit);
                });
            }
            Err(_) => match Arc::clone(&self.busy_replies).try_acquire_owned() {
                Ok(reply_permit) => {
                    warn!(
                        %peer,
                        limit = self.config.max_connections,
                        "connection limit reached, rejecting"
                    );
                    tokio::spawn(async move {
                        reject_busy(transport, peer).await;
                        drop(reply_permit);
                    });
                }
                Err(_) => {
                    warn!(%peer, "connection limit reached, dropping without reply");
                    drop(transport);
                }
            },
        }
    }
}
