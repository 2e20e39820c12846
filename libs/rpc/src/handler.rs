//! Per-connection request loop.
//!
//! A connection moves from open, through alternating receive and send, to
//! closed. Only transport and framing failures close it; every failure that
//! happens while answering a call goes back to the caller as an error
//! envelope and the loop continues.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use wirecall_core::protocol::{METHODS_METHOD, PING_METHOD, PONG};
use wirecall_core::{Args, CallRequest, CallResponse, ErrorKind};
use wirecall_fabric::codec::JsonCodec;
use wirecall_fabric::transport::{TcpTransport, Transport};
use wirecall_fabric::{Channel, Error as FabricError};

use crate::registry::MethodRegistry;

/// Oversized payloads up to this many bytes are read and dropped so the
/// rejection can be delivered cleanly; larger ones just close the connection.
const MAX_DISCARD: usize = 1024 * 1024;

/// How long a rejected connection is kept around to flush the busy reply
const BUSY_LINGER: Duration = Duration::from_secs(2);

pub struct ConnectionHandler {
    channel: Channel<JsonCodec>,
    peer: SocketAddr,
    registry: Arc<MethodRegistry>,
}

impl ConnectionHandler {
    pub fn new(transport: TcpTransport, peer: SocketAddr, registry: Arc<MethodRegistry>) -> Self {
        Self {
            channel: Channel::from_transport(transport, JsonCodec),
            peer,
            registry,
        }
    }

    /// Serve requests until the peer goes away or breaks the framing
    pub async fn run(mut self) {
        let peer = self.peer;
        let mut served: u64 = 0;

        loop {
            let payload: Value = match self.channel.receive().await {
                Ok(payload) => payload,
                Err(FabricError::FrameTooLarge { size, max }) => {
                    warn!(%peer, size, max, "request exceeds frame limit");
                    self.reject_oversized(size, max).await;
                    break;
                }
                Err(e) if e.is_disconnect() => {
                    debug!(%peer, "client disconnected");
                    break;
                }
                Err(e) => {
                    debug!(%peer, error = %e, "dropping connection");
                    break;
                }
            };

            let response = self.respond(payload).await;
            if let Err(e) = self.send_response(response).await {
                debug!(%peer, error = %e, "failed to send response");
                break;
            }
            served += 1;
        }

        let _ = self.channel.close().await;
        info!(%peer, served, "connection closed");
    }

    async fn respond(&self, payload: Value) -> CallResponse {
        let request = match CallRequest::from_value(payload) {
            Ok(request) => request,
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "malformed request");
                return CallResponse::from(Err::<Value, _>(e));
            }
        };

        let (method, args) = request.into_parts();
        debug!(peer = %self.peer, %method, args = args.len(), "call");

        if method == PING_METHOD {
            CallResponse::Ok(Value::from(PONG))
        } else if method == METHODS_METHOD {
            CallResponse::Ok(Value::from(self.registry.method_names()))
        } else {
            self.dispatch(method, args).await
        }
    }

    /// Run the method on the blocking pool so a slow method cannot hold up
    /// other connections sharing the runtime's workers
    async fn dispatch(&self, method: String, args: Args) -> CallResponse {
        let registry = Arc::clone(&self.registry);
        let outcome =
            tokio::task::spawn_blocking(move || registry.dispatch(&method, args)).await;

        match outcome {
            Ok(result) => result.into(),
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "method task failed");
                CallResponse::error(ErrorKind::Dispatch, format!("method task failed: {e}"))
            }
        }
    }

    async fn send_response(&mut self, response: CallResponse) -> wirecall_fabric::Result<()> {
        match self.channel.send(&response).await {
            // Nothing was written, so the connection is still in step
            Err(FabricError::FrameTooLarge { size, max }) => {
                warn!(peer = %self.peer, size, max, "response exceeds frame limit");
                let fallback = CallResponse::error(
                    ErrorKind::FrameTooLarge,
                    format!("response of {size} bytes exceeds the frame limit of {max} bytes"),
                );
                self.channel.send(&fallback).await
            }
            other => other,
        }
    }

    async fn reject_oversized(&mut self, size: usize, max: usize) {
        if size > MAX_DISCARD {
            return;
        }
        if self.channel.discard(size).await.is_err() {
            return;
        }
        let response = CallResponse::error(
            ErrorKind::FrameTooLarge,
            format!("request of {size} bytes exceeds the frame limit of {max} bytes"),
        );
        let _ = self.channel.send(&response).await;
    }
}

/// Tell a connection over the limit that the server is busy, then close it.
///
/// The reply is sent first and the write half shut down; anything the client
/// sends afterwards is drained until it hangs up, so the close is not turned
/// into a reset that would swallow the reply.
pub async fn reject_busy(mut transport: TcpTransport, peer: SocketAddr) {
    let response = CallResponse::error(ErrorKind::ServerBusy, "connection limit reached");
    let Ok(bytes) = serde_json::to_vec(&response) else {
        return;
    };
    if transport.send(&bytes).await.is_err() {
        return;
    }
    let _ = transport.close().await;

    let drain = async {
        loop {
            match transport.receive().await {
                Ok(_) => continue,
                Err(FabricError::FrameTooLarge { size, .. }) => {
                    if transport.discard(size).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    };
    let _ = tokio::time::timeout(BUSY_LINGER, drain).await;
    debug!(%peer, "rejected connection closed");
}
