//! Client side: one outbound connection, one outstanding call at a time.
//!
//! Every operation takes `&mut self`, so a liveness check can never
//! interleave with a call that is still waiting for its response.

use std::net::SocketAddr;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;
use wirecall_core::protocol::{METHODS_METHOD, PING_METHOD, PONG};
use wirecall_core::{CallRequest, CallResponse};
use wirecall_fabric::codec::JsonCodec;
use wirecall_fabric::request::request_with;
use wirecall_fabric::transport::TcpTransportBuilder;
use wirecall_fabric::{Channel, Error as FabricError};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::proxy::MethodCall;

pub struct Client {
    channel: Option<Channel<JsonCodec>>,
    config: ClientConfig,
    advertised: Vec<String>,
}

impl Client {
    /// Connect to `addr` with default settings
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let config = ClientConfig::default()
            .with_host(addr.ip().to_string())
            .with_port(addr.port());
        Self::connect_with(config).await
    }

    /// Connect using `config` and fetch the server's method list
    pub async fn connect_with(config: ClientConfig) -> Result<Self> {
        let channel = Channel::connect(transport_builder(&config), JsonCodec).await?;
        let mut client = Self {
            channel: Some(channel),
            config,
            advertised: Vec::new(),
        };
        client.methods().await?;
        debug!(
            target = %client.config.target(),
            methods = client.advertised.len(),
            "client connected"
        );
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether a connection is held; does not touch the network
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Close the connection. Calling this again is a no-op.
    pub async fn disconnect(&mut self) {
        if let Some(channel) = self.channel.take() {
            // The peer may already be gone
            let _ = channel.close().await;
            debug!(target = %self.config.target(), "client disconnected");
        }
    }

    /// Probe the connection with a ping round trip
    pub async fn is_connected(&mut self) -> bool {
        if self.channel.is_none() {
            return false;
        }
        let ping = CallRequest::new(PING_METHOD);
        matches!(
            self.exchange(&ping).await,
            Ok(CallResponse::Ok(Value::String(ref reply))) if reply == PONG
        )
    }

    /// Fetch the names the server advertises and remember them
    pub async fn methods(&mut self) -> Result<Vec<String>> {
        let names: Vec<String> = self
            .call(METHODS_METHOD, Vec::new(), Map::new())
            .await
            .and_then(|value| {
                serde_json::from_value(value)
                    .map_err(|e| Error::UnexpectedResponse(e.to_string()))
            })?;
        self.advertised = names.clone();
        Ok(names)
    }

    /// Method names from the most recent [`Client::methods`] call
    pub fn advertised_methods(&self) -> &[String] {
        &self.advertised
    }

    /// Call `method` and wait for its result.
    ///
    /// The server's error envelope comes back as [`Error::Remote`]; the name is
    /// not checked against the advertised list first.
    pub async fn call(
        &mut self,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value> {
        let request = CallRequest::new(method)
            .with_args(args)
            .with_kwargs(kwargs);
        self.send_request(&request).await
    }

    /// Call with positional arguments taken from anything that serializes
    /// to a JSON array, such as a tuple or a `Vec`
    pub async fn call_with<A: Serialize>(&mut self, method: &str, args: A) -> Result<Value> {
        let args = match serde_json::to_value(args) {
            Ok(Value::Array(items)) => items,
            Ok(Value::Null) => Vec::new(),
            Ok(other) => {
                return Err(Error::InvalidArguments(format!(
                    "expected a sequence of arguments, got {other}"
                )))
            }
            Err(e) => return Err(Error::InvalidArguments(e.to_string())),
        };
        self.call(method, args, Map::new()).await
    }

    /// Like [`Client::call_with`], decoding the result into `R`
    pub async fn call_as<R, A>(&mut self, method: &str, args: A) -> Result<R>
    where
        R: DeserializeOwned,
        A: Serialize,
    {
        let value = self.call_with(method, args).await?;
        serde_json::from_value(value).map_err(|e| Error::UnexpectedResponse(e.to_string()))
    }

    /// Start building a call to `name`
    pub fn method(&mut self, name: impl Into<String>) -> MethodCall<'_> {
        MethodCall::new(self, CallRequest::new(name))
    }

    pub(crate) async fn send_request(&mut self, request: &CallRequest) -> Result<Value> {
        let response = self.exchange(request).await?;
        Ok(response.into_result()?)
    }

    async fn exchange(&mut self, request: &CallRequest) -> Result<CallResponse> {
        let channel = self.channel.as_mut().ok_or(Error::NotConnected)?;

        if let Err(e) = channel.send(request).await {
            // An oversized request is refused before anything is written
            if !matches!(e, FabricError::FrameTooLarge { .. }) {
                self.channel = None;
            }
            return Err(e.into());
        }

        match channel.receive::<CallResponse>().await {
            Ok(response) => Ok(response),
            Err(e) => {
                debug!(method = %request.method, error = %e, "connection lost during call");
                self.channel = None;
                Err(e.into())
            }
        }
    }
}

fn transport_builder(config: &ClientConfig) -> TcpTransportBuilder {
    let mut builder = TcpTransportBuilder::new()
        .host(&config.host, config.port)
        .max_frame_size(config.max_frame_size);
    if let Some(timeout) = config.connect_timeout() {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(timeout) = config.request_timeout() {
        builder = builder.send_timeout(timeout).receive_timeout(timeout);
    }
    builder
}

/// Connect, perform a single call, and disconnect
pub async fn call_once(config: &ClientConfig, request: &CallRequest) -> Result<Value> {
    let response: CallResponse = request_with(transport_builder(config), request, JsonCodec).await?;
    Ok(response.into_result()?)
}
