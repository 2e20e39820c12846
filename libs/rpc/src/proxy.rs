use serde::de::DeserializeOwned;
use serde_json::Value;
use wirecall_core::CallRequest;

use crate::client::Client;
use crate::error::{Error, Result};

/// A call to one named method, built up argument by argument
///
/// ```no_run
/// # async fn example(client: &mut wirecall_rpc::Client) -> wirecall_rpc::Result<()> {
/// let sum = client.method("add").arg(2).kwarg("b", 3).send().await?;
/// # Ok(())
/// # }
/// ```
#[must_use = "a method call does nothing until `send` is awaited"]
pub struct MethodCall<'c> {
    client: &'c mut Client,
    request: CallRequest,
}

impl<'c> MethodCall<'c> {
    pub(crate) fn new(client: &'c mut Client, request: CallRequest) -> Self {
        Self { client, request }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.request.args.push(value.into());
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.request.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.request.kwargs.insert(name.into(), value.into());
        self
    }

    pub fn request(&self) -> &CallRequest {
        &self.request
    }

    pub async fn send(self) -> Result<Value> {
        self.client.send_request(&self.request).await
    }

    pub async fn send_as<R: DeserializeOwned>(self) -> Result<R> {
        let value = self.send().await?;
        serde_json::from_value(value).map_err(|e| Error::UnexpectedResponse(e.to_string()))
    }
}
