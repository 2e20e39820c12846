//! Wire shapes exchanged per call.
//!
//! A request travels as the JSON array `[method, args, kwargs]`. A response is a
//! discriminated envelope, so a method that returns the string `"boom"` cannot be
//! confused with a call that failed with the message `"boom"`:
//!
//! ```text
//! {"ok": true,  "value": <any>}
//! {"ok": false, "error": {"kind": "unknown_method", "message": "..."}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::args::Args;
use crate::error::Error;

/// Reserved method answered by the server itself with `"pong"`
pub const PING_METHOD: &str = "rpc.ping";

/// Reserved method returning the sorted list of registered method names
pub const METHODS_METHOD: &str = "rpc.methods";

/// Prefix that user methods may not register under
pub const RESERVED_PREFIX: &str = "rpc.";

pub const PONG: &str = "pong";

/// A single call: method name plus positional and keyword arguments
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "WireRequest", into = "WireRequest")]
pub struct CallRequest {
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct WireRequest(String, Vec<Value>, Map<String, Value>);

impl From<WireRequest> for CallRequest {
    fn from(WireRequest(method, args, kwargs): WireRequest) -> Self {
        Self {
            method,
            args,
            kwargs,
        }
    }
}

impl From<CallRequest> for WireRequest {
    fn from(req: CallRequest) -> Self {
        WireRequest(req.method, req.args, req.kwargs)
    }
}

impl CallRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Interpret an already-parsed JSON payload as a request.
    ///
    /// Any shape other than `[string, array, object]` is a malformed request.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(|e| Error::MalformedRequest(e.to_string()))
    }

    /// Split into the method name and the arguments handed to the callable
    pub fn into_parts(self) -> (String, Args) {
        (self.method, Args::new(self.args, self.kwargs))
    }
}

/// Category of a failed call, as reported on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownMethod,
    Dispatch,
    MalformedRequest,
    FrameTooLarge,
    ServerBusy,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnknownMethod => "unknown method",
            Self::Dispatch => "dispatch error",
            Self::MalformedRequest => "malformed request",
            Self::FrameTooLarge => "frame too large",
            Self::ServerBusy => "server busy",
        };
        f.write_str(s)
    }
}

/// Error half of a response envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<Error> for RemoteError {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        // The kind already says what went wrong; keep the bare message.
        let message = match err {
            Error::InvalidRegistration(m)
            | Error::UnknownMethod(m)
            | Error::MalformedRequest(m)
            | Error::Dispatch(m) => m,
        };
        Self { kind, message }
    }
}

/// Outcome of a call as sent back to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Envelope", into = "Envelope")]
pub enum CallResponse {
    Ok(Value),
    Err(RemoteError),
}

impl CallResponse {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Err(RemoteError::new(kind, message))
    }

    pub fn into_result(self) -> Result<Value, RemoteError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Err(err) => Err(err),
        }
    }
}

impl From<Result<Value, Error>> for CallResponse {
    fn from(result: Result<Value, Error>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(err) => Self::Err(err.into()),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RemoteError>,
}

impl From<CallResponse> for Envelope {
    fn from(resp: CallResponse) -> Self {
        match resp {
            CallResponse::Ok(value) => Envelope {
                ok: true,
                value: Some(value),
                error: None,
            },
            CallResponse::Err(error) => Envelope {
                ok: false,
                value: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<Envelope> for CallResponse {
    type Error = String;

    fn try_from(env: Envelope) -> Result<Self, Self::Error> {
        match (env.ok, env.error) {
            // `"value": null` deserializes to None
            (true, _) => Ok(CallResponse::Ok(env.value.unwrap_or(Value::Null))),
            (false, Some(error)) => Ok(CallResponse::Err(error)),
            (false, None) => Err("error envelope without an error field".to_string()),
        }
    }
}
