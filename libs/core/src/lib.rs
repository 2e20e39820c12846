//! Wirecall Core - shared data model
//!
//! Call requests and discriminated responses as they travel on the wire, the
//! arguments a registered method receives, and the errors raised while
//! registering or dispatching methods.

pub mod args;
pub mod error;
pub mod protocol;

pub use args::Args;
pub use error::{Error, Result};
pub use protocol::{CallRequest, CallResponse, ErrorKind, RemoteError};
