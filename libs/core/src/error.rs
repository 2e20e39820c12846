use thiserror::Error;

use crate::protocol::ErrorKind;

/// Errors raised while registering or dispatching a method
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("{0}")]
    Dispatch(String),
}

impl Error {
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }

    /// Wire-level kind reported to the caller for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownMethod(_) => ErrorKind::UnknownMethod,
            Self::MalformedRequest(_) => ErrorKind::MalformedRequest,
            Self::InvalidRegistration(_) | Self::Dispatch(_) => ErrorKind::Dispatch,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
