use thiserror::Error;

use wirecall_core::RemoteError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] wirecall_fabric::Error),

    #[error(transparent)]
    Registry(#[from] wirecall_core::Error),

    /// The server answered with an error envelope
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Not connected")]
    NotConnected,

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// The server's error envelope, if this is one
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
