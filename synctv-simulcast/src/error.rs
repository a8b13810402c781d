use thiserror::Error;

/// Failure to deliver an out-of-band message to an endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Data channel is not open")]
    ChannelClosed,

    #[error("Failed to send message: {0}")]
    Send(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
