use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("connect to {addr} timed out after {timeout_ms} ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },
    #[error("cannot resolve controller address {0}")]
    Resolve(String),
    #[error("link not connected")]
    NotConnected,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
