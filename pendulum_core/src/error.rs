use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SorterError {
    #[error("link error: {0}")]
    Link(String),
    #[error("link fault: {0}")]
    LinkFault(String),
    #[error("timeout connecting to controller")]
    Timeout,
    #[error("controller link not connected")]
    NotConnected,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing device link")]
    MissingLink,
    #[error("missing link event receiver")]
    MissingEvents,
    #[error("missing history sink")]
    MissingHistory,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
