use thiserror::Error;

/// Core errors for the collector
#[derive(Error, Debug)]
pub enum CoreError {
    /// The target could not be reached, authenticated, or did not answer in time.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Command output did not match the expected grammar.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The persisted snapshot could not be read or written, even after retries.
    #[error("Store IO error: {0}")]
    StoreIo(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(unix)]
    #[error("Unix system error: {0}")]
    Unix(#[from] nix::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    pub fn store_io<S: Into<String>>(msg: S) -> Self {
        Self::StoreIo(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Whether an agent can make no further progress after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StoreIo(_))
    }
}
