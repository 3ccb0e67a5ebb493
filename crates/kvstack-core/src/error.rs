use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("key must not be empty")]
    EmptyKey,

    #[error("value must not be empty")]
    EmptyValue,

    #[error("store is closed")]
    Closed,
}

impl Error {
    /// True for the ordinary miss outcome, which maps to 404 at the HTTP
    /// boundary rather than 500.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_))
    }

    /// True for errors caused by the caller's input rather than the engine.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::EmptyKey | Error::EmptyValue)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
