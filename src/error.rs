use thiserror::Error;

/// Single error currency for the whole crate: every fallible operation in
/// the core, the parser, and the writer returns `Result<_, Error>`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("index {index} out of bounds for length {length}")]
    OutOfBounds { index: usize, length: usize },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
