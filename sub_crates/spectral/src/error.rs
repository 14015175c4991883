#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed spectral data file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Format(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    OutOfRange(String),
}
