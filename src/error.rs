use thiserror::Error;

/// Domain failures. I/O and parse errors from `csv`/`serde_json` are boxed
/// alongside these through `Box<dyn Error>`.
#[derive(Debug, Error)]
pub enum GdhiError {
    #[error("unknown WRSI product code '{0}'")]
    UnknownProduct(String),

    #[error("{file}: missing required column '{column}'")]
    MissingColumn { file: String, column: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} not found (404); the file is probably not published yet")]
    NotFound(String),

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },
}
