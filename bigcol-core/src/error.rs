use std::path::PathBuf;

use arrow_schema::ArrowError;

pub type BigColResult<T> = std::result::Result<T, BigColError>;

#[derive(Debug, thiserror::Error)]
pub enum BigColError {
    #[error("Block '{name}' not found under {path}")]
    NotFound { name: String, path: PathBuf },
    #[error("Block '{name}' already exists under {path}")]
    AlreadyExists { name: String, path: PathBuf },
    #[error("Malformed block metadata at {path}: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("Range [{start}, {stop}) is out of bounds for block '{name}' with size {size}")]
    Range {
        name: String,
        start: usize,
        stop: usize,
        size: usize,
    },
    #[error("Block '{name}' has been closed")]
    Closed { name: String },
    #[error("Dataset columns differ in length: '{expected_name}' has {expected} elements but '{name}' has {actual}")]
    LengthMismatch {
        expected_name: String,
        expected: usize,
        name: String,
        actual: usize,
    },
    #[error("Invalid dataset configuration: {0}")]
    Configuration(String),
    #[error("Data type mismatch for block '{name}': expected {expected}, got {actual}")]
    DTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),
    #[error("Invalid block name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

impl BigColError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BigColError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BigColError::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
