//! Error types for depspec operations

use depspec_core::{ParseError, PathError};
use std::io;
use thiserror::Error;

/// The main error type for depspec operations
///
/// Every failure is fatal for the generation run: nothing is retried and no
/// partially published state is reported as success.
#[derive(Error, Debug)]
pub enum DepSpecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(
        "Unsupported depspec revision '{0}'. This version of depspec only supports revision '1.0'"
    )]
    UnsupportedRevision(String),
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    #[error("Schema file not found: {0}")]
    NoSchema(String),
    #[error("Schema violation: {0}")]
    SchemaViolation(#[from] PathError),
    #[error(
        "'{operation}' is not allowed for a unit in {mode} mode: the owner unit publishes, consumer units resolve"
    )]
    IllegalModeAccess {
        operation: &'static str,
        mode: &'static str,
    },
    #[error("Missing bootstrap input '{0}'")]
    MissingBootstrapInput(&'static str),
    #[error("Invalid bootstrap input: {0}")]
    InvalidBootstrapInput(String),
    #[error("Invalid payload:\n{0}")]
    InvalidPayload(String),
    #[error("Store backend '{0}' not found")]
    StoreNotFound(String),
    #[error("Store operation failed: {0}")]
    StoreFailure(String),
    #[error("Reference could not be resolved: {0}")]
    UnresolvedReference(String),
}

/// A type alias for `Result<T, DepSpecError>`
pub type Result<T> = std::result::Result<T, DepSpecError>;

impl From<ParseError> for DepSpecError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Io(io_err) => {
                if io_err.kind() == io::ErrorKind::NotFound {
                    DepSpecError::NoSchema(io_err.to_string())
                } else {
                    DepSpecError::Io(io_err)
                }
            }
            ParseError::Toml(toml_err) => DepSpecError::Toml(toml_err),
            ParseError::UnsupportedRevision(rev) => DepSpecError::UnsupportedRevision(rev),
            ParseError::Validation(msg) => DepSpecError::InvalidSchema(msg),
        }
    }
}
