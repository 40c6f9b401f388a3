//! Error type shared by every core module.

use thiserror::Error;

/// Errors surfaced by the core library.
///
/// Non-2xx responses from GitHub are *not* errors: the repository client hands
/// the status back to the caller. `Api` is reserved for endpoints where a
/// non-success status means the operation itself failed (Gmail, OAuth).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// True for failures detected before any network call was made.
    pub fn is_validation(&self) -> bool {
        matches!(self, CoreError::Validation(_))
    }
}
