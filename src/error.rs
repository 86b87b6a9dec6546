// src/error.rs

use std::fmt::Display;
use thiserror::Error;
use warp::http::StatusCode;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a request can end in. Each variant maps to exactly one
/// HTTP status via [`Error::status_code`].
#[derive(Debug, Error)]
pub enum Error {
    /// The dataset registry is missing, unreadable or not valid JSON.
    #[error("dataset registry {path} could not be loaded: {message}")]
    Configuration { path: String, message: String },

    #[error("Dataset '{0}' not found in the registry.")]
    DatasetNotFound(String),

    #[error("File '{0}' not found in the data folder.")]
    FileNotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Unsupported file format for '{0}'")]
    UnsupportedFormat(String),

    /// The external data provider refused or failed the download.
    #[error("{0}")]
    Provider(String),

    /// Local I/O or archive handling failed while storing a download.
    #[error("Error downloading dataset: {0}")]
    Fetch(String),

    #[error("Error parsing '{filename}': {message}")]
    Parse { filename: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn configuration(path: impl Display, err: impl Display) -> Self {
        Error::Configuration {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub fn parse(filename: &str, err: impl Display) -> Self {
        Error::Parse {
            filename: filename.to_string(),
            message: err.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::DatasetNotFound(_) | Error::FileNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) | Error::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            Error::Configuration { .. }
            | Error::Provider(_)
            | Error::Fetch(_)
            | Error::Parse { .. }
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("background task failed: {err}"))
    }
}
