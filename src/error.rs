//! Error types
//!
//! `ServeError` covers everything that can go wrong while answering a file
//! request; `ConfigError` covers startup configuration problems.

use hyper::StatusCode;
use std::net::AddrParseError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while resolving or reading a file for a response
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("file not found")]
    NotFound,

    #[error("path escapes the frontend directory: {0}")]
    Forbidden(String),

    #[error("malformed request path: {0}")]
    BadRequest(String),

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServeError {
    /// HTTP status reported to the client
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Configuration could not be loaded or is unusable
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid listen address '{addr}': {source}")]
    Address {
        addr: String,
        #[source]
        source: AddrParseError,
    },
}
