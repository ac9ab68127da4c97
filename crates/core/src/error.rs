//! Error types for ltd-conveyor-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ltd-conveyor-core
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ltd-conveyor-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidConfig(String),

    /// Object store errors (list, head, put, copy, delete)
    #[error("S3 error: {0}")]
    S3(String),

    /// A presigned POST upload was rejected by the upload endpoint
    #[error("Error uploading {path} to S3 (HTTP {status})")]
    PresignedUpload { path: String, status: u16 },

    /// No presigned POST URL was issued for a local directory
    #[error("A presigned POST URL is not available for the {0} directory")]
    MissingPresignedUrl(String),

    /// Operation refused because its inputs are inconsistent
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// LTD Keeper API errors
    #[error("LTD Keeper API error: {0}")]
    Keeper(String),

    /// Fastly API errors
    #[error("Fastly API error: {0}")]
    Fastly(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout
    #[error("Operation timed out")]
    Timeout,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else if err.is_connect() {
            Error::Network(err.to_string())
        } else if err.is_request() || err.is_builder() {
            Error::HttpClient(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

// Generic SdkError conversion for all S3 operations
impl<E, R> From<aws_sdk_s3::error::SdkError<E, R>> for Error
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    fn from(err: aws_sdk_s3::error::SdkError<E, R>) -> Self {
        Error::S3(aws_sdk_s3::error::DisplayErrorContext(&err).to_string())
    }
}

impl From<aws_sdk_s3::error::BuildError> for Error {
    fn from(err: aws_sdk_s3::error::BuildError) -> Self {
        Error::S3(err.to_string())
    }
}

impl From<aws_smithy_types::byte_stream::error::Error> for Error {
    fn from(err: aws_smithy_types::byte_stream::error::Error) -> Self {
        Error::S3(format!("Cannot read object body: {}", err))
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        match err.into_io_error() {
            Some(io) => Error::Io(io),
            None => Error::Io(std::io::Error::other("filesystem loop detected")),
        }
    }
}
