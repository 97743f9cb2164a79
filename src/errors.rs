//! Errors for ACARS recorder
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcarsRecorderError {
    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Failed to bind UDP socket on {addr}")]
    BindError {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed message: {0}")]
    NormalizationError(String),

    #[error("Database connection error: {0}")]
    DatabaseConnectionError(String),

    #[error("Database write failed")]
    StoreWriteError(#[source] sqlx::Error),

    #[error("Database read failed")]
    StoreReadError(#[source] sqlx::Error),

    #[error("Export stream interrupted by client")]
    StreamInterrupted,

    #[error("Spreadsheet error")]
    SpreadsheetError(#[from] rust_xlsxwriter::XlsxError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
