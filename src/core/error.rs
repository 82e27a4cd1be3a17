/// dbkit Error Module
///
/// This module defines the error type shared by every dbkit operation.
/// Driver failures are passed through untouched; the wrapper only adds
/// the failures it can detect on its own (credentials, placeholder counts,
/// configuration, use after close).
use thiserror::Error;

/// Error type for all dbkit operations.
///
/// The variants fall into three groups:
/// - Connect-time problems (`Credentials`, `Config`)
/// - Problems the wrapper detects before reaching the driver (`ParameterMismatch`, `Closed`)
/// - Everything the driver or the file system reports (`Driver`, `Backend`, `Io`, `Toml`, `Json`)
#[derive(Error, Debug)]
pub enum DbError {
    /// The driver refused the connection parameters (missing database, cannot open, auth failure)
    #[error("Credentials invalid: {0}")]
    Credentials(String),

    /// A `?`-template contains more placeholders than parameters were supplied
    #[error("Parameter mismatch: {placeholders} placeholder(s) but {params} parameter(s)")]
    ParameterMismatch { placeholders: usize, params: usize },

    /// Errors raised by the SQLite driver, passed through unmodified
    #[error("Database error: {0}")]
    Driver(#[from] rusqlite::Error),

    /// Errors raised by a driver other than SQLite
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The client was already closed
    #[error("Connection is closed")]
    Closed,
}

/// Type alias for Result to use DbError as the error type.
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let db_err = DbError::Driver(rusqlite::Error::ExecuteReturnedResults);
        assert!(db_err.to_string().contains("Database error"));

        let mismatch = DbError::ParameterMismatch { placeholders: 3, params: 1 };
        assert_eq!(
            mismatch.to_string(),
            "Parameter mismatch: 3 placeholder(s) but 1 parameter(s)"
        );

        let cred_err = DbError::Credentials("no database given".to_string());
        assert!(cred_err.to_string().starts_with("Credentials invalid"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DbError = io_err.into();
        match err {
            DbError::Io(_) => {}
            _ => panic!("Expected IO error"),
        }

        let toml_err = toml::from_str::<toml::Value>("[broken").unwrap_err();
        let err: DbError = toml_err.into();
        match err {
            DbError::Toml(_) => {}
            _ => panic!("Expected TOML error"),
        }
    }
}
