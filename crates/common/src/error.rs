use sqlparser::parser::ParserError;
use thiserror::Error;

/// Unified error type for Rowstream crates.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("SQL parsing error: {0}")]
    SqlParser(#[from] ParserError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures raised while acquiring or holding a connection.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// True for malformed queries and schema mismatches, parse failures included.
    pub fn is_query(&self) -> bool {
        matches!(self, Error::Query(_) | Error::SqlParser(_))
    }
}
