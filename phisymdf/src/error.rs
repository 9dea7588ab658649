//! Error types for schema mapping and dataset I/O

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Failure inside the reduction engine
    #[error(transparent)]
    Core(#[from] phisym::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Branch prefix that maps to no known record
    #[error("Unknown collection `{0}`")]
    UnknownCollection(String),

    /// Required field absent from a collection
    #[error("Collection `{collection}` has no field `{field}`")]
    MissingField { collection: String, field: String },

    /// Column whose content cannot be converted
    #[error("Column `{name}`: {reason}")]
    Column { name: String, reason: String },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
