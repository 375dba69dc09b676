use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Invalid score value for {field} at {location}: {detail}")]
    InvalidScoreValue {
        field: String,
        location: String,
        detail: String,
    },

    #[error("Invalid visit sequence {value} for record {record_id} (must be an integer >= 1)")]
    InvalidVisitSequence { record_id: String, value: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
