use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenriskError {
    /// A required top-level field is missing or has the wrong shape.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Signature type tag not recognized, or data that disagrees with the signature.
    #[error("Schema error: {0}")]
    Schema(String),

    /// The record cannot be written as a valid document.
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GenriskError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GenriskError>;
