use thiserror::Error;

/// Top-level error type for the Vitrine system.
///
/// Variants map to the failure surfaces a conversation turn can hit: the
/// embedding backend, the vector index, the catalog, message delivery, and
/// report persistence. Subsystem crates construct these directly or provide
/// `From` conversions so the `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VitrineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Encoding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for VitrineError {
    fn from(err: toml::de::Error) -> Self {
        VitrineError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for VitrineError {
    fn from(err: toml::ser::Error) -> Self {
        VitrineError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for VitrineError {
    fn from(err: serde_json::Error) -> Self {
        VitrineError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Vitrine operations.
pub type Result<T> = std::result::Result<T, VitrineError>;
