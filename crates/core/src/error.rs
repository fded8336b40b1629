use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("{collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Admin roster is not configured")]
    MissingAdminRoster,
}

impl EngineError {
    pub fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            collection,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
