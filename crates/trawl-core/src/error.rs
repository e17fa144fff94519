use thiserror::Error;

/// Failures raised by a model backend (embedding or completion endpoint).
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("request to model backend timed out: {0}")]
    Timeout(String),

    #[error("model backend answered with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model backend unreachable: {0}")]
    Transport(String),

    #[error("invalid response from model backend: {0}")]
    InvalidResponse(String),

    #[error("operation not supported by model {0}")]
    Unsupported(String),
}

impl ModelError {
    /// Transient timeouts are the only failures worth retrying.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ModelError::Timeout(_))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Collection not found")]
    CollectionNotFound,

    #[error("Insufficient rights")]
    InsufficientRights,

    #[error("Wrong model type: expected {expected}, got {found}")]
    WrongModelType { expected: String, found: String },

    #[error("Different collections models")]
    DifferentCollectionsModels,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl Error {
    /// Stable code for mapping onto a transport status at the boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::CollectionNotFound => "collection_not_found",
            Error::InsufficientRights => "insufficient_rights",
            Error::WrongModelType { .. } => "wrong_model_type",
            Error::DifferentCollectionsModels => "different_collections_models",
            Error::ModelNotFound(_) => "model_not_found",
            Error::DimensionMismatch { .. } => "dimension_mismatch",
            Error::InvalidConfig(_) => "invalid_config",
            Error::NotFound(_) => "not_found",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Storage(_) => "storage",
            Error::Model(e) if e.is_timeout() => "model_timeout",
            Error::Model(_) => "model",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
