use thiserror::Error;

pub type CrmResult<T> = Result<T, CrmError>;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported field: {0}")]
    UnsupportedField(String),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for CrmError {
    fn from(err: config::ConfigError) -> Self {
        CrmError::Config(err.to_string())
    }
}

impl CrmError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CrmError::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CrmError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Errors caused by caller input, as opposed to collaborator failures.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CrmError::Validation(_) | CrmError::UnsupportedField(_) | CrmError::InvalidTransition(_)
        )
    }
}
