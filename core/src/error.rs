//! Error kinds for the mapping engine.
//!
//! Most failure modes degrade gracefully inside the coordinator and never
//! reach the caller as an `Err`. Only `InvalidInput`, `UnknownSystem`,
//! `RuleValidationError`, and `InternalError` are meant to surface from the
//! public API; the rest are caught at the coordinator boundary and folded
//! into `processing_metadata`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("unknown system: {message}")]
    UnknownSystem { message: String },

    #[error("vocabulary unavailable: {message}")]
    VocabularyUnavailable {
        message: String,
        #[source]
        cause: Option<anyhow::Error>,
    },

    #[error("rule validation failed: {message}")]
    RuleValidationError { message: String },

    #[error("rule store error: {message}")]
    RuleStoreError {
        message: String,
        #[source]
        cause: Option<anyhow::Error>,
    },

    #[error("cache error: {message}")]
    CacheError {
        message: String,
        #[source]
        cause: Option<anyhow::Error>,
    },

    #[error("operation timed out: {message}")]
    Timeout { message: String },

    #[error("internal error [{error_id}]: {message}")]
    InternalError { error_id: String, message: String },
}

impl MapperError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn unknown_system(system: &str) -> Self {
        Self::UnknownSystem {
            message: format!("system '{system}' is not configured"),
        }
    }

    pub fn vocabulary_unavailable(message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::VocabularyUnavailable {
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn rule_validation(message: impl Into<String>) -> Self {
        Self::RuleValidationError {
            message: message.into(),
        }
    }

    pub fn rule_store(message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::RuleStoreError {
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn cache(message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::CacheError {
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Internal error with a stable id so it can be correlated in logs,
    /// without leaking internal detail to the caller.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        let error_id = uuid::Uuid::new_v4().to_string();
        tracing::error!(%error_id, %message, "internal error");
        Self::InternalError {
            error_id,
            message: "an internal error occurred".to_string(),
        }
    }
}

pub type MapperResult<T> = Result<T, MapperError>;
