use serde_json::json;
use thiserror::Error;

/// Domain failure surfaced to the caller. Storage problems travel as
/// `anyhow` chains inside `Storage`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    AuthFailed(String),

    #[error("{0:#}")]
    Storage(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Stable wire code for the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "bad_params",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::AuthFailed(_) => "auth_failed",
            AppError::Storage(_) => "io_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Storage(e) => Some(json!({
                "chain": e.chain().map(|c| c.to_string()).collect::<Vec<_>>()
            })),
            _ => None,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn codes_follow_error_class() {
        assert_eq!(AppError::validation("x").code(), "bad_params");
        assert_eq!(AppError::not_found("x").code(), "not_found");
        assert_eq!(AppError::forbidden("x").code(), "forbidden");
        assert_eq!(AppError::Conflict("x".into()).code(), "conflict");
    }

    #[test]
    fn storage_errors_keep_context_chain() {
        let inner: anyhow::Result<()> = Err(anyhow::anyhow!("disk full"));
        let e: AppError = inner.context("failed to write sessions.json").unwrap_err().into();
        assert_eq!(e.code(), "io_failed");
        let msg = e.to_string();
        assert!(msg.contains("sessions.json"));
        assert!(msg.contains("disk full"));
        let chain = e.details().expect("details");
        assert_eq!(chain["chain"].as_array().map(|a| a.len()), Some(2));
    }
}
