//! Application error taxonomy.
//!
//! Remote failures are translated here, at the client boundary, so that
//! workflow code and HTTP handlers only ever see these variants.

use crate::github::GitHubError;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Server-class or transport failure that survived the retry budget
    #[error("Remote service unavailable: {0}")]
    Transient(String),

    /// Bad filename, oversized content, malformed request
    #[error("Invalid request: {0}")]
    Validation(String),

    /// No credential, or the credential was rejected
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    /// Authenticated but not allowed
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Stale write or merge conflict that needs the caller to reload or resolve
    #[error("Conflict: {message}")]
    Conflict { message: String, hint: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Hosting or translation quota exhausted
    #[error("Rate limit exceeded: {message}")]
    Quota {
        message: String,
        reset_at: Option<DateTime<Utc>>,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }

    /// Short machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Transient(_) => "transient",
            AppError::Validation(_) => "validation",
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict { .. } => "conflict",
            AppError::NotFound { .. } => "not_found",
            AppError::Quota { .. } => "quota",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict { .. })
    }

    /// What the user can do about it.
    pub fn hint(&self) -> String {
        match self {
            AppError::Transient(_) => "GitHub or the translation service is having trouble. Try again in a few minutes.".to_string(),
            AppError::Validation(_) => "Check the request and try again.".to_string(),
            AppError::Unauthenticated(_) => "Sign in again; your GitHub session is missing or was revoked.".to_string(),
            AppError::Forbidden(_) => "Your account does not have permission for this action.".to_string(),
            AppError::Conflict { hint, .. } => hint.clone(),
            AppError::NotFound { .. } => "Check the project, language and file name.".to_string(),
            AppError::Quota { reset_at, .. } => match reset_at {
                Some(at) => format!("Try again after {}.", at.format("%H:%M UTC")),
                None => "Try again later.".to_string(),
            },
            AppError::Internal(_) => "Something went wrong on our side.".to_string(),
        }
    }

    /// Message safe to show an end user. In production, internal failures are
    /// reduced to a generic sentence.
    pub fn public_message(&self, production: bool) -> String {
        match self {
            AppError::Internal(_) if production => "Internal server error".to_string(),
            AppError::Transient(_) if production => "Remote service unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<GitHubError> for AppError {
    fn from(err: GitHubError) -> Self {
        if err.is_rate_limited() {
            return AppError::Quota {
                message: "GitHub API quota exhausted".to_string(),
                reset_at: err.rate_limit().and_then(|r| r.reset_at),
            };
        }

        match &err {
            GitHubError::Timeout { .. } | GitHubError::Network { .. } => {
                AppError::Transient(err.to_string())
            }
            GitHubError::Decode { .. } => AppError::internal(err.to_string()),
            GitHubError::Status { status, path, body, .. } => match *status {
                s if s >= 500 => AppError::Transient(err.to_string()),
                401 => AppError::Unauthenticated(body.message.clone()),
                403 => AppError::Forbidden(body.message.clone()),
                404 => AppError::not_found("GitHub resource", path.clone()),
                409 | 422 if err.is_stale_sha() => AppError::conflict(
                    body.message.clone(),
                    "The file changed since you loaded it. Reload the latest version and retry.",
                ),
                _ => AppError::Validation(format!("GitHub rejected the request: {}", body.message)),
            },
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}
