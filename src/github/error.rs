use super::rate_limit::RateLimitSnapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured body GitHub attaches to non-2xx responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<serde_json::Value>,
}

impl ErrorBody {
    /// Parse a response body, falling back to the raw text (truncated) when it is not JSON.
    pub fn from_text(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| ErrorBody {
            message: text.chars().take(300).collect(),
            ..Default::default()
        })
    }
}

/// Every way a GitHub call can fail, as seen by callers of [`super::GitHubClient`].
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API error ({status}) on {path}: {}", .body.message)]
    Status {
        status: u16,
        path: String,
        body: ErrorBody,
        rate_limit: Option<RateLimitSnapshot>,
    },

    #[error("GitHub request to {path} timed out")]
    Timeout { path: String },

    #[error("GitHub request to {path} failed: {message}")]
    Network { path: String, message: String },

    #[error("Failed to decode GitHub response from {path}: {message}")]
    Decode { path: String, message: String },
}

impl GitHubError {
    pub(crate) fn from_transport(path: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            GitHubError::Timeout {
                path: path.to_string(),
            }
        } else {
            GitHubError::Network {
                path: path.to_string(),
                message: error.to_string(),
            }
        }
    }

    pub(crate) fn decode(path: &str, message: impl Into<String>) -> Self {
        GitHubError::Decode {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message from the structured error body (empty for transport failures).
    pub fn message(&self) -> &str {
        match self {
            GitHubError::Status { body, .. } => &body.message,
            _ => "",
        }
    }

    /// Server-class failures, timeouts and dropped connections are transient.
    /// Client errors (4xx) are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            GitHubError::Status { status, .. } => *status >= 500,
            GitHubError::Timeout { .. } | GitHubError::Network { .. } => true,
            GitHubError::Decode { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn is_unprocessable(&self) -> bool {
        self.status() == Some(422)
    }

    /// A content write rejected because the expected blob sha no longer matches.
    /// GitHub answers 409, or 422 with a message naming the sha.
    pub fn is_stale_sha(&self) -> bool {
        self.is_conflict() || (self.is_unprocessable() && self.message().contains("sha"))
    }

    /// The request was refused because the API quota is spent.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            GitHubError::Status {
                status, rate_limit, ..
            } => {
                *status == 429
                    || (*status == 403 && rate_limit.as_ref().is_some_and(|r| r.remaining == 0))
            }
            _ => false,
        }
    }

    pub fn rate_limit(&self) -> Option<&RateLimitSnapshot> {
        match self {
            GitHubError::Status { rate_limit, .. } => rate_limit.as_ref(),
            _ => None,
        }
    }
}
