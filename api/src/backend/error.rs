use std::sync::LazyLock;

use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiRequestError;

/// Postgres `insufficient_privilege`, raised when a row-level policy rejects a write.
pub const INSUFFICIENT_PRIVILEGE: &str = "42501";

static POLICY_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)policy|rls").expect("valid regex"));

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("{message}")]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },

    #[error("Backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid backend URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Unexpected response from backend: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The union of the error shapes returned by the table API and the auth API.
#[derive(Deserialize, Default)]
struct ErrorBody {
    code: Option<Value>,
    error_code: Option<String>,
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl BackendError {
    pub fn from_body(status: StatusCode, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

        let code = parsed.error_code.or(match parsed.code {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });

        let message = parsed
            .message
            .or(parsed.msg)
            .or(parsed.error_description)
            .or(parsed.error)
            .filter(|m| !m.trim().is_empty())
            .or_else(|| {
                let body = body.trim();
                (!body.is_empty() && !body.starts_with('{')).then(|| body.to_string())
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown backend error")
                    .to_string()
            });

        BackendError::Api {
            status,
            code,
            message,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            BackendError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            BackendError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a row-level security policy refused the operation.
    pub fn is_policy_violation(&self) -> bool {
        if self.code() == Some(INSUFFICIENT_PRIVILEGE) {
            return true;
        }
        matches!(self, BackendError::Api { message, .. } if POLICY_MESSAGE.is_match(message))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self.status(),
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        )
    }
}

impl ApiRequestError for BackendError {
    fn status_code(&self) -> StatusCode {
        match self {
            BackendError::Api { status, .. } if status.is_client_error() => *status,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            BackendError::Api { status, .. } if status.is_client_error() => "BACKEND_REJECTED",
            _ => "BACKEND_ERR",
        }
    }
}
