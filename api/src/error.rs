use std::collections::HashMap;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::Value;

use crate::{backend::BackendError, comments::CommentError, identity::AuthenticationError};

/// Errors that know which HTTP status they should be reported with.
pub trait ApiRequestError: std::error::Error {
    fn status_code(&self) -> StatusCode;

    fn error_code(&self) -> &'static str {
        "ERR"
    }
}

pub enum AppError {
    Backend {
        error: BackendError,

        #[cfg(debug_assertions)]
        backtrace: Option<backtrace::Backtrace>,
    },
    Request {
        msg: String,
        status: StatusCode,
        code: &'static str,
    },
    Unhandled(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<String>,

    #[cfg(debug_assertions)]
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_info: Option<HashMap<&'static str, Value>>,
}

impl AppError {
    pub fn request(msg: impl Into<String>, status: StatusCode) -> Self {
        AppError::Request {
            msg: msg.into(),
            status,
            code: "ERR",
        }
    }

    fn from_request_error<E: ApiRequestError>(e: &E) -> Self {
        AppError::Request {
            msg: e.to_string(),
            status: e.status_code(),
            code: e.error_code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status_code, error_response) = match self {
            AppError::Backend {
                error,
                #[cfg(debug_assertions)]
                backtrace,
            } => {
                let status = error.status_code();
                if status.is_server_error() {
                    tracing::error!(error = %error, "Backend request failed");
                } else {
                    tracing::debug!(error = %error, "Backend rejected request");
                }

                (
                    status,
                    ErrorResponse {
                        code: error.error_code().into(),
                        // Backend messages are meant for the end user and are
                        // forwarded as they are.
                        msg: Some(error.to_string()),
                        #[cfg(debug_assertions)]
                        debug_info: backtrace.as_ref().map(|b| {
                            HashMap::from([(
                                "backtrace",
                                serde_json::to_value(filter_backtrace(b)).unwrap_or_default(),
                            )])
                        }),
                    },
                )
            }
            AppError::Request { msg, status, code } => (
                status,
                ErrorResponse {
                    code: code.into(),
                    msg: Some(msg),
                    #[cfg(debug_assertions)]
                    debug_info: None,
                },
            ),
            AppError::Unhandled(e) => {
                tracing::error!(error = %e, "Unhandled error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        code: "ERR".into(),
                        msg: Some(e),
                        #[cfg(debug_assertions)]
                        debug_info: None,
                    },
                )
            }
        };

        (status_code, Json(error_response)).into_response()
    }
}

impl From<BackendError> for AppError {
    fn from(error: BackendError) -> Self {
        AppError::Backend {
            error,

            #[cfg(debug_assertions)]
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }
}

impl From<CommentError> for AppError {
    fn from(e: CommentError) -> Self {
        match e {
            CommentError::Backend(error) => error.into(),
            e => AppError::from_request_error(&e),
        }
    }
}

impl From<AuthenticationError> for AppError {
    fn from(e: AuthenticationError) -> Self {
        AppError::from_request_error(&e)
    }
}

impl From<(&'static str, StatusCode)> for AppError {
    fn from((msg, status): (&'static str, StatusCode)) -> Self {
        AppError::request(msg, status)
    }
}

impl From<&'static str> for AppError {
    fn from(e: &'static str) -> Self {
        AppError::Unhandled(e.into())
    }
}

#[derive(Serialize, Debug)]
struct FrameInfo {
    name: String,
    loc: String,
}

fn filter_backtrace(backtrace: &backtrace::Backtrace) -> Vec<FrameInfo> {
    const MODULE_PREFIX: &str = "comments_api::";
    let mut frames_info: Vec<FrameInfo> = Vec::new();

    for frame in backtrace.frames() {
        for symbol in frame.symbols() {
            if let (Some(name), Some(filename), Some(lineno)) = (
                symbol.name().map(|n| n.to_string()),
                symbol.filename().map(|f| f.to_owned()),
                symbol.lineno(),
            ) {
                if name.contains(MODULE_PREFIX) {
                    frames_info.push(FrameInfo {
                        name,
                        loc: format!("{}:{}", filename.display(), lineno),
                    });
                }
            }
        }
    }

    frames_info
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backend_rejection_keeps_its_status() {
        let error = BackendError::from_body(StatusCode::FORBIDDEN, r#"{"message":"nope"}"#);
        let response = AppError::from(error).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn comment_errors_map_to_their_status() {
        let response = AppError::from(CommentError::EmptyContent).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::from(CommentError::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let response = AppError::from(AuthenticationError::Unauthorized).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
