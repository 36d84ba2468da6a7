use axum::{
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
};

use crate::error::AppError;

// Like `axum::Json`, but rejections come back in our error format
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let status = match rejection.status() {
                    s if s.is_client_error() => s,
                    _ => StatusCode::BAD_REQUEST,
                };
                Err(AppError::Request {
                    msg: rejection.body_text(),
                    status,
                    code: "INVALID_BODY",
                })
            }
        }
    }
}
