use axum::http::{HeaderMap, StatusCode, header, request::Parts};

use crate::{
    App,
    backend::auth::User,
    error::{ApiRequestError, AppError},
};

pub mod role;
pub mod routes;

pub use role::Role;

pub const COOKIE_NAME: &str = "auth_token";

#[derive(thiserror::Error, Debug)]
pub enum AuthenticationError {
    #[error("Authentication required, but no cookie `{COOKIE_NAME}` found in headers.")]
    NoCookie,

    #[error(
        "Unauthorized, please check if you're logged in by refreshing the \
         page. This could be due to an expired session or token has became invalid."
    )]
    Unauthorized,
}

impl ApiRequestError for AuthenticationError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthenticationError::NoCookie => StatusCode::BAD_REQUEST,
            AuthenticationError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_code(&self) -> &'static str {
        "UNAUTHORIZED"
    }
}

/// A signed-in user together with the access token every backend call is
/// made with.
#[derive(Clone, Debug)]
pub struct Viewer {
    pub user: User,
    pub token: String,
}

/// The session token comes from the cookie set at login, or from an
/// `Authorization: Bearer` header for non-browser clients.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let jar = axum_extra::extract::cookie::CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(COOKIE_NAME) {
        return Some(cookie.value().to_string());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub struct MaybeAuthUser(pub Result<Viewer, AuthenticationError>);

impl axum::extract::FromRequestParts<App> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &App) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(&parts.headers) else {
            return Ok(MaybeAuthUser(Err(AuthenticationError::NoCookie)));
        };

        match state.backend.get_user(&token).await {
            Ok(user) => Ok(MaybeAuthUser(Ok(Viewer { user, token }))),
            Err(e) if e.is_unauthorized() => {
                tracing::debug!(error = %e, "Rejected session token");
                Ok(MaybeAuthUser(Err(AuthenticationError::Unauthorized)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub struct AuthUser(pub Viewer);

impl axum::extract::FromRequestParts<App> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &App) -> Result<Self, Self::Rejection> {
        let MaybeAuthUser(viewer) = MaybeAuthUser::from_request_parts(parts, state).await?;

        // A missing session is just as unauthorized as an expired one here
        Ok(AuthUser(viewer.map_err(|_| AuthenticationError::Unauthorized)?))
    }
}
