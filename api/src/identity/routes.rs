use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    App,
    backend::auth::SignUpOutcome,
    error::AppError,
    json::JsonBody,
};

use super::{COOKIE_NAME, MaybeAuthUser, Role, role::Badge, session_token};

const MIN_PASSWORD_LENGTH: usize = 6;

pub fn route() -> Router<App> {
    // Rate limiting of sign-ups and logins is left to the auth backend
    Router::<App>::new()
        .route("/signup", post(sign_up))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(whoami))
}

#[derive(Deserialize)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    fn validate(&mut self) -> Result<(), &'static str> {
        self.email = self.email.trim().to_lowercase();
        if self.email.is_empty() {
            return Err("No email provided");
        }
        if !self.email.contains('@') {
            return Err("Invalid email");
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err("Password too short (min 6 characters)");
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SignUpResponse {
    confirmation_required: bool,
    msg: &'static str,
}

#[derive(Serialize)]
struct LoginResponse {
    id: Uuid,
    email: Option<String>,
}

#[derive(Serialize)]
struct IsAuth {
    is_auth: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,

    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<Badge>,
}

fn session_cookie(ctx: &App, token: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .secure(ctx.config.is_production())
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs.max(0)))
        .build()
}

async fn sign_up(
    State(ctx): State<App>,
    jar: CookieJar,
    JsonBody(mut credentials): JsonBody<Credentials>,
) -> Result<(CookieJar, Json<SignUpResponse>), AppError> {
    credentials
        .validate()
        .map_err(|e| (e, StatusCode::BAD_REQUEST))?;

    let outcome = ctx
        .backend
        .sign_up(&credentials.email, &credentials.password)
        .await?;

    Ok(match outcome {
        SignUpOutcome::ConfirmationRequired(user) => {
            tracing::info!(user = %user.id, "Registered, awaiting email confirmation");
            (
                jar,
                Json(SignUpResponse {
                    confirmation_required: true,
                    msg: "Check your email and confirm the registration.",
                }),
            )
        }
        SignUpOutcome::SignedIn(session) => {
            tracing::info!(user = %session.user.id, "Registered and signed in");
            let cookie = session_cookie(&ctx, session.access_token, session.expires_in);
            (
                jar.add(cookie),
                Json(SignUpResponse {
                    confirmation_required: false,
                    msg: "Registration complete.",
                }),
            )
        }
    })
}

async fn login(
    State(ctx): State<App>,
    jar: CookieJar,
    JsonBody(mut credentials): JsonBody<Credentials>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    credentials
        .validate()
        .map_err(|e| (e, StatusCode::BAD_REQUEST))?;

    let session = ctx
        .backend
        .sign_in_with_password(&credentials.email, &credentials.password)
        .await?;

    tracing::debug!(user = %session.user.id, "Signed in");
    let response = LoginResponse {
        id: session.user.id,
        email: session.user.email,
    };
    let cookie = session_cookie(&ctx, session.access_token, session.expires_in);

    Ok((jar.add(cookie), Json(response)))
}

async fn logout(
    State(ctx): State<App>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<(CookieJar, StatusCode), AppError> {
    if let Some(token) = session_token(&headers) {
        // The cookie goes away regardless, an already expired session is fine
        if let Err(e) = ctx.backend.sign_out(&token).await {
            tracing::warn!(error = %e, "Backend sign-out failed");
        }
    }

    let removal = Cookie::build(COOKIE_NAME).path("/").build();
    Ok((jar.remove(removal), StatusCode::NO_CONTENT))
}

async fn whoami(
    State(ctx): State<App>,
    MaybeAuthUser(viewer): MaybeAuthUser,
) -> Result<Json<IsAuth>, AppError> {
    let Ok(viewer) = viewer else {
        return Ok(Json(IsAuth {
            is_auth: false,
            id: None,
            email: None,
            username: None,
            role: None,
            badge: None,
        }));
    };

    let profile = ctx.comments.my_profile(&viewer).await?;
    let role = profile.as_ref().map(|p| p.role).unwrap_or_default();

    Ok(Json(IsAuth {
        is_auth: true,
        id: Some(viewer.user.id),
        email: viewer.user.email,
        username: profile.and_then(|p| p.username),
        role: Some(role),
        badge: role.badge(),
    }))
}
