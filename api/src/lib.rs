use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod backend;
pub mod comments;
pub mod config;
pub mod error;
pub mod identity;
pub mod json;

use backend::{Backend, BackendError};
use comments::{CommentStore, events::CommentEvents};
use config::ServerConfig;

#[derive(Clone)]
pub struct App {
    pub config: Arc<ServerConfig>,
    pub backend: Backend,
    pub comments: CommentStore,
    pub events: CommentEvents,
}

impl App {
    pub fn new(config: ServerConfig) -> Result<Self, BackendError> {
        let backend = Backend::new(&config.backend)?;
        let comments = CommentStore::new(Arc::new(backend.clone()), config.comment_max_length);

        Ok(Self {
            config: Arc::new(config),
            backend,
            comments,
            events: CommentEvents::new(),
        })
    }
}

pub fn router(app: App) -> Router {
    let cors = cors_layer(&app.config);

    let router = Router::new()
        .nest("/comments", comments::routes::route())
        .nest("/auth", identity::routes::route())
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(app);

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// Explicit origins when configured, otherwise any origin in development
/// and same-origin only elsewhere. Credentials are always allowed so the
/// session cookie travels with cross-origin requests.
fn cors_layer(config: &ServerConfig) -> Option<CorsLayer> {
    if config.cors_origins.is_empty() {
        if config.is_production() {
            return None;
        }
        return Some(CorsLayer::very_permissive());
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(origin) => Some(origin),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
    )
}
