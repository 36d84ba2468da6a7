use dotenv::dotenv;
use mimalloc::MiMalloc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use comments_api::{App, config::ServerConfig, router};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // Structured logs for the log collector in production
    if std::env::var("ENVIRONMENT").is_ok_and(|e| e == "production") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    let config = ServerConfig::new_from_env();
    let addr = config.listen_addr;

    let app = match App::new(config) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Could not set up the backend client");
            std::process::exit(1)
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Could not bind");
            std::process::exit(1)
        }
    };

    tracing::info!("listening on {}", addr);
    if let Err(e) = axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1)
    }
}
