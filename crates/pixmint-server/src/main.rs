use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use pixmint_api::provider::{DEFAULT_ENDPOINT, HttpImageProvider, ProviderConfig, parse_timeout};
use pixmint_api::routes;
use pixmint_api::state::AppStateInner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pixmint=debug,pixmint_api=debug,pixmint_db=info,tower_http=debug".into()
            }),
        )
        .init();

    // Config
    let db_path = std::env::var("PIXMINT_DB_PATH").unwrap_or_else(|_| "pixmint.db".into());
    let host = std::env::var("PIXMINT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PIXMINT_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let starting_tokens: i64 = std::env::var("PIXMINT_STARTING_TOKENS")
        .unwrap_or_else(|_| "3".into())
        .parse()?;
    anyhow::ensure!(starting_tokens >= 0, "PIXMINT_STARTING_TOKENS must not be negative");

    let provider_config = ProviderConfig {
        endpoint: std::env::var("PIXMINT_PROVIDER_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.into()),
        api_key: std::env::var("PIXMINT_PROVIDER_API_KEY").ok(),
        timeout: parse_timeout(std::env::var("PIXMINT_PROVIDER_TIMEOUT_SECS").ok().as_deref())?,
    };
    if provider_config.api_key.is_none() {
        warn!("PIXMINT_PROVIDER_API_KEY is unset; provider requests go out unauthenticated");
    }
    info!(
        "Image provider: {} (timeout {}s)",
        provider_config.endpoint,
        provider_config.timeout.as_secs()
    );

    // Init database and provider
    let db = pixmint_db::Database::open(&PathBuf::from(&db_path), starting_tokens)?;
    let provider = Arc::new(HttpImageProvider::new(provider_config)?);

    let state = AppStateInner::new(db, provider);

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Pixmint server listening on {} (new users start with {} tokens)", addr, starting_tokens);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
