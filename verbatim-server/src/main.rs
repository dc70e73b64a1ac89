//! Verbatim server entry point.
//!
//! Wires the core engine to its axum host: CLI/env configuration, backend
//! manager with the default variant preloaded, admin routes, the WebSocket
//! endpoint and graceful shutdown.

mod config;
mod routes;
mod state;
mod ws;

use std::sync::Arc;

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use verbatim_core::inference::BackendFactory;
use verbatim_core::{BackendManager, TranscriptionPipeline};

use config::Config;
use state::{AppState, SessionRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verbatim=info,tower_http=warn".parse().unwrap()),
        )
        .init();

    let config = Config::parse();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    info!(
        bind = %config.bind,
        default_model = %config.default_model,
        device = %config.device,
        sample_rate = config.target_sample_rate,
        window_ms = config.window_ms,
        "starting verbatim server"
    );

    // ── Backend manager ───────────────────────────────────────────────────
    let manager = BackendManager::new(backend_factory(&config), config.device);

    // Preload the default variant. A failed preload leaves the server up in
    // degraded mode (health reports model_loaded=false) instead of exiting;
    // a later switch can still bring a model up.
    match manager.load_variant(&config.default_model).await {
        Ok(change) => {
            info!(model = %change.variant, device = %change.device, "default model ready");
        }
        Err(e) => {
            error!(model = %config.default_model, error = %e, "default model failed to load");
        }
    }

    let pipeline =
        TranscriptionPipeline::new(Arc::clone(&manager)).with_timeout(config.transcribe_timeout());

    let state = AppState {
        manager,
        pipeline,
        session_config: config.session_config(),
        registry: Arc::new(SessionRegistry::default()),
    };

    // ── HTTP / WebSocket host ─────────────────────────────────────────────
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %listener.local_addr()?, "listening");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("server stopped");
    Ok(())
}

fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/models", get(routes::list_models))
        .route("/models/:name", post(routes::change_model))
        .route("/ws", get(ws::websocket_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(not(feature = "whisper"))]
fn backend_factory(_config: &Config) -> Arc<dyn BackendFactory> {
    use verbatim_core::inference::stub::StubFactory;
    Arc::new(StubFactory::default())
}

#[cfg(feature = "whisper")]
fn backend_factory(config: &Config) -> Arc<dyn BackendFactory> {
    use verbatim_core::WhisperFactory;
    Arc::new(WhisperFactory::new(&config.models_dir))
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
