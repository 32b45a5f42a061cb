//! Paper desk - a browser front end for the paper-reading backend.
//!
//! This is the main entry point for the web server.
//! The application is organized into the following modules:
//!
//! - `config`: Backend origin, listen address and timeouts from the environment
//! - `api`: HTTP client for the backend
//! - `sse`: Incremental reader for the streamed chat endpoint
//! - `session`: Tab/section state machine, notifications, chat turns
//! - `chat`, `diagram`, `papers`: HTML renderers
//! - `templates`: Page chrome and tab bodies
//! - `handlers`: HTTP route handlers

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use paperdesk::{handlers, AppState, Config, UPLOAD_LIMIT_BYTES};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let listen_addr = config.listen_addr;
    let api_base = config.api_base.clone();
    let state = AppState::shared(config)?;

    let app = Router::new()
        // Page + navigation
        .route("/", get(handlers::index))
        .route("/tab/{name}", get(handlers::switch_tab))
        .route("/papers/{id}", get(handlers::open_paper))
        .route("/papers/{id}/section/{name}", get(handlers::select_section))
        .route("/notification/dismiss", post(handlers::dismiss_notification))
        // Upload
        .route("/upload", post(handlers::upload))
        // Chat
        .route("/chat", post(handlers::send_chat))
        .route("/chat/stream", get(handlers::chat_stream))
        // Users
        .route("/login", post(handlers::login))
        .route("/register", post(handlers::register))
        .route("/logout", post(handlers::logout))
        .with_state(state)
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(%listen_addr, backend = %api_base, "paper desk running");

    axum::serve(listener, app).await?;
    Ok(())
}
