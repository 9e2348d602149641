//! Taskpulse Web Server
//!
//! Axum-based fan-out server: WebSocket clients register on connect and
//! receive every event published through the [`Broadcaster`].
//!
//! The registry is in-memory and per process. Running several instances
//! behind a load balancer needs an external bus between them, which this
//! crate does not provide.

pub mod broadcast;
pub mod connection;
pub mod registry;
pub mod routes;
pub mod state;
pub mod websocket;

pub use broadcast::Broadcaster;
pub use connection::{Connection, ConnectionId, ConnectionState, SendError};
pub use registry::ConnectionRegistry;
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use taskpulse_core::config::ServerConfig;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let internal_routes = Router::new()
        .route("/publish", post(routes::internal::publish))
        .route("/connections", get(routes::internal::connections))
        .with_state(state.clone());

    Router::new()
        .route("/ws", get(websocket::ws_handler))
        .nest("/internal", internal_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on an already bound listener until Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Run the web server.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let state = AppState::new(config);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Web server listening on http://{}", addr);

    serve(listener, state).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
