//! HTTP server for the talk room API.
//!
//! Provides REST endpoints for:
//! - Sign-up and profile changes
//! - Friends list ranked by latest conversation
//! - Talk room history and sending messages

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// API router wrapped in the CORS and request-tracing layers.
#[must_use]
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind the listening socket on all interfaces. Port 0 picks a free port.
///
/// # Errors
/// Returns an error if the port cannot be bound.
pub async fn bind(port: u16) -> io::Result<TcpListener> {
    TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await
}

/// Serve the API on `listener` until `shutdown` completes.
///
/// In-flight requests are drained before returning.
///
/// # Errors
/// Returns an error if accepting connections fails.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("Talk room server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Talk room server stopped");
    Ok(())
}

/// Resolves on Ctrl-C.
///
/// If the signal handler cannot be installed the server keeps running.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::messaging::core::config::{StorageConfig, TalkConfig};

    #[tokio::test]
    async fn test_serve_returns_after_shutdown() {
        let config = TalkConfig {
            storage: StorageConfig::in_memory(),
            ..TalkConfig::default()
        };
        let state = AppState::new(config).await.unwrap();
        let listener = bind(0).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, state, async move {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
