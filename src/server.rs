//! Request dispatch for the two hosting modes.
//!
//! Standalone mode owns a TCP listener and serves until a shutdown signal.
//! Serverless mode hands the router to the platform runtime, which invokes
//! it once per incoming event.

use std::net::SocketAddr;

use axum::Router;
use tokio::{net::TcpListener, signal};
use tower_http::{decompression::RequestDecompressionLayer, trace::TraceLayer};

use crate::error::AppResult;

/// Handle to the listener the application is served on.
///
/// Passed to route registrars in standalone mode only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerHandle {
    local_addr: SocketAddr,
}

impl ServerHandle {
    pub const fn new(local_addr: SocketAddr) -> Self {
        Self { local_addr }
    }

    /// Creates a handle describing a bound listener.
    pub fn from_listener(listener: &TcpListener) -> AppResult<Self> {
        Ok(Self::new(listener.local_addr()?))
    }

    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Wraps the application with the host-level layers.
///
/// Layer order (bottom to top execution): Decompression -> Trace.
/// Unknown content encodings pass through so the body parsers can reject
/// them with 415.
pub fn with_host_layers(app: Router) -> Router {
    app.layer(RequestDecompressionLayer::new().pass_through_unaccepted(true))
        .layer(TraceLayer::new_for_http())
}

/// Binds a listener on all interfaces.
pub async fn bind(port: u16) -> AppResult<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    Ok(TcpListener::bind(addr).await?)
}

/// Serves the application until a shutdown signal arrives.
pub async fn serve(listener: TcpListener, app: Router) -> AppResult<()> {
    tracing::info!(addr = %listener.local_addr()?, "Starting server");

    axum::serve(listener, with_host_layers(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Hands the application to the serverless runtime.
#[cfg(feature = "lambda")]
pub async fn run_serverless(app: Router) -> Result<(), lambda_http::Error> {
    tracing::info!("Starting serverless handler");
    lambda_http::run(with_host_layers(app)).await
}

/// Handles shutdown signals for graceful termination.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        },
    }
}
