//! Standalone entry point.
//!
//! Serves the application on a local listener, for development and for
//! hosts that run a persistent process.

use serverless_app::api::{build_app, CoreRoutes};
use serverless_app::config::{flush_sentry, init_sentry, init_tracing, APP_CONFIG};
use serverless_app::server::{bind, serve, ServerHandle};

// High-performance memory allocator for non-MSVC targets
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    init_tracing();
    let _guard = init_sentry();

    let port: u16 = APP_CONFIG.server_port.parse().unwrap_or(3000);
    let listener = match bind(port).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(port, "Failed to bind to address: {}", e);
            std::process::exit(1);
        }
    };

    let handle = match ServerHandle::from_listener(&listener) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to read listener address: {}", e);
            std::process::exit(1);
        }
    };

    let app = match build_app(&APP_CONFIG, &CoreRoutes, Some(&handle)).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Failed to build application: {}", e);
            flush_sentry();
            std::process::exit(1);
        }
    };

    if let Err(e) = serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }

    tracing::info!("Shutting down...");
    flush_sentry();
    tracing::info!("Shutdown complete");
}
