//! Serverless entry point.
//!
//! The runtime invokes the shared application once per incoming event.
//! Route registration completes before the first event is accepted.

use lambda_http::Error;
use serverless_app::api::{shared_app, CoreRoutes};
use serverless_app::config::{flush_sentry, init_sentry, init_tracing};
use serverless_app::server::run_serverless;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    let _guard = init_sentry();

    let app = match shared_app(&CoreRoutes).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Failed to build application: {}", e);
            flush_sentry();
            return Err(e.into());
        }
    };

    run_serverless(app).await
}
