//! Route registration.

use std::future::Future;

use axum::{routing::get, Router};

use crate::api::handlers::health_handler;
use crate::error::AppResult;
use crate::server::ServerHandle;

/// Attaches URL-pattern-to-handler bindings to an application.
///
/// `server` is the listener the app will be served on when running
/// standalone, and `None` under a serverless host. Implementations return
/// the router with their routes added; an `Err` aborts application startup.
pub trait RouteRegistrar: Send + Sync {
    fn register(
        &self,
        server: Option<&ServerHandle>,
        router: Router,
    ) -> impl Future<Output = AppResult<Router>> + Send;
}

/// Routes shipped with the crate's binaries.
///
/// # Routes
///
/// - `GET /health` - Liveness probe
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreRoutes;

impl RouteRegistrar for CoreRoutes {
    async fn register(&self, server: Option<&ServerHandle>, router: Router) -> AppResult<Router> {
        match server {
            Some(handle) => tracing::debug!(addr = %handle.local_addr(), "Registering core routes"),
            None => tracing::debug!("Registering core routes for serverless host"),
        }

        Ok(router.route("/health", get(health_handler)))
    }
}
