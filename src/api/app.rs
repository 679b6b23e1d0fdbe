//! Application construction.

use axum::Router;
use tokio::sync::OnceCell;

use crate::api::middlewares::{install_body_parsers, JsonOptions, UrlencodedOptions};
use crate::api::routes::RouteRegistrar;
use crate::config::{AppConfig, APP_CONFIG};
use crate::error::{AppError, AppResult};
use crate::server::ServerHandle;

static SHARED_APP: OnceCell<Router> = OnceCell::const_new();

/// Builds the application.
///
/// Routes are registered first and the body parsers are layered on
/// afterwards, so every registered route (and the fallback) sees JSON and
/// URL-encoded bodies already parsed. Registration is awaited in full
/// before the router is returned.
pub async fn build_app<R>(
    config: &AppConfig,
    registrar: &R,
    server: Option<&ServerHandle>,
) -> AppResult<Router>
where
    R: RouteRegistrar,
{
    let router = registrar
        .register(server, Router::new())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Route registration failed");
            match e {
                AppError::Registration(_) => e,
                other => AppError::Registration(other.to_string()),
            }
        })?;

    let json = JsonOptions::from(config);
    let urlencoded = UrlencodedOptions::from(config);
    tracing::info!(
        json_limit = json.limit,
        json_strict = json.strict,
        urlencoded_limit = urlencoded.limit,
        parameter_limit = urlencoded.parameter_limit,
        "Application built"
    );

    Ok(install_body_parsers(router, json, urlencoded))
}

/// Returns the process-wide application instance.
///
/// The first call builds the app from [`APP_CONFIG`] with no server handle.
/// Later calls return a clone of the same router without invoking the
/// registrar again. A failed build is not cached; the next call retries.
pub async fn shared_app<R>(registrar: &R) -> AppResult<Router>
where
    R: RouteRegistrar,
{
    SHARED_APP
        .get_or_try_init(|| build_app(&APP_CONFIG, registrar, None))
        .await
        .cloned()
}
