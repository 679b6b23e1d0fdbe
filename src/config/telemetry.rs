//! Logging and error tracking setup.

use sentry::ClientInitGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::env::{LogFormat, APP_CONFIG};

const DEFAULT_FILTER: &str = "serverless_app=debug,tower_http=debug,axum=trace";

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Serverless hosts collect stdout
/// line by line, so `LOG_FORMAT=json` emits one JSON object per event.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    let result = match APP_CONFIG.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .flatten_event(true),
            )
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Initializes Sentry when a DSN is configured.
///
/// The returned guard must be held for the lifetime of the process.
pub fn init_sentry() -> Option<ClientInitGuard> {
    if APP_CONFIG.sentry_dsn.is_empty() {
        tracing::warn!("Sentry DSN not configured, error tracking disabled");
        return None;
    }

    Some(sentry::init((
        APP_CONFIG.sentry_dsn.clone(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(if APP_CONFIG.is_production {
                "production".into()
            } else {
                "development".into()
            }),
            traces_sample_rate: APP_CONFIG.sentry_traces_sample_rate,
            sample_rate: 1.0, // Capture all errors
            ..Default::default()
        },
    )))
}

/// Flushes pending Sentry events before exit.
pub fn flush_sentry() {
    if let Some(client) = sentry::Hub::current().client() {
        client.flush(Some(std::time::Duration::from_secs(2)));
    }
}
