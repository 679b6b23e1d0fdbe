//! API module.
//!
//! Contains application construction, route registration, body parsing
//! middleware, and built-in handlers.

pub mod app;
pub mod handlers;
pub mod middlewares;
pub mod routes;

pub use app::{build_app, shared_app};
pub use handlers::HealthResponse;
pub use middlewares::{install_body_parsers, JsonOptions, ParsedBody, UrlencodedOptions};
pub use routes::{CoreRoutes, RouteRegistrar};
