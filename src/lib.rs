//! Serverless HTTP application bootstrap.
//!
//! Builds an axum application with JSON and URL-encoded body parsing in
//! front of externally registered routes, and exposes it to either a
//! serverless runtime or a standalone listener.

pub mod api;
pub mod config;
pub mod error;
pub mod server;
