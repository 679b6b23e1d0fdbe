//! Configuration module.

pub mod env;
pub mod telemetry;

pub use env::*;
pub use telemetry::*;
