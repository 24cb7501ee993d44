//! Storefront request perimeter.
//!
//! Edge filtering, rate limiting, signature scanning, one-time passwords and
//! escalation of repeat offenders, in front of a storefront origin.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::schema::PerimeterConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
