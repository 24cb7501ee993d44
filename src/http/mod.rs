//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request id, timeout, body limit)
//!     → middleware/edge_filter.rs (block, bot, traversal, admin guard)
//!     → auth.rs / product_request.rs (local API routes)
//!     → upstream.rs (everything else, when an origin is configured)
//!     → security headers stamped on the way out
//! ```

pub mod auth;
pub mod middleware;
pub mod product_request;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use request::{client_address, ClientInfo};
pub use response::ApiError;
pub use server::{AppState, HttpServer, ServerError};
