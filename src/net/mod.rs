//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! listener.bind_address
//!     → plain TCP (tokio::net::TcpListener), or
//!     → tls.rs (rustls termination via axum-server)
//!     → Hand off to HTTP layer
//! ```

pub mod tls;
