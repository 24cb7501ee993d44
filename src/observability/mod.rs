//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!     → audit.rs (security events: tracing line, ring buffer, remote table)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Admin API (recent audit events)
//! ```

pub mod audit;
pub mod logging;
pub mod metrics;
