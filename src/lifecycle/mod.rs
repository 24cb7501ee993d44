//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → listeners stop accepting → in-flight requests drain → exit
//!
//! Sweeper (sweeper.rs):
//!     interval ticks → rate windows / OTP expiry → amnesty
//! ```

pub mod shutdown;
pub mod signals;
pub mod sweeper;

pub use shutdown::Shutdown;
