//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → policy.rs (blocked set, bot and traversal classification)
//!     → intrusion.rs (count violations, escalate to a block)
//!     → rate_limit.rs (per-key windows for login and OTP endpoints)
//!     → gate.rs (scan + sanitize bodies of data-mutating handlers)
//!     → otp.rs (second factor, backup codes)
//!     → headers.rs (hardening headers on pass-through responses)
//! ```
//!
//! # Design Decisions
//! - Stores are process-local and keyed by string, one lock per key
//! - Detection fails open at component boundaries; blocks are explicit
//! - No trust in client input: handlers only see screened bodies

pub mod gate;
pub mod headers;
pub mod identity;
pub mod intrusion;
pub mod otp;
pub mod policy;
pub mod rate_limit;
pub mod scanner;
