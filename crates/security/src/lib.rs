//! Security policy for Parley.
//!
//! Provides:
//! - **Allowlists**: which senders the assistant answers and which may run
//!   `!ai` admin commands

pub mod allowlist;

pub use allowlist::{AllowlistError, SenderAllowlist, SenderCheckResult};
