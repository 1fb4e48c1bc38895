//! Revival pacing.
//!
//! - [`BackoffPolicy`] delay between failed revival attempts (first / factor / max + jitter)
//! - [`JitterPolicy`] randomization so units that crashed together revive apart
//!
//! ```text
//! SupervisorConfig { revive_backoff: BackoffPolicy, max_revive_attempts, .. }
//!      └─► revival loop: attempt n failed → sleep(revive_backoff.next(n)) → attempt n+1
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
