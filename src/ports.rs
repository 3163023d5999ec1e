//! Port traits: the boundary between the timer core and the platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ TimerDaemon / TimerCommandChannel
//! ```
//!
//! The daemon never reads a clock directly.  Adapters in
//! [`adapters`](crate::adapters) implement [`Clock`] for the real system and
//! for deterministic simulation.

use std::time::{Instant, SystemTime};

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: platform → timer core)
// ───────────────────────────────────────────────────────────────

/// Time source shared by callers and the daemon.
///
/// Implementations must be callable from any context, including the
/// interrupt path, so they must not block.
pub trait Clock: Send + Sync + 'static {
    /// Monotonic time.  Drives OneShot and Repeat deadlines.
    fn now(&self) -> Instant;

    /// Wall-clock time.  Alarm targets are expressed against this.
    fn wall_now(&self) -> SystemTime;
}
