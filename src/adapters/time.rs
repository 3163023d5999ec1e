//! Time adapters.
//!
//! - [`SystemClock`] wraps `std::time` (monotonic `Instant`, wall `SystemTime`).
//! - [`ManualClock`] only moves when told to, for stepping the daemon in
//!   tests and simulation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use crate::ports::Clock;

/// Platform clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Simulated clock.  Monotonic and wall time advance together.
///
/// Offsets are kept in atomics so the clock can be shared with the daemon
/// and read from any thread without locking.
#[derive(Debug)]
pub struct ManualClock {
    anchor: Instant,
    wall_anchor: SystemTime,
    /// Microseconds advanced since `anchor`.
    elapsed_us: AtomicU64,
    /// Extra wall-clock shift in microseconds (set via [`ManualClock::set_wall`]).
    wall_shift_us: AtomicU64,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Wall time starts at 2024-01-01T00:00:00Z.
    pub fn new() -> Self {
        const EPOCH_2024: u64 = 1_704_067_200;
        Self::starting_at(SystemTime::UNIX_EPOCH + Duration::from_secs(EPOCH_2024))
    }

    pub fn starting_at(wall: SystemTime) -> Self {
        Self {
            anchor: Instant::now(),
            wall_anchor: wall,
            elapsed_us: AtomicU64::new(0),
            wall_shift_us: AtomicU64::new(0),
        }
    }

    /// Move both clocks forward.
    pub fn advance(&self, by: Duration) {
        self.elapsed_us
            .fetch_add(by.as_micros() as u64, Ordering::AcqRel);
    }

    /// Jump the wall clock to `wall` (never backwards past the anchor).
    /// Monotonic time is untouched, as after an NTP step.
    pub fn set_wall(&self, wall: SystemTime) {
        let since_anchor = wall
            .duration_since(self.wall_anchor)
            .unwrap_or(Duration::ZERO)
            .as_micros() as u64;
        let elapsed = self.elapsed_us.load(Ordering::Acquire);
        self.wall_shift_us
            .store(since_anchor.saturating_sub(elapsed), Ordering::Release);
    }

    /// Time advanced since construction.
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_us.load(Ordering::Acquire))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.anchor + self.elapsed()
    }

    fn wall_now(&self) -> SystemTime {
        let shift = Duration::from_micros(self.wall_shift_us.load(Ordering::Acquire));
        self.wall_anchor + self.elapsed() + shift
    }
}
