//! Software timers.
//!
//! ```text
//!  caller ──create──▶ TimerRegistry ◀──────── sole mutator ─────┐
//!    │                                                           │
//!    └─start/stop/delete/reset──▶ TimerCommandChannel ──▶ TimerDaemon ──▶ callback
//!  ISR ──*_from_isr──────────────▶ (EventQueue, lock-free)
//! ```
//!
//! Callers hold only a [`TimerHandle`].  The daemon is the only context
//! that changes timer state; everything else talks to it through commands.

pub mod command;
pub mod daemon;
pub mod registry;

use std::time::{Duration, Instant, SystemTime};

pub use command::{TimerAction, TimerCommand, TimerCommandChannel};
pub use daemon::TimerDaemon;
pub use registry::TimerRegistry;

/// Longest timer name kept, in bytes.
pub const MAX_TIMER_NAME_LEN: usize = 16;

/// Bounded timer label.
pub type TimerName = heapless::String<MAX_TIMER_NAME_LEN>;

/// Copy `text` into a bounded label, truncating at a char boundary.
pub(crate) fn bounded_label<const N: usize>(text: &str) -> heapless::String<N> {
    let mut label = heapless::String::new();
    for c in text.chars() {
        if label.push(c).is_err() {
            break;
        }
    }
    label
}

/// Opaque token supplied by the caller at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u32);

/// Reference to a registry slot.  The generation makes handles of
/// deleted timers permanently invalid, even after the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Trigger mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fire once, then rest until Reset.
    OneShot,
    /// Re-arm after each firing at a fixed rate.
    Repeat,
    /// Fire once at a wall-clock time (used for wakeups).
    Alarm,
}

/// Lifecycle of a timer as published by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimerState {
    Created = 1,
    Armed = 2,
    /// A one-shot or alarm that has fired and not been re-armed.
    Fired = 3,
    Stopped = 4,
    Deleted = 5,
}

impl TimerState {
    pub(crate) fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Created),
            2 => Some(Self::Armed),
            3 => Some(Self::Fired),
            4 => Some(Self::Stopped),
            5 => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Argument passed to a timer callback.
#[derive(Debug, Clone)]
pub struct TimerEvent {
    pub handle: TimerHandle,
    pub id: TimerId,
    pub name: TimerName,
    pub kind: TimerKind,
    /// When the timer was scheduled to fire.
    pub deadline: Instant,
    /// When the daemon actually fired it.
    pub fired_at: Instant,
    /// Deadlines skipped by coalescing before this firing.
    pub missed: u32,
}

/// Expiry callback.  Runs on the daemon thread; a slow callback delays
/// every other timer.
pub type TimerCallback = Box<dyn FnMut(&TimerEvent) + Send + 'static>;

/// Snapshot of a timer's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerInfo {
    pub name: TimerName,
    pub id: TimerId,
    pub kind: TimerKind,
    pub period: Duration,
    /// Absolute wall-clock target of an alarm created with one.
    pub alarm_at: Option<SystemTime>,
    pub state: TimerState,
    pub next_deadline: Option<Instant>,
    pub fire_count: u64,
}
