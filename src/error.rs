//! Unified error type for the timer service and its event queues.
//!
//! Every fallible operation funnels into [`Error`].  All variants are `Copy`
//! so they can be returned from interrupt-context paths without allocation.
//! None of them are fatal to the timer daemon: callers receive them as a
//! status, the daemon logs and drops commands that fail to apply.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Storage for a queue, registry or daemon could not be reserved, or
    /// every timer slot is in use.
    AllocationFailure,
    /// `send` gave up: no space appeared before the timeout elapsed.
    QueueFull,
    /// `wait` gave up: no item arrived before the timeout elapsed.
    QueueEmpty,
    /// The handle refers to a deleted timer, a destroyed queue, or nothing.
    InvalidHandle,
    /// An interrupt-safe call could not complete without blocking.
    InterruptContextRejected,
    /// Start on a one-shot or alarm timer that already fired; issue a
    /// Reset (or Stop) first.
    Expired,
    /// A creation or configuration parameter is out of range.
    InvalidArgument(&'static str),
}

impl Error {
    /// Numeric status for the C-style surface.  `0` is reserved for success.
    pub const fn code(self) -> i32 {
        match self {
            Self::AllocationFailure => -1,
            Self::QueueFull => -2,
            Self::QueueEmpty => -3,
            Self::InvalidHandle => -4,
            Self::InterruptContextRejected => -5,
            Self::Expired => -6,
            Self::InvalidArgument(_) => -7,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailure => write!(f, "allocation failed"),
            Self::QueueFull => write!(f, "queue full"),
            Self::QueueEmpty => write!(f, "queue empty"),
            Self::InvalidHandle => write!(f, "invalid handle"),
            Self::InterruptContextRejected => write!(f, "rejected in interrupt context"),
            Self::Expired => write!(f, "timer expired, reset required"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Collapse a result into the numeric status surface (`0` on success).
pub fn status<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}
