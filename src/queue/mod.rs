//! Interrupt-safe bounded event queue.
//!
//! Items are produced by:
//! - Tasks (blocking `send` with a bounded wait)
//! - Interrupt handlers (`send_from_isr`, never blocks)
//!
//! and consumed by a task that waits with a timeout, or forever.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────┐     ┌──────────────┐
//! │ Task send   │────▶│  Ring (lock-free)    │────▶│  wait /      │
//! │ ISR send    │────▶│  + not_empty gate    │     │  wait_raw    │
//! └─────────────┘     │  + not_full gate     │     └──────────────┘
//!                     └──────────────────────┘
//! ```
//!
//! FIFO order is preserved per queue, and a full queue rejects pushes
//! rather than overwriting.  Handles are cheap clones of one shared queue;
//! [`EventQueue::destroy`] invalidates every clone at once.

mod gate;
mod ring;

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::{Error, Result};
use gate::Gate;
use ring::Ring;

/// Largest capacity `create` accepts.
pub const MAX_QUEUE_CAPACITY: usize = 4096;

/// Millisecond sentinel meaning "wait indefinitely".
pub const WAIT_FOREVER: u32 = u32::MAX;

// ═══════════════════════════════════════════════════════════════
//  Timeout
// ═══════════════════════════════════════════════════════════════

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Single attempt, return immediately.
    NoWait,
    /// Wait up to this long.
    After(Duration),
    /// Wait until the operation can complete.
    Forever,
}

impl Timeout {
    /// Absolute deadline, `None` for no deadline.
    fn deadline(self, now: Instant) -> Option<Instant> {
        match self {
            Self::NoWait => Some(now),
            Self::After(d) => now.checked_add(d),
            Self::Forever => None,
        }
    }
}

impl From<u32> for Timeout {
    /// Milliseconds; `0` is [`Timeout::NoWait`], [`WAIT_FOREVER`] is [`Timeout::Forever`].
    fn from(ms: u32) -> Self {
        match ms {
            0 => Self::NoWait,
            WAIT_FOREVER => Self::Forever,
            ms => Self::After(Duration::from_millis(u64::from(ms))),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() { Self::NoWait } else { Self::After(d) }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Item shapes
// ═══════════════════════════════════════════════════════════════

/// Typed queue item: event id plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<P> {
    pub id: u32,
    pub data: P,
}

/// Queue of raw 32-bit words.
pub type RawQueue = EventQueue<u32>;

// ═══════════════════════════════════════════════════════════════
//  EventQueue
// ═══════════════════════════════════════════════════════════════

struct Shared<T> {
    ring: Ring<T>,
    not_empty: Gate,
    not_full: Gate,
    destroyed: AtomicBool,
}

/// Bounded FIFO safe to feed from interrupt context.
pub struct EventQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for EventQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send> core::fmt::Debug for EventQueue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("receivers_waiting", &self.shared.not_empty.waiting())
            .field("senders_waiting", &self.shared.not_full.waiting())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl<T: Send> EventQueue<T> {
    /// Allocate a queue holding up to `capacity` items.
    pub fn create(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_QUEUE_CAPACITY {
            return Err(Error::InvalidArgument("queue capacity out of range"));
        }
        if size_of::<T>() == 0 {
            return Err(Error::InvalidArgument("queue item size must be non-zero"));
        }
        let ring = Ring::with_capacity(capacity)?;
        debug!(
            "queue: created capacity={} item_size={}",
            capacity,
            size_of::<T>()
        );
        Ok(Self {
            shared: Arc::new(Shared {
                ring,
                not_empty: Gate::new(),
                not_full: Gate::new(),
                destroyed: AtomicBool::new(false),
            }),
        })
    }

    /// Invalidate the queue for every holder and drop queued items.
    ///
    /// Blocked senders and receivers are woken and get
    /// [`Error::InvalidHandle`].  Destroying twice is an error.
    pub fn destroy(&self) -> Result<()> {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return Err(Error::InvalidHandle);
        }
        while self.shared.ring.pop().is_some() {}
        self.shared.not_empty.signal_all();
        self.shared.not_full.signal_all();
        debug!("queue: destroyed");
        Ok(())
    }

    /// Enqueue, waiting up to `timeout` for space.
    pub fn send(&self, item: T, timeout: impl Into<Timeout>) -> Result<()> {
        self.ensure_live()?;
        let timeout = timeout.into();
        let item = match self.shared.ring.push(item) {
            Ok(()) => {
                self.shared.not_empty.signal();
                return Ok(());
            }
            Err(item) => item,
        };
        if timeout == Timeout::NoWait {
            return Err(Error::QueueFull);
        }

        let mut pending = Some(item);
        let outcome = self
            .shared
            .not_full
            .wait_until(timeout.deadline(Instant::now()), || {
                if self.is_destroyed() {
                    return Some(Err(Error::InvalidHandle));
                }
                let item = pending.take()?;
                match self.shared.ring.push(item) {
                    Ok(()) => Some(Ok(())),
                    Err(item) => {
                        pending = Some(item);
                        None
                    }
                }
            });
        match outcome {
            Some(Ok(())) => {
                self.shared.not_empty.signal();
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Err(Error::QueueFull),
        }
    }

    /// Enqueue from interrupt context.  Never blocks: a full queue is
    /// rejected at once with [`Error::InterruptContextRejected`].
    pub fn send_from_isr(&self, item: T) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::InvalidHandle);
        }
        if self.shared.ring.push(item).is_err() {
            return Err(Error::InterruptContextRejected);
        }
        self.shared.not_empty.signal();
        Ok(())
    }

    /// Dequeue, waiting up to `timeout` for an item.
    pub fn wait(&self, timeout: impl Into<Timeout>) -> Result<T> {
        self.ensure_live()?;
        let timeout = timeout.into();
        if let Some(item) = self.shared.ring.pop() {
            self.shared.not_full.signal();
            return Ok(item);
        }
        if timeout == Timeout::NoWait {
            return Err(Error::QueueEmpty);
        }

        let outcome = self
            .shared
            .not_empty
            .wait_until(timeout.deadline(Instant::now()), || {
                if self.is_destroyed() {
                    return Some(Err(Error::InvalidHandle));
                }
                self.shared.ring.pop().map(Ok)
            });
        match outcome {
            Some(Ok(item)) => {
                self.shared.not_full.signal();
                Ok(item)
            }
            Some(Err(e)) => Err(e),
            None => Err(Error::QueueEmpty),
        }
    }

    /// Free slots right now.  Advisory under concurrent use.
    pub fn free_len(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn len(&self) -> usize {
        self.shared.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(Error::InvalidHandle)
        } else {
            Ok(())
        }
    }
}

impl<P: Send> EventQueue<Event<P>> {
    /// Send an `(event_id, data)` pair.
    pub fn send_event(&self, id: u32, data: P, timeout: impl Into<Timeout>) -> Result<()> {
        self.send(Event { id, data }, timeout)
    }

    /// Wait for an `(event_id, data)` pair.
    pub fn wait_event(&self, timeout: impl Into<Timeout>) -> Result<(u32, P)> {
        self.wait(timeout).map(|e| (e.id, e.data))
    }
}

impl EventQueue<u32> {
    /// Raw word queue of `q_size` entries.
    pub fn create_raw(q_size: usize) -> Result<Self> {
        Self::create(q_size)
    }

    /// Task-context raw send; waits for space as long as it takes.
    pub fn send_raw(&self, word: u32) -> Result<()> {
        self.send(word, Timeout::Forever)
    }

    /// Interrupt-context raw send.
    pub fn send_raw_from_isr(&self, word: u32) -> Result<()> {
        self.send_from_isr(word)
    }

    /// Block until a word arrives.  Only fails if the queue is destroyed.
    pub fn wait_raw(&self) -> Result<u32> {
        self.wait(Timeout::Forever)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
