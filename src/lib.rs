//! Software timer service on an interrupt-safe bounded event queue.
//!
//! ```text
//!  task / ISR ──▶ TimerService ──▶ TimerCommandChannel (EventQueue)
//!                     │                        │
//!                     ▼                        ▼
//!               TimerRegistry ◀──────── TimerDaemon ──▶ callbacks
//! ```
//!
//! [`queue::EventQueue`] is usable on its own as a general-purpose
//! ISR-to-task FIFO.

#![deny(unused_must_use)]

pub mod adapters;
pub mod config;
pub mod error;
pub mod ports;
pub mod queue;
pub mod service;
pub mod timer;

pub use config::{CatchUpPolicy, TimerServiceConfig};
pub use error::{Error, Result, status};
pub use queue::{Event, EventQueue, RawQueue, Timeout, WAIT_FOREVER};
pub use service::TimerService;
pub use timer::{TimerEvent, TimerHandle, TimerId, TimerInfo, TimerKind, TimerState};
