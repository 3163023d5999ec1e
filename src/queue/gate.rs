//! Waiter gate: parks task-context threads until a queue condition holds.
//!
//! Waiters check the condition and enqueue themselves inside one critical
//! section, so a signal can never slip between the check and the park.
//! [`Gate::signal`] only pops a waiter and unparks it; it never parks the
//! caller, which is what lets the interrupt path use it.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::VecDeque;
use std::thread::{self, Thread};
use std::time::Instant;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

struct Waiter {
    ticket: u64,
    thread: Thread,
}

pub(crate) struct Gate {
    waiters: Mutex<CriticalSectionRawMutex, RefCell<VecDeque<Waiter>>>,
    next_ticket: AtomicU64,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            waiters: Mutex::new(RefCell::new(VecDeque::new())),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// Block until `ready` yields a value or `deadline` passes.
    ///
    /// `ready` is evaluated inside the critical section; it must be short
    /// and must not block.  `deadline == None` waits indefinitely.
    pub(crate) fn wait_until<R>(
        &self,
        deadline: Option<Instant>,
        mut ready: impl FnMut() -> Option<R>,
    ) -> Option<R> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        loop {
            let outcome = self.waiters.lock(|w| {
                let outcome = ready();
                if outcome.is_none() {
                    w.borrow_mut().push_back(Waiter {
                        ticket,
                        thread: thread::current(),
                    });
                }
                outcome
            });
            if outcome.is_some() {
                return outcome;
            }

            match deadline {
                None => thread::park(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        self.forget(ticket);
                        // Last look: a signal aimed at us may have raced the timeout.
                        return self.waiters.lock(|_| ready());
                    }
                    thread::park_timeout(deadline - now);
                }
            }
            self.forget(ticket);
        }
    }

    /// Wake the longest-waiting thread, if any.  Never parks the caller.
    pub(crate) fn signal(&self) {
        self.waiters.lock(|w| {
            if let Some(waiter) = w.borrow_mut().pop_front() {
                waiter.thread.unpark();
            }
        });
    }

    /// Wake every waiter (used on queue teardown).
    pub(crate) fn signal_all(&self) {
        self.waiters.lock(|w| {
            for waiter in w.borrow_mut().drain(..) {
                waiter.thread.unpark();
            }
        });
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiters.lock(|w| w.borrow().len())
    }

    fn forget(&self, ticket: u64) {
        self.waiters
            .lock(|w| w.borrow_mut().retain(|waiter| waiter.ticket != ticket));
    }
}
