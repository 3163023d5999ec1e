//! Timer daemon: the single consumer of the command channel and the only
//! context that mutates timer state.
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ loop                                                     │
//!   │   timeout = earliest armed deadline - now  (or forever)  │
//!   │   wait on command channel (timeout)                      │
//!   │     command  → apply (start / stop / delete / reset)     │
//!   │   fire every armed timer whose deadline has passed,      │
//!   │   ascending deadline, ties by creation order             │
//!   └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-timer transitions:
//!
//! ```text
//!  Created ─Start─▶ Armed ─deadline─▶ (callback) ─▶ Armed      Repeat
//!                                                └▶ Fired      OneShot / Alarm
//!  Armed|Stopped|Fired ─Stop─▶ Stopped
//!  any ─Reset─▶ Armed            any ─Delete─▶ (slot retired)
//! ```
//!
//! Repeat timers are fixed-rate: the next deadline is the previous
//! *deadline* plus the period, not the callback's completion time.  When
//! the daemon wakes more than a whole period late, [`CatchUpPolicy`] decides
//! between one coalesced firing and a burst of catch-up firings.
//!
//! Callbacks run synchronously here.  A slow callback delays every other
//! timer; one that never returns stalls them all.  Dispatch to a worker
//! from the callback if isolation matters.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::{
    TimerAction, TimerCommand, TimerCommandChannel, TimerEvent, TimerHandle, TimerKind,
    TimerRegistry, TimerState,
};
use crate::config::CatchUpPolicy;
use crate::error::{Error, Result};
use crate::ports::Clock;
use crate::queue::Timeout;

/// Ordering key of an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Armed {
    deadline: Instant,
    seq: u64,
    handle: TimerHandle,
}

pub struct TimerDaemon {
    registry: Arc<TimerRegistry>,
    commands: TimerCommandChannel,
    clock: Arc<dyn Clock>,
    policy: CatchUpPolicy,
    armed: BTreeSet<Armed>,
}

impl TimerDaemon {
    pub fn new(
        registry: Arc<TimerRegistry>,
        commands: TimerCommandChannel,
        clock: Arc<dyn Clock>,
        policy: CatchUpPolicy,
    ) -> Self {
        Self {
            registry,
            commands,
            clock,
            policy,
            armed: BTreeSet::new(),
        }
    }

    // ── Loop ──────────────────────────────────────────────────

    /// Serve commands and fire timers until the command channel is closed.
    pub fn run(mut self) {
        info!(
            "timer daemon: running ({} slots, {:?})",
            self.registry.capacity(),
            self.policy
        );
        loop {
            match self.commands.receive(self.next_timeout()) {
                Ok(command) => {
                    self.apply(command);
                    // Everything already queued lands before the expiry check.
                    while let Ok(command) = self.commands.receive(Timeout::NoWait) {
                        self.apply(command);
                    }
                }
                Err(Error::QueueEmpty) => {}
                Err(e) => {
                    info!("timer daemon: command channel closed ({}), exiting", e);
                    break;
                }
            }
            self.fire_due();
        }
    }

    /// One non-blocking step: apply every queued command, then fire
    /// whatever is due.  Returns the number of callbacks invoked.
    pub fn poll(&mut self) -> usize {
        while let Ok(command) = self.commands.receive(Timeout::NoWait) {
            self.apply(command);
        }
        self.fire_due()
    }

    /// How long the loop would wait for the next command right now.
    pub fn next_timeout(&self) -> Timeout {
        match self.armed.first() {
            None => Timeout::Forever,
            Some(next) => {
                let remaining = next.deadline.saturating_duration_since(self.clock.now());
                Timeout::from(remaining)
            }
        }
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.armed.first().map(|a| a.deadline)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn apply(&mut self, command: TimerCommand) {
        let TimerCommand {
            target, action, ..
        } = command;
        if matches!(action, TimerAction::Reset | TimerAction::Stop) {
            self.registry.rearm_applied(target);
        }

        let now = self.clock.now();
        let result = match action {
            TimerAction::Start => self.arm(target, now, false),
            TimerAction::Reset => self.arm(target, now, true),
            TimerAction::Stop => self.disarm(target),
            TimerAction::Delete => self.delete(target),
        };
        match result {
            Ok(()) => debug!(
                "timer daemon: applied {:?} to {:?} (queued {:?} ago)",
                action,
                target,
                now.saturating_duration_since(command.issued_at)
            ),
            Err(e) => warn!(
                "timer daemon: dropped {:?} for {:?}: {}",
                action, target, e
            ),
        }
    }

    fn arm(&mut self, handle: TimerHandle, now: Instant, reset: bool) -> Result<()> {
        match self.registry.state(handle)? {
            TimerState::Deleted => return Err(Error::InvalidHandle),
            TimerState::Fired if !reset => return Err(Error::Expired),
            _ => {}
        }
        let wall_now = self.clock.wall_now();
        let (previous, key) = self.registry.with_entry(handle, |e| {
            let deadline = e.arm_deadline(now, wall_now);
            let previous = e.next_deadline.replace(deadline);
            let key = Armed {
                deadline,
                seq: e.seq,
                handle,
            };
            (previous.map(|d| Armed { deadline: d, ..key }), key)
        })?;

        if let Some(previous) = previous {
            self.armed.remove(&previous);
        }
        self.armed.insert(key);
        self.registry.publish(handle, TimerState::Armed);
        Ok(())
    }

    fn disarm(&mut self, handle: TimerHandle) -> Result<()> {
        if self.registry.state(handle)? == TimerState::Deleted {
            return Err(Error::InvalidHandle);
        }
        self.unschedule(handle)?;
        self.registry.publish(handle, TimerState::Stopped);
        Ok(())
    }

    fn delete(&mut self, handle: TimerHandle) -> Result<()> {
        self.unschedule(handle)?;
        self.registry.remove(handle)?;
        Ok(())
    }

    fn unschedule(&mut self, handle: TimerHandle) -> Result<()> {
        let previous = self
            .registry
            .with_entry(handle, |e| e.next_deadline.take().map(|d| (d, e.seq)))?;
        if let Some((deadline, seq)) = previous {
            self.armed.remove(&Armed {
                deadline,
                seq,
                handle,
            });
        }
        Ok(())
    }

    // ── Expiry ────────────────────────────────────────────────

    /// Fire every timer due at the current instant.  Returns the number of
    /// callbacks invoked.
    pub fn fire_due(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;
        while let Some(next) = self.armed.first().copied() {
            if next.deadline > now {
                break;
            }
            self.armed.remove(&next);
            if self.fire(next, now) {
                fired += 1;
            }
        }
        fired
    }

    fn fire(&mut self, due: Armed, now: Instant) -> bool {
        let handle = due.handle;
        let policy = self.policy;
        let taken = self.registry.with_entry(handle, |e| {
            e.fire_count += 1;
            let mut missed = 0;
            e.next_deadline = match e.kind {
                TimerKind::Repeat => {
                    let mut next = due.deadline + e.period;
                    // Exactly one period late is on time for the next tick.
                    if next < now && policy == CatchUpPolicy::Coalesce {
                        missed = skipped_periods(now - due.deadline, e.period);
                        next = now + e.period;
                    }
                    Some(next)
                }
                TimerKind::OneShot | TimerKind::Alarm => None,
            };
            let event = TimerEvent {
                handle,
                id: e.id,
                name: e.name.clone(),
                kind: e.kind,
                deadline: due.deadline,
                fired_at: now,
                missed,
            };
            (event, e.next_deadline, e.callback.take())
        });
        let Ok((event, next_deadline, mut callback)) = taken else {
            return false;
        };

        match next_deadline {
            Some(deadline) => {
                self.armed.insert(Armed { deadline, ..due });
            }
            None => self.registry.publish(handle, TimerState::Fired),
        }

        if event.missed > 0 {
            debug!(
                "timer daemon: '{}' woke late, coalesced {} missed deadlines",
                event.name, event.missed
            );
        }

        // Delete wins over a concurrent expiry, up to the last moment.
        if self.registry.delete_tagged(handle) {
            debug!("timer daemon: {:?} due but delete pending, skipped", handle);
            if let Some(deadline) = next_deadline {
                self.armed.remove(&Armed { deadline, ..due });
            }
            let _ = self.registry.with_entry(handle, |e| {
                e.fire_count -= 1;
                e.next_deadline = None;
                e.callback = callback;
            });
            return false;
        }

        if let Some(callback) = callback.as_mut() {
            callback(&event);
        }
        // Only the daemon removes entries, so the slot is still ours.
        let _ = self
            .registry
            .with_entry(handle, |e| e.callback = callback);
        true
    }
}

/// Whole periods that elapsed after `late` past a deadline.
fn skipped_periods(late: Duration, period: Duration) -> u32 {
    let periods = late.as_nanos() / period.as_nanos().max(1);
    u32::try_from(periods).unwrap_or(u32::MAX)
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
