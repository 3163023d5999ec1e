//! Timer command channel.
//!
//! A dedicated [`EventQueue`] that carries [`TimerCommand`]s from any
//! context to the daemon.  Task-context calls wait up to the caller's
//! timeout for space; the `*_from_isr` variants make a single attempt and
//! fail with [`Error::InterruptContextRejected`] under load.  Interrupt
//! callers should expect that and carry on.
//!
//! Handles are checked before anything is queued, using only the
//! registry's atomics, so the check is safe on the interrupt path too.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};

use super::{TimerHandle, TimerRegistry, TimerState};
use crate::error::{Error, Result};
use crate::ports::Clock;
use crate::queue::{EventQueue, Timeout};

/// What the daemon should do to the target timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Start,
    Stop,
    Delete,
    Reset,
}

/// One queued request.  Consumed exactly once by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerCommand {
    pub target: TimerHandle,
    pub action: TimerAction,
    pub issued_at: Instant,
}

#[derive(Clone)]
pub struct TimerCommandChannel {
    queue: EventQueue<TimerCommand>,
    registry: Arc<TimerRegistry>,
    clock: Arc<dyn Clock>,
}

impl TimerCommandChannel {
    pub fn new(depth: usize, registry: Arc<TimerRegistry>, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self {
            queue: EventQueue::create(depth)?,
            registry,
            clock,
        })
    }

    // ── Task context ──────────────────────────────────────────

    pub fn start(&self, handle: TimerHandle, timeout: impl Into<Timeout>) -> Result<()> {
        self.send(handle, TimerAction::Start, timeout.into())
    }

    pub fn stop(&self, handle: TimerHandle, timeout: impl Into<Timeout>) -> Result<()> {
        self.send(handle, TimerAction::Stop, timeout.into())
    }

    pub fn delete(&self, handle: TimerHandle, timeout: impl Into<Timeout>) -> Result<()> {
        self.send(handle, TimerAction::Delete, timeout.into())
    }

    pub fn reset(&self, handle: TimerHandle, timeout: impl Into<Timeout>) -> Result<()> {
        self.send(handle, TimerAction::Reset, timeout.into())
    }

    // ── Interrupt context ─────────────────────────────────────

    pub fn start_from_isr(&self, handle: TimerHandle) -> Result<()> {
        self.send_from_isr(handle, TimerAction::Start)
    }

    pub fn stop_from_isr(&self, handle: TimerHandle) -> Result<()> {
        self.send_from_isr(handle, TimerAction::Stop)
    }

    pub fn delete_from_isr(&self, handle: TimerHandle) -> Result<()> {
        self.send_from_isr(handle, TimerAction::Delete)
    }

    pub fn reset_from_isr(&self, handle: TimerHandle) -> Result<()> {
        self.send_from_isr(handle, TimerAction::Reset)
    }

    // ── Daemon side ───────────────────────────────────────────

    pub(crate) fn receive(&self, timeout: Timeout) -> Result<TimerCommand> {
        self.queue.wait(timeout)
    }

    /// Tear the channel down; a daemon blocked in `receive` wakes with
    /// [`Error::InvalidHandle`].
    pub(crate) fn close(&self) -> Result<()> {
        self.queue.destroy()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_destroyed()
    }

    /// Commands queued and not yet taken by the daemon.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn free_len(&self) -> usize {
        self.queue.free_len()
    }

    // ── Internal ──────────────────────────────────────────────

    fn send(&self, handle: TimerHandle, action: TimerAction, timeout: Timeout) -> Result<()> {
        self.check(handle, action)?;
        let command = self.command(handle, action);
        self.reserve(handle, action);
        self.queue.send(command, timeout).inspect_err(|e| {
            self.withdraw(handle, action);
            warn!("timer: {:?} for {:?} not queued: {}", action, handle, e);
        })?;
        self.accepted(handle, action);
        Ok(())
    }

    fn send_from_isr(&self, handle: TimerHandle, action: TimerAction) -> Result<()> {
        self.check(handle, action)?;
        let command = self.command(handle, action);
        self.reserve(handle, action);
        self.queue
            .send_from_isr(command)
            .inspect_err(|_| self.withdraw(handle, action))?;
        self.accepted(handle, action);
        Ok(())
    }

    fn command(&self, target: TimerHandle, action: TimerAction) -> TimerCommand {
        TimerCommand {
            target,
            action,
            issued_at: self.clock.now(),
        }
    }

    fn check(&self, handle: TimerHandle, action: TimerAction) -> Result<()> {
        match self.registry.state(handle)? {
            TimerState::Deleted => Err(Error::InvalidHandle),
            TimerState::Fired
                if action == TimerAction::Start && !self.registry.rearm_pending(handle) =>
            {
                Err(Error::Expired)
            }
            _ => Ok(()),
        }
    }

    /// The daemon may pop the command the moment it is pushed, so the
    /// rearm count has to be up before the push.
    fn reserve(&self, handle: TimerHandle, action: TimerAction) {
        if matches!(action, TimerAction::Reset | TimerAction::Stop) {
            self.registry.note_rearm(handle);
        }
    }

    fn withdraw(&self, handle: TimerHandle, action: TimerAction) {
        if matches!(action, TimerAction::Reset | TimerAction::Stop) {
            self.registry.rearm_applied(handle);
        }
    }

    fn accepted(&self, handle: TimerHandle, action: TimerAction) {
        // A late tag is inert: removal bumps the generation it would match.
        if action == TimerAction::Delete {
            self.registry.tag_delete(handle);
        }
        debug!("timer: queued {:?} for {:?}", action, handle);
    }
}
