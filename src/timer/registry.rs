//! Timer registry: fixed slot arena that owns every live timer.
//!
//! Creation happens here directly, in the caller's context, without the
//! daemon.  After that only the daemon changes a timer.  Each slot keeps
//! its lifecycle in atomics so any context, interrupt handlers included,
//! can validate a handle without taking a lock:
//!
//! ```text
//!  generation   bumped on delete; stale handles stop matching
//!  state        TimerState published by the daemon (0 = free slot)
//!  delete tag   generation of a Delete that is queued but not yet applied
//!  rearms       Reset/Stop commands queued but not yet applied
//! ```

use core::cell::RefCell;
use core::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{info, warn};

use super::{
    TimerCallback, TimerHandle, TimerId, TimerInfo, TimerKind, TimerName, TimerState,
    bounded_label,
};
use crate::error::{Error, Result};

/// Longest period (or alarm lead time) a timer may carry.
pub const MAX_PERIOD: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

const FREE: u8 = 0;

// ═══════════════════════════════════════════════════════════════
//  Entry
// ═══════════════════════════════════════════════════════════════

pub(crate) struct TimerEntry {
    pub(crate) name: TimerName,
    pub(crate) id: TimerId,
    pub(crate) kind: TimerKind,
    pub(crate) period: Duration,
    pub(crate) alarm_at: Option<SystemTime>,
    /// Creation order; breaks ties between equal deadlines.
    pub(crate) seq: u64,
    pub(crate) next_deadline: Option<Instant>,
    /// Taken out by the daemon while the callback runs.
    pub(crate) callback: Option<TimerCallback>,
    pub(crate) fire_count: u64,
}

impl TimerEntry {
    /// Deadline for an arm (Start/Reset) issued at `now`.
    pub(crate) fn arm_deadline(&self, now: Instant, wall_now: SystemTime) -> Instant {
        let lead = match (self.kind, self.alarm_at) {
            (TimerKind::Alarm, Some(at)) => at
                .duration_since(wall_now)
                .unwrap_or(Duration::ZERO)
                .min(MAX_PERIOD),
            _ => self.period,
        };
        now + lead
    }
}

struct Slot {
    generation: AtomicU32,
    state: AtomicU8,
    delete_tag: AtomicU32,
    pending_rearms: AtomicU32,
    entry: Mutex<CriticalSectionRawMutex, RefCell<Option<TimerEntry>>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            generation: AtomicU32::new(1),
            state: AtomicU8::new(FREE),
            delete_tag: AtomicU32::new(0),
            pending_rearms: AtomicU32::new(0),
            entry: Mutex::new(RefCell::new(None)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Registry
// ═══════════════════════════════════════════════════════════════

pub struct TimerRegistry {
    slots: Box<[Slot]>,
    next_seq: AtomicU64,
}

impl TimerRegistry {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument("registry needs at least one slot"));
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| Error::AllocationFailure)?;
        slots.extend((0..capacity).map(|_| Slot::new()));
        Ok(Self {
            slots: slots.into_boxed_slice(),
            next_seq: AtomicU64::new(0),
        })
    }

    // ── Creation ──────────────────────────────────────────────

    /// Register a relative timer.  OneShot and Repeat need a non-zero
    /// period; for Alarm the period is the lead time from each Start.
    pub fn create(
        &self,
        name: &str,
        kind: TimerKind,
        id: TimerId,
        period: Duration,
        callback: TimerCallback,
    ) -> Result<TimerHandle> {
        if kind != TimerKind::Alarm && period.is_zero() {
            return Err(Error::InvalidArgument("period must be non-zero"));
        }
        self.insert(name, kind, id, period, None, callback)
    }

    /// Register an alarm for an absolute wall-clock time.
    pub fn create_alarm(
        &self,
        name: &str,
        id: TimerId,
        at: SystemTime,
        callback: TimerCallback,
    ) -> Result<TimerHandle> {
        self.insert(name, TimerKind::Alarm, id, Duration::ZERO, Some(at), callback)
    }

    fn insert(
        &self,
        name: &str,
        kind: TimerKind,
        id: TimerId,
        period: Duration,
        alarm_at: Option<SystemTime>,
        callback: TimerCallback,
    ) -> Result<TimerHandle> {
        if period > MAX_PERIOD {
            return Err(Error::InvalidArgument("period too long"));
        }

        for (index, slot) in self.slots.iter().enumerate() {
            if slot
                .state
                .compare_exchange(
                    FREE,
                    TimerState::Created as u8,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_err()
            {
                continue;
            }

            let entry = TimerEntry {
                name: bounded_label(name),
                id,
                kind,
                period,
                alarm_at,
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                next_deadline: None,
                callback: Some(callback),
                fire_count: 0,
            };
            slot.delete_tag.store(0, Ordering::Relaxed);
            slot.pending_rearms.store(0, Ordering::Relaxed);
            slot.entry.lock(|e| *e.borrow_mut() = Some(entry));

            let handle = TimerHandle {
                index: index as u32,
                generation: slot.generation.load(Ordering::Acquire),
            };
            info!(
                "timer: created '{}' {:?} id={} period={:?} slot={}",
                name, kind, id.0, period, index
            );
            return Ok(handle);
        }

        warn!("timer: no free slot for '{}'", name);
        Err(Error::AllocationFailure)
    }

    // ── Queries (any context) ─────────────────────────────────

    /// Published state.  A timer with a queued Delete reports `Deleted`;
    /// once the daemon has applied it the handle is simply invalid.
    pub fn state(&self, handle: TimerHandle) -> Result<TimerState> {
        let slot = self.slot(handle)?;
        let state = TimerState::from_u8(slot.state.load(Ordering::Acquire))
            .ok_or(Error::InvalidHandle)?;
        if slot.generation.load(Ordering::Acquire) != handle.generation {
            return Err(Error::InvalidHandle);
        }
        if slot.delete_tag.load(Ordering::Acquire) == handle.generation {
            return Ok(TimerState::Deleted);
        }
        Ok(state)
    }

    pub fn is_live(&self, handle: TimerHandle) -> bool {
        matches!(self.state(handle), Ok(s) if s != TimerState::Deleted)
    }

    pub fn info(&self, handle: TimerHandle) -> Result<TimerInfo> {
        let state = self.state(handle)?;
        let slot = self.slot(handle)?;
        slot.entry.lock(|e| {
            e.borrow().as_ref().map(|e| TimerInfo {
                name: e.name.clone(),
                id: e.id,
                kind: e.kind,
                period: e.period,
                alarm_at: e.alarm_at,
                state,
                next_deadline: e.next_deadline,
                fire_count: e.fire_count,
            })
        })
        .ok_or(Error::InvalidHandle)
    }

    /// Look a live timer up by the token its creator supplied.
    pub fn find(&self, id: TimerId) -> Option<TimerHandle> {
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            let handle = TimerHandle {
                index: index as u32,
                generation: slot.generation.load(Ordering::Acquire),
            };
            let matches = slot
                .entry
                .lock(|e| e.borrow().as_ref().is_some_and(|e| e.id == id));
            (matches && self.is_live(handle)).then_some(handle)
        })
    }

    /// Occupied slots.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state.load(Ordering::Acquire) != FREE)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    // ── Command bookkeeping (caller side) ─────────────────────

    pub(crate) fn tag_delete(&self, handle: TimerHandle) {
        if let Ok(slot) = self.slot(handle) {
            slot.delete_tag.store(handle.generation, Ordering::Release);
        }
    }

    pub(crate) fn delete_tagged(&self, handle: TimerHandle) -> bool {
        self.slot(handle)
            .is_ok_and(|s| s.delete_tag.load(Ordering::Acquire) == handle.generation)
    }

    pub(crate) fn note_rearm(&self, handle: TimerHandle) {
        if let Ok(slot) = self.slot(handle) {
            slot.pending_rearms.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub(crate) fn rearm_pending(&self, handle: TimerHandle) -> bool {
        self.slot(handle)
            .is_ok_and(|s| s.pending_rearms.load(Ordering::Acquire) > 0)
    }

    // ── Daemon-only mutation ──────────────────────────────────

    pub(crate) fn rearm_applied(&self, handle: TimerHandle) {
        if let Ok(slot) = self.slot(handle) {
            let _ = slot
                .pending_rearms
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        }
    }

    pub(crate) fn with_entry<R>(
        &self,
        handle: TimerHandle,
        f: impl FnOnce(&mut TimerEntry) -> R,
    ) -> Result<R> {
        let slot = self.slot(handle)?;
        slot.entry
            .lock(|e| e.borrow_mut().as_mut().map(f))
            .ok_or(Error::InvalidHandle)
    }

    pub(crate) fn publish(&self, handle: TimerHandle, state: TimerState) {
        if let Ok(slot) = self.slot(handle) {
            slot.state.store(state as u8, Ordering::Release);
        }
    }

    /// Drop the timer and retire its handle for good.
    pub(crate) fn remove(&self, handle: TimerHandle) -> Result<TimerEntry> {
        let slot = self.slot(handle)?;
        slot.state
            .store(TimerState::Deleted as u8, Ordering::Release);
        let entry = slot
            .entry
            .lock(|e| e.borrow_mut().take())
            .ok_or(Error::InvalidHandle)?;

        let next = match handle.generation.wrapping_add(1) {
            0 => 1,
            g => g,
        };
        slot.generation.store(next, Ordering::Release);
        slot.delete_tag.store(0, Ordering::Relaxed);
        slot.pending_rearms.store(0, Ordering::Relaxed);
        slot.state.store(FREE, Ordering::Release);
        info!("timer: deleted '{}' id={}", entry.name, entry.id.0);
        Ok(entry)
    }

    fn slot(&self, handle: TimerHandle) -> Result<&Slot> {
        let slot = self
            .slots
            .get(handle.index as usize)
            .ok_or(Error::InvalidHandle)?;
        if slot.generation.load(Ordering::Acquire) != handle.generation {
            return Err(Error::InvalidHandle);
        }
        Ok(slot)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
