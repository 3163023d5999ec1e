//! Fuzz target: timer command sequences against a detached service
//!
//! Each input byte pair is decoded into one operation (create, a task or
//! interrupt command, clock advance, daemon poll) and applied to a service
//! stepped with a manual clock.
//!
//! Invariants checked:
//! - No panics under any operation sequence
//! - Every live handle reports a valid state; retired handles stay invalid
//! - Occupied slots never exceed capacity
//! - A spent one-shot never fires again without a Reset or Stop
//!
//! cargo fuzz run fuzz_timer_commands

#![no_main]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use swtimer::adapters::time::ManualClock;
use swtimer::{
    Error, Timeout, TimerHandle, TimerId, TimerKind, TimerService, TimerServiceConfig,
    TimerState,
};

const SLOTS: usize = 6;

fuzz_target!(|data: &[u8]| {
    let clock = Arc::new(ManualClock::new());
    let config = TimerServiceConfig {
        max_timers: SLOTS,
        command_queue_depth: 4,
        ..TimerServiceConfig::default()
    };
    let Ok((svc, mut daemon)) = TimerService::detached(config, clock.clone()) else {
        return;
    };

    let fires = Arc::new(AtomicU32::new(0));
    let mut live: Vec<TimerHandle> = Vec::new();
    let mut retired: Vec<TimerHandle> = Vec::new();

    for pair in data.chunks_exact(2) {
        let (op, arg) = (pair[0], pair[1]);
        let pick = |v: &Vec<TimerHandle>| v.get(arg as usize % v.len().max(1)).copied();

        match op % 10 {
            0 => {
                let kind = match arg % 3 {
                    0 => TimerKind::OneShot,
                    1 => TimerKind::Repeat,
                    _ => TimerKind::Alarm,
                };
                let f = Arc::clone(&fires);
                let period = Duration::from_millis(u64::from(arg % 40) + 1);
                match svc.create("fz", kind, TimerId(u32::from(arg)), period, move |_| {
                    f.fetch_add(1, Ordering::Relaxed);
                }) {
                    Ok(h) => live.push(h),
                    Err(e) => assert_eq!(e, Error::AllocationFailure),
                }
            }
            1 => if let Some(h) = pick(&live) { let _ = svc.start(h, Timeout::NoWait); },
            2 => if let Some(h) = pick(&live) { let _ = svc.stop(h, Timeout::NoWait); },
            3 => if let Some(h) = pick(&live) { let _ = svc.reset(h, Timeout::NoWait); },
            4 => {
                if let Some(h) = pick(&live) {
                    if svc.delete(h, Timeout::NoWait).is_ok() {
                        live.retain(|x| *x != h);
                        retired.push(h);
                    }
                }
            }
            5 => if let Some(h) = pick(&live) { let _ = svc.start_from_isr(h); },
            6 => if let Some(h) = pick(&live) { let _ = svc.reset_from_isr(h); },
            7 => {
                if let Some(h) = pick(&live) {
                    if svc.delete_from_isr(h).is_ok() {
                        live.retain(|x| *x != h);
                        retired.push(h);
                    }
                }
            }
            8 => clock.advance(Duration::from_millis(u64::from(arg))),
            _ => {
                daemon.poll();
            }
        }

        assert!(svc.timer_count() <= SLOTS);
        for h in &live {
            assert!(svc.state(*h).is_ok());
        }
    }

    daemon.poll();
    for h in &retired {
        assert_eq!(svc.state(*h), Err(Error::InvalidHandle));
        assert_eq!(svc.start(*h, Timeout::NoWait), Err(Error::InvalidHandle));
    }

    // A fired one-shot with nothing pending stays quiet.
    for h in &live {
        if svc.state(*h) == Ok(TimerState::Fired) {
            let before = svc.info(*h).unwrap().fire_count;
            clock.advance(Duration::from_secs(1));
            daemon.poll();
            let info = svc.info(*h).unwrap();
            assert_eq!(info.state, TimerState::Fired);
            assert_eq!(info.fire_count, before);
        }
    }
});
