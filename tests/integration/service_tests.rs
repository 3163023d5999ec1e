//! End-to-end tests against the threaded service on the system clock.
//!
//! Timing assertions carry wide margins; host schedulers are not real-time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use swtimer::{
    Error, Timeout, TimerId, TimerKind, TimerService, TimerServiceConfig, TimerState,
};

use crate::fixtures::FireLog;

const SLACK: Duration = Duration::from_secs(2);

fn service() -> TimerService {
    TimerService::init(TimerServiceConfig::default()).unwrap()
}

#[test]
fn repeat_timer_fires_at_fixed_rate() {
    let svc = service();
    let log = FireLog::new();
    let h = svc
        .create("tick", TimerKind::Repeat, TimerId(1), Duration::from_millis(10), log.recorder())
        .unwrap();
    svc.start(h, Timeout::NoWait).unwrap();
    assert!(log.wait_for(5, SLACK));
    svc.stop(h, 100u32).unwrap();

    let fires = log.snapshot();
    for pair in fires.windows(2).take(4) {
        let step = pair[1].deadline - pair[0].deadline;
        assert!(step >= Duration::from_millis(10));
    }
    for f in &fires {
        assert!(f.fired_at >= f.deadline);
    }
}

#[test]
fn oneshot_fires_exactly_once() {
    let svc = service();
    let log = FireLog::new();
    let h = svc
        .create("once", TimerKind::OneShot, TimerId(2), Duration::from_millis(15), log.recorder())
        .unwrap();
    let started = Instant::now();
    svc.start(h, Timeout::NoWait).unwrap();

    assert!(log.wait_for(1, SLACK));
    assert!(log.snapshot()[0].fired_at >= started + Duration::from_millis(15));
    thread::sleep(Duration::from_millis(60));
    assert_eq!(log.len(), 1);
    assert_eq!(svc.state(h), Ok(TimerState::Fired));
}

#[test]
fn stop_before_deadline_means_no_callback() {
    let svc = service();
    let log = FireLog::new();
    let h = svc
        .create("t", TimerKind::OneShot, TimerId(3), Duration::from_millis(200), log.recorder())
        .unwrap();
    svc.start(h, Timeout::NoWait).unwrap();
    svc.stop(h, Timeout::NoWait).unwrap();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(log.len(), 0);
    assert_eq!(svc.state(h), Ok(TimerState::Stopped));
}

#[test]
fn stop_queued_behind_other_commands_beats_a_lagging_daemon() {
    let svc = service();
    let log = FireLog::new();
    let slow = svc
        .create("slow", TimerKind::OneShot, TimerId(20), Duration::from_millis(10), |_| {
            thread::sleep(Duration::from_millis(200));
        })
        .unwrap();
    let a = svc
        .create("a", TimerKind::OneShot, TimerId(21), Duration::from_millis(100), log.recorder())
        .unwrap();
    let c = svc
        .create("c", TimerKind::OneShot, TimerId(22), Duration::from_secs(5), log.recorder())
        .unwrap();
    svc.start(slow, Timeout::NoWait).unwrap();
    svc.start(a, Timeout::NoWait).unwrap();

    // The daemon is inside the slow callback; both commands wait in line
    // and are only seen after a's deadline has passed.
    thread::sleep(Duration::from_millis(40));
    svc.start(c, Timeout::NoWait).unwrap();
    svc.stop(a, Timeout::NoWait).unwrap();

    thread::sleep(Duration::from_millis(400));
    assert_eq!(log.count_of(TimerId(21)), 0);
    assert_eq!(svc.state(a), Ok(TimerState::Stopped));
    assert_eq!(svc.state(c), Ok(TimerState::Armed));
}

#[test]
fn isr_thread_drives_timers_without_blocking() {
    let svc = service();
    let log = FireLog::new();
    let h = svc
        .create("isr", TimerKind::OneShot, TimerId(4), Duration::from_millis(5), log.recorder())
        .unwrap();
    let commands = svc.commands();
    let isr = thread::spawn(move || {
        let start = Instant::now();
        let result = commands.start_from_isr(h);
        (result, start.elapsed())
    });
    let (result, took) = isr.join().unwrap();
    assert_eq!(result, Ok(()));
    assert!(took < Duration::from_millis(50));
    assert!(log.wait_for(1, SLACK));
}

#[test]
fn callback_may_command_other_timers() {
    let svc = service();
    let log = FireLog::new();
    let follower = svc
        .create("follower", TimerKind::OneShot, TimerId(6), Duration::from_millis(5), log.recorder())
        .unwrap();
    let commands = svc.commands();
    let mut record = log.recorder();
    let leader = svc
        .create("leader", TimerKind::OneShot, TimerId(5), Duration::from_millis(5), move |ev| {
            record(ev);
            // Never block the daemon on its own channel.
            let _ = commands.start(follower, Timeout::NoWait);
        })
        .unwrap();
    svc.start(leader, Timeout::NoWait).unwrap();

    assert!(log.wait_for(2, SLACK));
    assert_eq!(log.ids(), vec![TimerId(5), TimerId(6)]);
}

#[test]
fn alarm_fires_at_wall_clock_time() {
    let svc = service();
    let log = FireLog::new();
    let started = Instant::now();
    let at = SystemTime::now() + Duration::from_millis(40);
    let h = svc.create_alarm("wake", TimerId(7), at, log.recorder()).unwrap();
    svc.start(h, Timeout::NoWait).unwrap();

    assert!(log.wait_for(1, SLACK));
    assert!(log.snapshot()[0].fired_at >= started + Duration::from_millis(35));
    assert_eq!(svc.info(h).unwrap().alarm_at, Some(at));
}

#[test]
fn delete_retires_handle_for_good() {
    let svc = service();
    let h = svc
        .create("t", TimerKind::Repeat, TimerId(8), Duration::from_millis(5), |_| {})
        .unwrap();
    svc.start(h, Timeout::NoWait).unwrap();
    svc.delete(h, Timeout::NoWait).unwrap();
    assert_eq!(svc.start(h, Timeout::NoWait), Err(Error::InvalidHandle));

    let deadline = Instant::now() + SLACK;
    while svc.timer_count() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(svc.timer_count(), 0);
    assert_eq!(svc.state(h), Err(Error::InvalidHandle));
}

#[test]
fn services_are_independent() {
    let a = service();
    let b = service();
    let count = Arc::new(AtomicU32::new(0));
    let c = Arc::clone(&count);
    let h = a
        .create("a", TimerKind::OneShot, TimerId(1), Duration::from_millis(5), move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

    // A handle from one service means nothing to another.
    assert!(b.start(h, Timeout::NoWait).is_err());
    a.start(h, Timeout::NoWait).unwrap();
    drop(b);

    let deadline = Instant::now() + SLACK;
    while count.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(count.load(Ordering::Relaxed), 1);
}

#[test]
fn shutdown_stops_firing_and_joins_daemon() {
    let mut svc = service();
    let log = FireLog::new();
    let h = svc
        .create("t", TimerKind::Repeat, TimerId(9), Duration::from_millis(5), log.recorder())
        .unwrap();
    svc.start(h, Timeout::NoWait).unwrap();
    assert!(log.wait_for(2, SLACK));

    svc.shutdown().unwrap();
    assert!(!svc.is_running());
    let after = log.len();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(log.len(), after);
    assert_eq!(svc.reset_from_isr(h), Err(Error::InvalidHandle));
}

#[test]
fn custom_daemon_thread_settings_are_accepted() {
    let config = TimerServiceConfig::from_json(
        r#"{ "daemon_name": "tmr-custom", "daemon_stack_size": 65536, "max_timers": 4 }"#,
    )
    .unwrap();
    let svc = TimerService::init(config).unwrap();
    let log = FireLog::new();
    let h = svc
        .create("t", TimerKind::OneShot, TimerId(1), Duration::from_millis(1), log.recorder())
        .unwrap();
    svc.start(h, Timeout::NoWait).unwrap();
    assert!(log.wait_for(1, SLACK));
}
