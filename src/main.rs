//! swtimer simulation: boots a timer service on the host, arms a mix of
//! timers and drives them from a simulated interrupt thread.
//!
//! ```text
//!  main ──init──▶ TimerService ──▶ daemon thread ──▶ callbacks
//!   │                  ▲
//!   └── "isr" thread ──┘  *_from_isr, never blocks
//! ```
//!
//! Usage: `swtimer-sim [config.json]`.  `RUST_LOG=debug` shows every command.
#![deny(unused_must_use)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use log::{info, warn};

use swtimer::{Error, Timeout, TimerId, TimerKind, TimerService, TimerServiceConfig};

const HEARTBEAT: TimerId = TimerId(1);
const WATCHDOG: TimerId = TimerId(2);
const WAKEUP: TimerId = TimerId(3);

fn main() -> Result<()> {
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            TimerServiceConfig::from_json(&text).with_context(|| format!("parsing {path}"))?
        }
        None => TimerServiceConfig::default(),
    };

    info!("swtimer-sim v{}", env!("CARGO_PKG_VERSION"));
    let mut service = TimerService::init(config).context("timer init")?;

    // ── Timers ────────────────────────────────────────────────
    let beats = Arc::new(AtomicU32::new(0));
    let heartbeat = {
        let beats = Arc::clone(&beats);
        service.create(
            "heartbeat",
            TimerKind::Repeat,
            HEARTBEAT,
            Duration::from_millis(50),
            move |ev| {
                let n = beats.fetch_add(1, Ordering::Relaxed) + 1;
                let lag = ev.fired_at.saturating_duration_since(ev.deadline);
                info!("heartbeat #{} (lag {:?}, missed {})", n, lag, ev.missed);
            },
        )?
    };

    let watchdog = service.create(
        "watchdog",
        TimerKind::OneShot,
        WATCHDOG,
        Duration::from_millis(120),
        |ev| warn!("watchdog '{}' expired: no kick for 120 ms", ev.name),
    )?;

    let wakeup = service.create_alarm(
        "wakeup",
        WAKEUP,
        SystemTime::now() + Duration::from_millis(400),
        |ev| info!("alarm '{}' rang", ev.name),
    )?;

    service.start(heartbeat, Timeout::NoWait)?;
    service.start(watchdog, Timeout::NoWait)?;
    service.start(wakeup, Timeout::NoWait)?;

    // ── Simulated interrupt source ────────────────────────────
    // Kicks the watchdog four times, then goes quiet so it expires.
    let commands = service.commands();
    let isr = thread::Builder::new()
        .name("isr".into())
        .spawn(move || {
            for _ in 0..4 {
                thread::sleep(Duration::from_millis(60));
                match commands.reset_from_isr(watchdog) {
                    Ok(()) => {}
                    Err(Error::InterruptContextRejected) => warn!("isr: kick dropped"),
                    Err(e) => warn!("isr: kick failed: {}", e),
                }
            }
        })
        .context("spawning isr thread")?;

    isr.join()
        .map_err(|_| anyhow::anyhow!("isr thread panicked"))?;
    thread::sleep(Duration::from_millis(300));

    // A spent one-shot refuses a plain Start.
    match service.start(watchdog, Timeout::NoWait) {
        Err(Error::Expired) => info!("watchdog spent, Start refused as expected"),
        other => warn!("unexpected Start result on spent watchdog: {:?}", other),
    }

    service.stop(heartbeat, Timeout::from(10u32))?;
    service.delete(heartbeat, Timeout::from(10u32))?;
    thread::sleep(Duration::from_millis(20));

    info!(
        "heartbeat fired {} times; {} timers left, {} commands pending",
        beats.load(Ordering::Relaxed),
        service.timer_count(),
        service.pending_commands()
    );
    service.shutdown()?;
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}
