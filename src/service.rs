//! Timer service: the object returned by timer init.
//!
//! [`TimerService`] owns the registry, the command channel and the daemon
//! thread.  Several services can run side by side; nothing here is global.
//!
//! ```text
//!  TimerService::init(config)
//!     ├── TimerRegistry      (max_timers slots)
//!     ├── TimerCommandChannel (command_queue_depth)
//!     └── thread "sw-timer" ──▶ TimerDaemon::run
//! ```
//!
//! Dropping the service closes the channel and joins the daemon.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use log::{error, info, warn};

use crate::adapters::time::SystemClock;
use crate::config::TimerServiceConfig;
use crate::error::{Error, Result};
use crate::ports::Clock;
use crate::queue::Timeout;
use crate::timer::{
    TimerCallback, TimerCommandChannel, TimerDaemon, TimerEvent, TimerHandle, TimerId, TimerInfo,
    TimerKind, TimerRegistry, TimerState,
};

pub struct TimerService {
    registry: Arc<TimerRegistry>,
    commands: TimerCommandChannel,
    daemon: Option<JoinHandle<()>>,
}

impl TimerService {
    // ── Lifecycle ─────────────────────────────────────────────

    /// Build the service on the system clock and start its daemon thread.
    pub fn init(config: TimerServiceConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Same as [`init`](Self::init) with an injected clock.
    pub fn with_clock(config: TimerServiceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut builder = thread::Builder::new().name(config.daemon_name.as_str().into());
        if let Some(stack) = config.daemon_stack_size {
            builder = builder.stack_size(stack);
        }
        let (mut service, daemon) = Self::detached(config, clock)?;

        let handle = builder.spawn(move || daemon.run()).map_err(|e| {
            error!("timer service: daemon thread spawn failed: {}", e);
            Error::AllocationFailure
        });
        match handle {
            Ok(handle) => {
                service.daemon = Some(handle);
                Ok(service)
            }
            Err(e) => {
                // The daemon was moved into the failed closure and dropped;
                // close the channel so Drop does not wait on it.
                let _ = service.commands.close();
                Err(e)
            }
        }
    }

    /// Build the service without a thread.  The caller drives the returned
    /// daemon, typically with [`TimerDaemon::poll`] under a manual clock.
    pub fn detached(
        config: TimerServiceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, TimerDaemon)> {
        config.validate()?;
        let registry = Arc::new(TimerRegistry::new(config.max_timers)?);
        let commands = TimerCommandChannel::new(
            config.command_queue_depth,
            Arc::clone(&registry),
            Arc::clone(&clock),
        )?;
        let daemon = TimerDaemon::new(
            Arc::clone(&registry),
            commands.clone(),
            clock,
            config.catch_up,
        );
        info!(
            "timer service: '{}' ready ({} slots, {} command slots, {:?})",
            config.daemon_name, config.max_timers, config.command_queue_depth, config.catch_up
        );
        Ok((
            Self {
                registry,
                commands,
                daemon: None,
            },
            daemon,
        ))
    }

    /// Close the command channel and wait for the daemon to exit.
    /// Timers still armed never fire afterwards.  Calling it twice is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        if !self.commands.is_closed() {
            self.commands.close()?;
            info!("timer service: shutting down");
        }
        if let Some(handle) = self.daemon.take() {
            if handle.join().is_err() {
                error!("timer service: daemon thread panicked");
            }
        }
        Ok(())
    }

    /// `false` once shut down, or if the daemon thread died.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed() && self.daemon.as_ref().is_none_or(|h| !h.is_finished())
    }

    // ── Creation ──────────────────────────────────────────────

    pub fn create(
        &self,
        name: &str,
        kind: TimerKind,
        id: TimerId,
        period: Duration,
        callback: impl FnMut(&TimerEvent) + Send + 'static,
    ) -> Result<TimerHandle> {
        self.ensure_open()?;
        self.registry
            .create(name, kind, id, period, Box::new(callback) as TimerCallback)
    }

    pub fn create_alarm(
        &self,
        name: &str,
        id: TimerId,
        at: SystemTime,
        callback: impl FnMut(&TimerEvent) + Send + 'static,
    ) -> Result<TimerHandle> {
        self.ensure_open()?;
        self.registry.create_alarm(name, id, at, Box::new(callback))
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn start(&self, handle: TimerHandle, timeout: impl Into<Timeout>) -> Result<()> {
        self.commands.start(handle, timeout)
    }

    pub fn stop(&self, handle: TimerHandle, timeout: impl Into<Timeout>) -> Result<()> {
        self.commands.stop(handle, timeout)
    }

    pub fn delete(&self, handle: TimerHandle, timeout: impl Into<Timeout>) -> Result<()> {
        self.commands.delete(handle, timeout)
    }

    pub fn reset(&self, handle: TimerHandle, timeout: impl Into<Timeout>) -> Result<()> {
        self.commands.reset(handle, timeout)
    }

    pub fn start_from_isr(&self, handle: TimerHandle) -> Result<()> {
        self.commands.start_from_isr(handle).inspect_err(isr_rejected)
    }

    pub fn stop_from_isr(&self, handle: TimerHandle) -> Result<()> {
        self.commands.stop_from_isr(handle).inspect_err(isr_rejected)
    }

    pub fn delete_from_isr(&self, handle: TimerHandle) -> Result<()> {
        self.commands.delete_from_isr(handle).inspect_err(isr_rejected)
    }

    pub fn reset_from_isr(&self, handle: TimerHandle) -> Result<()> {
        self.commands.reset_from_isr(handle).inspect_err(isr_rejected)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self, handle: TimerHandle) -> Result<TimerState> {
        self.registry.state(handle)
    }

    pub fn info(&self, handle: TimerHandle) -> Result<TimerInfo> {
        self.registry.info(handle)
    }

    pub fn find(&self, id: TimerId) -> Option<TimerHandle> {
        self.registry.find(id)
    }

    pub fn timer_count(&self) -> usize {
        self.registry.len()
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.pending()
    }

    pub fn free_command_slots(&self) -> usize {
        self.commands.free_len()
    }

    /// Shared registry, for callbacks that need to inspect timers.
    pub fn registry(&self) -> Arc<TimerRegistry> {
        Arc::clone(&self.registry)
    }

    /// A clone of the command channel, for callbacks and interrupt
    /// handlers that issue commands without holding the service.
    pub fn commands(&self) -> TimerCommandChannel {
        self.commands.clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.commands.is_closed() {
            Err(Error::InvalidHandle)
        } else {
            Ok(())
        }
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn isr_rejected(e: &Error) {
    if *e == Error::InterruptContextRejected {
        warn!("timer service: interrupt-context command rejected, channel full");
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
