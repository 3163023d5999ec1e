//! Shared helpers for integration tests.
//!
//! [`FireLog`] records every callback invocation so tests can assert on
//! the full firing history.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use swtimer::{TimerEvent, TimerId};

// ── Fire record ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Fire {
    pub id: TimerId,
    pub deadline: Instant,
    pub fired_at: Instant,
    pub missed: u32,
}

// ── FireLog ───────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FireLog {
    fires: Arc<Mutex<Vec<Fire>>>,
}

#[allow(dead_code)]
impl FireLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback that appends to this log.
    pub fn recorder(&self) -> impl FnMut(&TimerEvent) + Send + use<> {
        let fires = Arc::clone(&self.fires);
        move |ev: &TimerEvent| {
            fires.lock().unwrap().push(Fire {
                id: ev.id,
                deadline: ev.deadline,
                fired_at: ev.fired_at,
                missed: ev.missed,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.fires.lock().unwrap().len()
    }

    pub fn count_of(&self, id: TimerId) -> usize {
        self.fires
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.id == id)
            .count()
    }

    pub fn ids(&self) -> Vec<TimerId> {
        self.fires.lock().unwrap().iter().map(|f| f.id).collect()
    }

    pub fn snapshot(&self) -> Vec<Fire> {
        self.fires.lock().unwrap().clone()
    }

    /// Poll until `n` fires were recorded or `limit` elapses.
    pub fn wait_for(&self, n: usize, limit: Duration) -> bool {
        let until = Instant::now() + limit;
        while Instant::now() < until {
            if self.len() >= n {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        self.len() >= n
    }
}
