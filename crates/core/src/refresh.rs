//! Display refresh acknowledgement
//!
//! Slow displays need a refresh to complete before new input is drawn over
//! it. The engine asks for a refresh after each change and waits for the
//! acknowledgement before accepting the next input batch.

use inkpage_model::IntRect;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub trait DisplayRefresh: Send + Sync {
    /// Ask the display to show `region` (`None` for the whole surface)
    fn request_refresh(&self, region: Option<IntRect>);

    /// Block until outstanding refreshes have completed; `false` on timeout
    fn wait_ready(&self, timeout: Duration) -> bool;
}

/// For displays without refresh latency
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRefresh;

impl DisplayRefresh for NoopRefresh {
    fn request_refresh(&self, _region: Option<IntRect>) {}

    fn wait_ready(&self, _timeout: Duration) -> bool {
        true
    }
}

#[derive(Debug, Default)]
struct GateState {
    pending: usize,
    requested: Vec<Option<IntRect>>,
}

/// Refresh bookkeeping for a driver that reports completion asynchronously
///
/// The driver drains requests with [`take_requests`](Self::take_requests)
/// and calls [`acknowledge`](Self::acknowledge) once per completed refresh.
#[derive(Debug, Default)]
pub struct RefreshGate {
    state: Mutex<GateState>,
    idle: Condvar,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pending(&self) -> usize {
        self.state().pending
    }

    pub fn take_requests(&self) -> Vec<Option<IntRect>> {
        std::mem::take(&mut self.state().requested)
    }

    pub fn acknowledge(&self) {
        let mut state = self.state();
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            self.idle.notify_all();
        }
    }
}

impl DisplayRefresh for RefreshGate {
    fn request_refresh(&self, region: Option<IntRect>) {
        let mut state = self.state();
        state.pending += 1;
        state.requested.push(region);
    }

    fn wait_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        while state.pending > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.idle.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_noop_is_always_ready() {
        NoopRefresh.request_refresh(None);
        assert!(NoopRefresh.wait_ready(Duration::ZERO));
    }

    #[test]
    fn test_gate_times_out_until_acknowledged() {
        let gate = RefreshGate::new();
        gate.request_refresh(Some(IntRect::new(0, 0, 10, 10)));
        assert!(!gate.wait_ready(Duration::from_millis(10)));
        assert_eq!(gate.take_requests(), vec![Some(IntRect::new(0, 0, 10, 10))]);
        gate.acknowledge();
        assert!(gate.wait_ready(Duration::ZERO));
    }

    #[test]
    fn test_gate_wakes_waiter() {
        let gate = Arc::new(RefreshGate::new());
        gate.request_refresh(None);
        let driver = {
            let gate = gate.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                gate.acknowledge();
            })
        };
        assert!(gate.wait_ready(Duration::from_secs(5)));
        driver.join().unwrap();
        assert_eq!(gate.pending(), 0);
    }
}
