//! FIFO "drawing in progress" lock
//!
//! Serializes every mutation of a page's authoritative bitmap. Waiters are
//! served in ticket order so a steady stream of input batches cannot starve
//! a scroll or zoom that queued behind them.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct Tickets {
    next_ticket: u64,
    now_serving: u64,
}

impl Tickets {
    fn is_locked(&self) -> bool {
        self.next_ticket != self.now_serving
    }
}

/// Ticket lock guarding bitmap mutation
#[derive(Debug, Default)]
pub struct DrawingLock {
    tickets: Mutex<Tickets>,
    released: Condvar,
}

/// Held while a batch mutates the bitmap; releases on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct DrawingGuard<'a> {
    lock: &'a DrawingLock,
}

impl DrawingLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn tickets(&self) -> MutexGuard<'_, Tickets> {
        self.tickets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for our turn. Callers are served in the order they arrived.
    pub fn acquire(&self) -> DrawingGuard<'_> {
        let mut tickets = self.tickets();
        let ticket = tickets.next_ticket;
        tickets.next_ticket += 1;
        let _tickets = self
            .released
            .wait_while(tickets, |t| t.now_serving != ticket)
            .unwrap_or_else(|e| e.into_inner());
        DrawingGuard { lock: self }
    }

    /// Take the lock only if nobody holds it or waits for it
    pub fn try_acquire(&self) -> Option<DrawingGuard<'_>> {
        let mut tickets = self.tickets();
        if tickets.is_locked() {
            return None;
        }
        tickets.next_ticket += 1;
        Some(DrawingGuard { lock: self })
    }

    /// Whether a batch is drawing or queued to draw
    pub fn is_locked(&self) -> bool {
        self.tickets().is_locked()
    }

    /// Block until no one holds or waits for the lock
    ///
    /// Returns `false` on timeout. Presentation uses this to avoid reading
    /// a bitmap mid-mutation.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let tickets = self.tickets();
        let (tickets, _) = self
            .released
            .wait_timeout_while(tickets, timeout, |t| t.is_locked())
            .unwrap_or_else(|e| e.into_inner());
        !tickets.is_locked()
    }

    fn release(&self) {
        self.tickets().now_serving += 1;
        self.released.notify_all();
    }
}

impl Drop for DrawingGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
