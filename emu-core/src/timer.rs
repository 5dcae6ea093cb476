//! Single-shot timers driven by the owner's tick loop.

use crate::namespace::ClientId;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Single-shot timer owned by one client. Firing is delivered by whoever drives the timer,
/// on that driver's thread.
pub trait Timer {
    /// Arms the timer to fire once `after` has elapsed, replacing any pending deadline. The
    /// implementation decides how `after` maps onto its own clock.
    fn arm(&mut self, after: Duration);

    /// Disarms the timer. Safe when it was never armed.
    fn cancel(&mut self);

    fn is_armed(&self) -> bool;
}

/// Tick-granular timer wheel shared by every client of a namespace.
///
/// Deadlines that fall on the same tick expire in arming order.
pub struct TimerWheel {
    tick: Duration,
    now: u64,
    seq: u64,
    pending: BTreeMap<(u64, u64), ClientId>,
    armed: HashMap<ClientId, (u64, u64)>,
}

impl TimerWheel {
    pub fn new(tick: Duration) -> Self {
        TimerWheel {
            tick,
            now: 0,
            seq: 0,
            pending: BTreeMap::new(),
            armed: HashMap::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Rounds up, so a non-zero duration is never shorter than one tick.
    pub fn duration_to_ticks(&self, duration: Duration) -> u64 {
        let tick = self.tick.as_nanos().max(1);
        let ticks = (duration.as_nanos() + tick - 1) / tick;
        ticks as u64
    }

    pub fn handle(&mut self, id: ClientId) -> WheelTimer<'_> {
        WheelTimer { wheel: self, id }
    }

    pub fn is_armed(&self, id: ClientId) -> bool {
        self.armed.contains_key(&id)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    fn arm(&mut self, id: ClientId, ticks: u64) {
        self.cancel(id);
        let key = (self.now + ticks.max(1), self.seq);
        self.seq += 1;
        self.pending.insert(key, id);
        self.armed.insert(id, key);
    }

    fn cancel(&mut self, id: ClientId) {
        if let Some(key) = self.armed.remove(&id) {
            self.pending.remove(&key);
        }
    }

    /// Advances the clock by one tick and disarms everything due, returning the owners in
    /// expiry order. Timers re-armed while handling these land on a later tick.
    pub fn expire(&mut self) -> Vec<ClientId> {
        self.now += 1;
        let mut due = Vec::new();
        loop {
            let key = match self.pending.keys().next() {
                Some(&key) if key.0 <= self.now => key,
                _ => break,
            };
            if let Some(id) = self.pending.remove(&key) {
                self.armed.remove(&id);
                due.push(id);
            }
        }
        due
    }
}

/// A [`Timer`] view of one client's slot in a [`TimerWheel`].
pub struct WheelTimer<'a> {
    wheel: &'a mut TimerWheel,
    id: ClientId,
}

impl<'a> Timer for WheelTimer<'a> {
    /// Fires on the first tick at or after `after`, and never sooner than the next tick.
    fn arm(&mut self, after: Duration) {
        let ticks = self.wheel.duration_to_ticks(after);
        self.wheel.arm(self.id, ticks);
    }

    fn cancel(&mut self) {
        self.wheel.cancel(self.id);
    }

    fn is_armed(&self) -> bool {
        self.wheel.is_armed(self.id)
    }
}
