use crate::timer::Timer;
use std::time::Duration;

/// A timer that only fires when the test says so.
#[derive(Debug, Default)]
pub struct ManualTimer {
    armed: Option<Duration>,
    arm_count: usize,
}

impl ManualTimer {
    pub fn new() -> Self {
        ManualTimer::default()
    }

    /// Disarms the timer and reports whether it was armed. The caller then runs whatever the
    /// timer would have triggered.
    pub fn fire(&mut self) -> bool {
        self.armed.take().is_some()
    }

    /// Delay requested by the last `arm`, if still armed.
    pub fn armed_for(&self) -> Option<Duration> {
        self.armed
    }

    /// How many times `arm` was called.
    pub fn arm_count(&self) -> usize {
        self.arm_count
    }
}

impl Timer for ManualTimer {
    fn arm(&mut self, after: Duration) {
        self.armed = Some(after);
        self.arm_count += 1;
    }

    fn cancel(&mut self) {
        self.armed = None;
    }

    fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}
