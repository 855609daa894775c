//! Time source for the engine. Tests swap in [`ManualClock`] to drive SLA
//! scenarios deterministically.

use parking_lot::Mutex;

use upkeep_core::Timestamp;

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: Timestamp) {
        *self.now.lock() = to;
    }

    pub fn advance_minutes(&self, minutes: u32) {
        let mut now = self.now.lock();
        *now = now.plus_minutes(minutes);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
