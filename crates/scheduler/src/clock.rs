use std::time::Duration;

/// One scheduler step handed to the frame producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Zero-based position in the output sequence.
    pub index: u64,
    /// Virtual timestamp the frame must be evaluated at.
    pub timestamp: Duration,
    /// Fixed virtual interval between consecutive ticks (zero for a still frame).
    pub interval: Duration,
}

impl Tick {
    /// The single tick used when rendering a still image.
    pub fn still() -> Self {
        Self {
            index: 0,
            timestamp: Duration::ZERO,
            interval: Duration::ZERO,
        }
    }
}

/// Animation time decoupled from the wall clock.
///
/// The first tick is stamped at zero and every following tick is exactly one
/// interval later, no matter how long rendering took.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    interval: Duration,
    now: Duration,
    ticks: u64,
}

impl VirtualClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            now: Duration::ZERO,
            ticks: 0,
        }
    }

    /// Timestamp the next tick will carry.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Returns the current tick and advances the clock by one interval.
    pub fn tick(&mut self) -> Tick {
        let tick = Tick {
            index: self.ticks,
            timestamp: self.now,
            interval: self.interval,
        };
        self.now = self.now.saturating_add(self.interval);
        self.ticks = self.ticks.saturating_add(1);
        tick
    }
}
