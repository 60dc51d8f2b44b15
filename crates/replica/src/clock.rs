use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic milliseconds.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Shared, hand-advanced clock. Clones observe the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Turns wall-clock frame times into a whole number of fixed ticks.
pub struct FixedTimestep {
    step: Duration,
    pending: Duration,
}

impl FixedTimestep {
    /// Longest frame counted, so a stall cannot queue a burst of ticks.
    const MAX_FRAME: Duration = Duration::from_millis(250);

    pub fn new(tick_rate: u32) -> Self {
        Self {
            step: Duration::from_secs(1) / tick_rate.max(1),
            pending: Duration::ZERO,
        }
    }

    /// Seconds per tick.
    pub fn dt(&self) -> f32 {
        self.step.as_secs_f32()
    }

    pub fn accumulate(&mut self, elapsed: Duration) {
        self.pending += elapsed.min(Self::MAX_FRAME);
    }

    pub fn consume_tick(&mut self) -> bool {
        match self.pending.checked_sub(self.step) {
            Some(rest) => {
                self.pending = rest;
                true
            }
            None => false,
        }
    }
}
