//! Integer-tick time, shared across the whole job by a common timebase.
//!
//! A clock is a `(timebase, tick_interval, tick_count)` triple. `time =
//! tick_count * tick_interval / timebase`. Every clock in a job shares
//! the same `timebase` so that times across programs compare as plain
//! integers — the scheduler never compares floating-point times.

use serde::{Deserialize, Serialize};

/// A tick count scaled by a shared `timebase`.
pub type Ticks = u64;

/// Integer-tick clock. `tick_interval > 0` and `timebase > 0` are
/// invariants enforced at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Clock {
    timebase: Ticks,
    tick_interval: Ticks,
    tick_count: Ticks,
}

impl Clock {
    /// Creates a clock at tick 0.
    pub fn new(timebase: Ticks, tick_interval: Ticks) -> Self {
        assert!(timebase > 0, "Clock: timebase must be positive");
        assert!(tick_interval > 0, "Clock: tick_interval must be positive");
        Self {
            timebase,
            tick_interval,
            tick_count: 0,
        }
    }

    /// Creates a clock already at the given integer time (in ticks of the
    /// shared timebase), rounded down to a whole number of this clock's
    /// ticks. Used to seed a latency value expressed in the timebase.
    pub fn from_integer_time(
        timebase: Ticks,
        tick_interval: Ticks,
        integer_time: Ticks,
    ) -> Self {
        let mut clock = Self::new(timebase, tick_interval);
        clock.tick_count = integer_time / tick_interval;
        clock
    }

    pub fn timebase(&self) -> Ticks {
        self.timebase
    }

    pub fn tick_interval(&self) -> Ticks {
        self.tick_interval
    }

    pub fn tick_count(&self) -> Ticks {
        self.tick_count
    }

    /// Time in units of the shared timebase (i.e. `tick_count *
    /// tick_interval`). This is the value every comparison in the
    /// scheduler is done on: always an integer, always comparable across
    /// clocks sharing the same timebase.
    pub fn integer_time(&self) -> Ticks {
        self.tick_count * self.tick_interval
    }

    /// Time in seconds, for user-facing reporting only (`Runtime::time`).
    pub fn time(&self) -> f64 {
        self.integer_time() as f64 / self.timebase as f64
    }

    /// Advances by exactly one tick.
    pub fn tick(&mut self) {
        self.tick_count += 1;
    }

    /// Advances by `n` ticks in one step.
    pub fn ticks(&mut self, n: Ticks) {
        self.tick_count += n;
    }

    /// Resets to tick 0, keeping `timebase`/`tick_interval`. Used when the
    /// scheduler rewinds clocks after pre-computing the schedule window.
    pub fn reset(&mut self) {
        self.tick_count = 0;
    }

    /// Largest multiple of `tick_interval` that is `<= integer_time`.
    pub fn floor_to_tick(tick_interval: Ticks, integer_time: Ticks) -> Ticks {
        (integer_time / tick_interval) * tick_interval
    }
}
