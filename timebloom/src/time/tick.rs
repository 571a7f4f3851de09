//! Cyclic tick clock
//!
//! Wall time is mapped onto a small cyclic counter so that per-cell freshness
//! fits in a nibble. Tick 0 is reserved for "empty cell"; the ring carries 15
//! usable values. The tick advances through half the ring per decay window,
//! so at any instant 7 of the 15 values are "fresh" and the remaining 8 are
//! recognizably stale until the ring wraps back onto them. The decay sweep
//! must clear stale cells before that wrap, which takes a little over one
//! decay window; sweeping every `decay_time / 2` leaves ample margin.

/// Width of one cell in bits
pub(crate) const TICK_BITS: u32 = 4;

/// Number of usable tick values (zero is reserved for "empty")
pub(crate) const RING_SIZE: u64 = (1 << TICK_BITS) - 1;

/// Ticks the clock advances within one decay window
pub(crate) const WINDOW_TICKS: u64 = RING_SIZE / 2;

/// Maps wall-clock seconds to tick values and freshness windows
#[derive(Clone, Copy, Debug)]
pub(crate) struct TickClock {
    decay_time: f64,
    seconds_per_tick: f64,
}

impl TickClock {
    /// Build a clock whose window spans `decay_time` seconds
    pub(crate) fn new(decay_time: f64) -> Self {
        TickClock {
            decay_time,
            seconds_per_tick: decay_time / WINDOW_TICKS as f64,
        }
    }

    /// The tick value for wall-clock time `t` (seconds since epoch)
    ///
    /// Euclidean remainder keeps the result in [1, 15] even for negative
    /// arguments, which `window` produces for times within `decay_time` of
    /// the epoch.
    #[inline]
    pub(crate) fn current(&self, t: f64) -> u8 {
        let steps = (t / self.seconds_per_tick).floor() as i64;
        (steps.rem_euclid(RING_SIZE as i64) + 1) as u8
    }

    /// The valid window at time `t`: ticks in `(tick_min, tick_max]` are fresh
    #[inline]
    pub(crate) fn window(&self, t: f64) -> TickWindow {
        TickWindow {
            tick_min: self.current(t - self.decay_time),
            tick_max: self.current(t),
        }
    }

    /// Resolution of the clock in seconds
    pub(crate) fn seconds_per_tick(&self) -> f64 {
        self.seconds_per_tick
    }
}

/// Half-open cyclic interval `(tick_min, tick_max]` of fresh tick values
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TickWindow {
    pub(crate) tick_min: u8,
    pub(crate) tick_max: u8,
}

impl TickWindow {
    /// Whether a stored cell value is fresh
    ///
    /// Zero is never fresh (empty cell). `tick_min` itself is excluded: it is
    /// the tick one full decay window ago. When the interval wraps through
    /// the top of the ring both branches around the wrap point are accepted;
    /// equal endpoints degenerate to "all nonzero values are fresh".
    #[inline]
    pub(crate) fn contains(&self, v: u8) -> bool {
        if v == 0 {
            return false;
        }
        if self.tick_min < self.tick_max {
            self.tick_min < v && v <= self.tick_max
        } else {
            v > self.tick_min || v <= self.tick_max
        }
    }
}
