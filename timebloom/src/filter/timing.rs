//! Timing Bloom filter: membership with a freshness window
//!
//! A Bloom filter whose cells record *when* they were last touched instead of
//! a plain bit, answering "was this key observed within the last
//! `decay_time` seconds?" with a configurable false-positive rate and no
//! false negatives inside the window.
//!
//! # Algorithm Overview
//!
//! - Each of the m cells is a 4-bit tick; 0 means empty
//! - `add` stamps the k double-hashed cells with the current tick
//! - `contains` requires all k cells to hold a tick inside the valid window
//! - `decay` sweeps the array and zeroes cells whose tick left the window
//!
//! The tick ring has 15 usable values and advances through 7 of them per
//! decay window, so stale cells are distinguishable from fresh ones for a
//! further full window before the ring wraps; the periodic sweep (registered
//! by [`start`](TimingBloomFilter::start) at half the decay window) clears
//! them long before that.
//!
//! # Properties
//!
//! - Space: 4 bits per cell, m = -n * ln(error) / ln(2)^2 cells
//! - `add` / `contains`: O(k), k = (m/n) * ln 2
//! - `decay`: O(m)
//! - A key added at time t stays visible until close to t + decay_time and,
//!   with the sweep running at cadence, is never reported after
//!   t + decay_time + one tick
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//! use timebloom::{ManualScheduler, TimingBloomFilter};
//!
//! let scheduler = Rc::new(ManualScheduler::new());
//! let mut filter = TimingBloomFilter::new(1000, 60.0, scheduler.clone()).unwrap();
//!
//! filter.add(b"event:1234");
//! assert!(filter.contains(b"event:1234"));
//!
//! // a decay window later the observation is gone
//! scheduler.advance(90.0);
//! filter.decay();
//! assert!(!filter.contains(b"event:1234"));
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::common::hash::DoubleHashIndexes;
use crate::common::{validation, FilterError, Result};
use crate::filter::cells::NibbleArray;
use crate::time::tick::TickClock;
use crate::time::{Scheduler, TaskHandle};

/// Default target false-positive rate at capacity
pub const DEFAULT_ERROR_RATE: f64 = 0.005;

/// Mutable filter state, shared between the handle and the decay callback
pub(crate) struct TimingCore {
    cells: NibbleArray,
    num_cells: usize,
    num_hashes: usize,
    capacity: usize,
    error_rate: f64,
    decay_time: f64,
    ticks: TickClock,
    nonzero_cells: usize,
}

impl TimingCore {
    /// Build a core from validated parameters
    ///
    /// Callers validate; the scaling controller derives tier parameters that
    /// are in range by construction.
    pub(crate) fn new(capacity: usize, decay_time: f64, error_rate: f64) -> Self {
        // Standard Bloom sizing: m = -n * ln(e) / ln(2)^2, k = (m/n) * ln 2
        let ln2 = std::f64::consts::LN_2;
        let num_cells = (-(capacity as f64) * error_rate.ln() / (ln2 * ln2)).ceil() as usize;
        let num_cells = num_cells.max(1);
        let num_hashes = ((num_cells as f64 / capacity as f64) * ln2).ceil() as usize;
        let num_hashes = num_hashes.max(1);

        TimingCore {
            cells: NibbleArray::new(num_cells),
            num_cells,
            num_hashes,
            capacity,
            error_rate,
            decay_time,
            ticks: TickClock::new(decay_time),
            nonzero_cells: 0,
        }
    }

    /// Stamp the key's cells with the tick for time `now`
    ///
    /// Returns the nonzero-cell count after the write.
    pub(crate) fn add_at(&mut self, key: &[u8], now: f64) -> usize {
        let tick = self.ticks.current(now);
        for index in DoubleHashIndexes::new(key, self.num_cells, self.num_hashes) {
            if self.cells.set(index, tick) == 0 {
                self.nonzero_cells += 1;
            }
        }
        self.nonzero_cells
    }

    /// Whether all of the key's cells are fresh at time `now`
    pub(crate) fn contains_at(&self, key: &[u8], now: f64) -> bool {
        let window = self.ticks.window(now);
        DoubleHashIndexes::new(key, self.num_cells, self.num_hashes)
            .all(|index| window.contains(self.cells.get(index)))
    }

    /// Sweep every cell once, clearing ticks outside the valid window
    ///
    /// The nonzero-cell counter is recomputed from the sweep itself, so it
    /// reflects the state at sweep end.
    pub(crate) fn decay_at(&mut self, now: f64) {
        let window = self.ticks.window(now);
        let mut survivors = 0usize;
        let mut cleared = 0usize;
        for index in 0..self.cells.len() {
            let value = self.cells.get(index);
            if value == 0 {
                continue;
            }
            if window.contains(value) {
                survivors += 1;
            } else {
                self.cells.clear(index);
                cleared += 1;
            }
        }
        self.nonzero_cells = survivors;
        trace!(cleared, nonzero = survivors, "decay sweep");
    }

    /// Estimated population from the fill ratio
    pub(crate) fn size_estimate(&self) -> f64 {
        let num_cells = self.num_cells as f64;
        let fill = self.nonzero_cells as f64 / num_cells;
        // ln(0) guard for a saturated array
        let zero_fraction = (1.0 - fill).max(f64::MIN_POSITIVE);
        -(num_cells / self.num_hashes as f64) * zero_fraction.ln()
    }

    /// Estimated population as a fraction of configured capacity
    pub(crate) fn estimated_fill(&self) -> f64 {
        self.size_estimate() / self.capacity as f64
    }

    pub(crate) fn nonzero_cells(&self) -> usize {
        self.nonzero_cells
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn error_rate(&self) -> f64 {
        self.error_rate
    }

    pub(crate) fn num_cells(&self) -> usize {
        self.num_cells
    }

    pub(crate) fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    pub(crate) fn memory_usage(&self) -> usize {
        self.cells.byte_len()
    }

    #[cfg(test)]
    pub(crate) fn scan_nonzero(&self) -> usize {
        self.cells.count_nonzero()
    }
}

/// Time-decaying Bloom filter
///
/// Answers "was this key observed within the last `decay_time` seconds?".
/// Keys are arbitrary byte strings compared byte-wise. The filter consults
/// the injected [`Scheduler`] for the current time on every operation and can
/// register its decay sweep with it; see the [module docs](self) for the cell
/// and tick mechanics.
///
/// The filter is single-threaded cooperative: all operations, including the
/// scheduled decay callback, must run on one logical thread of control.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use timebloom::{ManualScheduler, TimingBloomFilter};
///
/// let scheduler = Rc::new(ManualScheduler::new());
/// let mut filter = TimingBloomFilter::new(10_000, 300.0, scheduler).unwrap();
/// filter.add(b"alpha");
/// assert!(filter.contains(b"alpha"));
/// assert!(!filter.contains(b"omega"));
/// ```
pub struct TimingBloomFilter {
    core: Rc<RefCell<TimingCore>>,
    scheduler: Rc<dyn Scheduler>,
    decay_task: Option<TaskHandle>,
}

impl TimingBloomFilter {
    /// Create a filter with the default false-positive rate
    ///
    /// # Arguments
    /// * `capacity` - expected distinct keys within one decay window
    /// * `decay_time` - freshness window in seconds
    /// * `scheduler` - clock source and decay-sweep registry
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidParameter`] if `capacity` is zero or
    /// `decay_time` is not a positive finite number.
    pub fn new(capacity: usize, decay_time: f64, scheduler: Rc<dyn Scheduler>) -> Result<Self> {
        Self::with_error(capacity, decay_time, DEFAULT_ERROR_RATE, scheduler)
    }

    /// Create a filter with an explicit false-positive rate
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidParameter`] if `capacity` is zero,
    /// `decay_time` is not a positive finite number, or `error_rate` is
    /// outside (0, 1).
    pub fn with_error(
        capacity: usize,
        decay_time: f64,
        error_rate: f64,
        scheduler: Rc<dyn Scheduler>,
    ) -> Result<Self> {
        validation::validate_capacity(capacity)?;
        validation::validate_decay_time(decay_time)?;
        validation::validate_probability(error_rate, "error")?;

        Ok(TimingBloomFilter {
            core: Rc::new(RefCell::new(TimingCore::new(
                capacity, decay_time, error_rate,
            ))),
            scheduler,
            decay_task: None,
        })
    }

    /// Record an observation of `key` at the current time
    ///
    /// Stamps the key's k cells with the current tick; re-adding a key
    /// refreshes it.
    pub fn add(&mut self, key: &[u8]) {
        let now = self.scheduler.now();
        self.core.borrow_mut().add_at(key, now);
    }

    /// Check whether `key` was observed within the decay window
    ///
    /// `true` means the key may have been observed (false positives occur at
    /// the configured rate); `false` means it definitely was not.
    pub fn contains(&self, key: &[u8]) -> bool {
        let now = self.scheduler.now();
        self.core.borrow().contains_at(key, now)
    }

    /// Sweep out cells whose tick has left the valid window
    ///
    /// Safe to call at any cadence; sweeps are idempotent. A started filter
    /// runs this automatically every `decay_time / 2` seconds.
    pub fn decay(&mut self) {
        let now = self.scheduler.now();
        self.core.borrow_mut().decay_at(now);
    }

    /// Estimated number of distinct keys currently held
    ///
    /// Computed from the fill ratio as `-(m/k) * ln(1 - nonzero/m)`.
    pub fn size_estimate(&self) -> f64 {
        self.core.borrow().size_estimate()
    }

    /// Returns `true` if no cells are occupied
    pub fn is_empty(&self) -> bool {
        self.core.borrow().nonzero_cells() == 0
    }

    /// Number of cells holding a nonzero tick
    pub fn nonzero_cells(&self) -> usize {
        self.core.borrow().nonzero_cells()
    }

    /// Number of cells m
    pub fn num_cells(&self) -> usize {
        self.core.borrow().num_cells()
    }

    /// Number of hash functions k
    pub fn num_hashes(&self) -> usize {
        self.core.borrow().num_hashes()
    }

    /// Configured capacity n
    pub fn capacity(&self) -> usize {
        self.core.borrow().capacity()
    }

    /// Configured false-positive rate
    pub fn error_rate(&self) -> f64 {
        self.core.borrow().error_rate()
    }

    /// Freshness window in seconds
    pub fn decay_time(&self) -> f64 {
        self.core.borrow().decay_time
    }

    /// Interval at which a started filter sweeps, `decay_time / 2`
    pub fn decay_interval(&self) -> f64 {
        self.decay_time() / 2.0
    }

    /// Memory footprint of the packed cell array in bytes
    pub fn memory_usage(&self) -> usize {
        self.core.borrow().memory_usage()
    }

    /// Whether the periodic decay sweep is registered
    pub fn is_started(&self) -> bool {
        self.decay_task.is_some()
    }

    /// Register the periodic decay sweep with the scheduler
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidState`] if the filter is already
    /// started.
    pub fn start(&mut self) -> Result<()> {
        if self.decay_task.is_some() {
            return Err(FilterError::InvalidState {
                operation: "start".to_string(),
                reason: "already started".to_string(),
            });
        }
        let core = Rc::downgrade(&self.core);
        let handle = self
            .scheduler
            .schedule_periodic(self.decay_interval(), decay_callback(core));
        self.decay_task = Some(handle);
        Ok(())
    }

    /// Deregister the periodic decay sweep
    ///
    /// The filter remains queryable and mutable but no longer auto-decays.
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidState`] if the filter is not started.
    pub fn stop(&mut self) -> Result<()> {
        match self.decay_task.take() {
            Some(handle) => {
                self.scheduler.cancel(handle);
                Ok(())
            }
            None => Err(FilterError::InvalidState {
                operation: "stop".to_string(),
                reason: "not started".to_string(),
            }),
        }
    }

    /// Snapshot of the filter's parameters and occupancy
    pub fn stats(&self) -> TimingBloomStats {
        let core = self.core.borrow();
        TimingBloomStats {
            capacity: core.capacity(),
            error_rate: core.error_rate(),
            decay_time: core.decay_time,
            num_cells: core.num_cells(),
            num_hashes: core.num_hashes(),
            nonzero_cells: core.nonzero_cells(),
            size_estimate: core.size_estimate(),
            memory_bytes: core.memory_usage(),
        }
    }
}

/// Build the periodic sweep callback over a weak reference to the core
///
/// A dropped filter degrades the callback to a no-op until its task is
/// cancelled.
fn decay_callback(core: Weak<RefCell<TimingCore>>) -> Box<dyn FnMut(f64)> {
    Box::new(move |now| {
        if let Some(core) = core.upgrade() {
            core.borrow_mut().decay_at(now);
        }
    })
}

impl Drop for TimingBloomFilter {
    fn drop(&mut self) {
        if let Some(handle) = self.decay_task.take() {
            self.scheduler.cancel(handle);
        }
    }
}

impl std::fmt::Debug for TimingBloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("TimingBloomFilter")
            .field("capacity", &core.capacity())
            .field("error_rate", &core.error_rate())
            .field("decay_time", &core.decay_time)
            .field("num_cells", &core.num_cells())
            .field("num_hashes", &core.num_hashes())
            .field("nonzero_cells", &core.nonzero_cells())
            .field("started", &self.is_started())
            .finish()
    }
}

impl crate::common::DecayingFilter for TimingBloomFilter {
    fn add(&mut self, key: &[u8]) {
        TimingBloomFilter::add(self, key);
    }

    fn contains(&self, key: &[u8]) -> bool {
        TimingBloomFilter::contains(self, key)
    }

    fn decay(&mut self) {
        TimingBloomFilter::decay(self);
    }

    fn size_estimate(&self) -> f64 {
        TimingBloomFilter::size_estimate(self)
    }

    fn is_empty(&self) -> bool {
        TimingBloomFilter::is_empty(self)
    }

    fn start(&mut self) -> Result<()> {
        TimingBloomFilter::start(self)
    }

    fn stop(&mut self) -> Result<()> {
        TimingBloomFilter::stop(self)
    }
}

/// Statistics snapshot for a [`TimingBloomFilter`]
#[derive(Debug, Clone)]
pub struct TimingBloomStats {
    /// Configured capacity n
    pub capacity: usize,
    /// Configured false-positive rate
    pub error_rate: f64,
    /// Freshness window in seconds
    pub decay_time: f64,
    /// Number of cells m
    pub num_cells: usize,
    /// Number of hash functions k
    pub num_hashes: usize,
    /// Cells holding a nonzero tick
    pub nonzero_cells: usize,
    /// Estimated distinct keys currently held
    pub size_estimate: f64,
    /// Packed array footprint in bytes
    pub memory_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(capacity: usize, decay_time: f64) -> TimingCore {
        TimingCore::new(capacity, decay_time, DEFAULT_ERROR_RATE)
    }

    #[test]
    fn test_sizing_formulas() {
        let core = core(1000, 60.0);
        // m = -1000 * ln(0.005) / ln(2)^2 = 11027.75..., k = ceil(m/n * ln 2)
        assert_eq!(core.num_cells(), 11028);
        assert_eq!(core.num_hashes(), 8);
    }

    #[test]
    fn test_add_then_contains_at_same_time() {
        let mut core = core(100, 60.0);
        core.add_at(b"key", 5.0);
        assert!(core.contains_at(b"key", 5.0));
        assert!(!core.contains_at(b"other", 5.0));
    }

    #[test]
    fn test_add_sets_exactly_k_cells() {
        let mut core = core(100, 60.0);
        let nonzero = core.add_at(b"key", 0.0);
        assert!(nonzero <= core.num_hashes());
        assert!(nonzero > 0);
        assert_eq!(core.nonzero_cells(), core.scan_nonzero());
    }

    #[test]
    fn test_counter_matches_scan_through_adds_and_decays() {
        let mut core = core(200, 60.0);
        for i in 0u64..150 {
            core.add_at(&i.to_le_bytes(), i as f64 * 0.3);
            assert_eq!(core.nonzero_cells(), core.scan_nonzero());
        }
        core.decay_at(80.0);
        assert_eq!(core.nonzero_cells(), core.scan_nonzero());
        core.decay_at(110.0);
        assert_eq!(core.nonzero_cells(), core.scan_nonzero());
        assert_eq!(core.nonzero_cells(), 0);
    }

    #[test]
    fn test_decay_clears_expired_cells_only() {
        let mut core = core(100, 70.0);
        core.add_at(b"old", 0.5);
        core.add_at(b"new", 65.0);
        // at t=75 "old" is out of the window but "new" survives
        core.decay_at(75.0);
        assert!(!core.contains_at(b"old", 75.0));
        assert!(core.contains_at(b"new", 75.0));
        assert!(core.nonzero_cells() > 0);
    }

    #[test]
    fn test_decay_is_idempotent() {
        let mut core = core(100, 60.0);
        core.add_at(b"key", 0.0);
        core.decay_at(30.0);
        let nonzero = core.nonzero_cells();
        core.decay_at(30.0);
        assert_eq!(core.nonzero_cells(), nonzero);
        assert!(core.contains_at(b"key", 30.0));
    }

    #[test]
    fn test_size_estimate_tracks_population() {
        let mut core = core(1000, 60.0);
        assert_eq!(core.size_estimate(), 0.0);
        for i in 0u64..500 {
            core.add_at(&i.to_le_bytes(), 1.0);
        }
        let estimate = core.size_estimate();
        assert!(
            (estimate - 500.0).abs() < 50.0,
            "estimate {} too far from 500",
            estimate
        );
    }

    #[test]
    fn test_size_estimate_monotone_under_adds() {
        let mut core = core(500, 60.0);
        let mut previous = 0.0;
        for i in 0u64..200 {
            core.add_at(&i.to_le_bytes(), 1.0);
            let estimate = core.size_estimate();
            assert!(estimate >= previous);
            previous = estimate;
        }
    }

    #[test]
    fn test_estimated_fill() {
        let mut core = core(100, 60.0);
        for i in 0u64..90 {
            core.add_at(&i.to_le_bytes(), 1.0);
        }
        let fill = core.estimated_fill();
        assert!(fill > 0.7 && fill < 1.1, "fill {}", fill);
    }
}
