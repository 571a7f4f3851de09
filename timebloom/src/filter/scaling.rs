//! Self-scaling composite of timing Bloom filters
//!
//! A single timing Bloom filter is sized for a fixed capacity; past it the
//! false-positive rate degrades. The scaling filter owns an ordered list of
//! timing filters with geometrically growing capacities and geometrically
//! *tightening* error budgets, so the compound false-positive rate stays
//! under the configured target no matter how many tiers are live:
//!
//! - tier capacities: `N_i = N_0 * g^i` (growth factor g)
//! - tier budgets: `e_i = e_0 * r^i` with `e_0 = error * (1 - r)`, so the
//!   geometric series over every tier ever created sums to at most `error`
//!
//! New observations always land in the newest tier; when its estimated fill
//! crosses `max_fill_factor` a larger tier is appended. Decay drains old
//! tiers, fully drained tiers are reclaimed, and an oversized idle tier is
//! replaced by a smaller one when its fill drops below `min_fill_factor`.
//!
//! # References
//!
//! - Almeida et al. "Scalable Bloom Filters" (2007)
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//! use timebloom::{ManualScheduler, ScalingTimingBloomFilter};
//!
//! let scheduler = Rc::new(ManualScheduler::new());
//! let mut filter = ScalingTimingBloomFilter::new(1000, 60.0, scheduler).unwrap();
//!
//! for i in 0u64..5000 {
//!     filter.add(&i.to_le_bytes());
//! }
//! assert!(filter.contains(&0u64.to_le_bytes()));
//! assert!(filter.num_filters() > 1);
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::common::{validation, FilterError, Result};
use crate::filter::timing::{TimingCore, DEFAULT_ERROR_RATE};
use crate::time::{Scheduler, TaskHandle};

/// Default ratio between consecutive tier error budgets
pub const DEFAULT_ERROR_TIGHTENING_RATIO: f64 = 0.9;

/// Default ratio between consecutive tier capacities
pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0 * std::f64::consts::SQRT_2;

/// Default estimated fill above which a larger tier is appended
pub const DEFAULT_MAX_FILL_FACTOR: f64 = 0.9;

/// Default estimated fill below which the insertion target may shrink
pub const DEFAULT_MIN_FILL_FACTOR: f64 = 0.2;

struct ScalingCore {
    /// Tiers in insertion order; the last one is the insertion target
    filters: Vec<TimingCore>,
    base_capacity: usize,
    base_error: f64,
    decay_time: f64,
    error_tightening_ratio: f64,
    growth_factor: f64,
    max_fill_factor: f64,
    min_fill_factor: f64,
}

impl ScalingCore {
    /// Parameters for the tier that would be appended by growth
    fn next_tier(&self) -> (usize, f64) {
        match self.filters.last() {
            None => (self.base_capacity, self.base_error),
            Some(last) => (
                ((last.capacity() as f64) * self.growth_factor).round().max(1.0) as usize,
                last.error_rate() * self.error_tightening_ratio,
            ),
        }
    }

    fn add_at(&mut self, key: &[u8], now: f64) {
        let needs_tier = match self.filters.last() {
            None => true,
            Some(target) => target.estimated_fill() >= self.max_fill_factor,
        };
        if needs_tier {
            let (capacity, error_rate) = self.next_tier();
            debug!(
                capacity,
                error_rate,
                tiers = self.filters.len() + 1,
                "appending filter tier"
            );
            self.filters
                .push(TimingCore::new(capacity, self.decay_time, error_rate));
        }
        if let Some(target) = self.filters.last_mut() {
            target.add_at(key, now);
        }
    }

    fn contains_at(&self, key: &[u8], now: f64) -> bool {
        self.filters
            .iter()
            .any(|filter| filter.contains_at(key, now))
    }

    fn decay_at(&mut self, now: f64) {
        for filter in &mut self.filters {
            filter.decay_at(now);
        }
        // shrink before reclaiming: if the sweep fully drained the target,
        // its replacement demotes it and the same pass reclaims it
        self.maybe_shrink();
        self.reclaim();
    }

    /// Drop fully drained tiers; the insertion target always survives
    fn reclaim(&mut self) {
        if self.filters.is_empty() {
            return;
        }
        let last = self.filters.len() - 1;
        let before = self.filters.len();
        let mut index = 0;
        self.filters.retain(|filter| {
            let keep = filter.nonzero_cells() > 0 || index == last;
            index += 1;
            keep
        });
        let reclaimed = before - self.filters.len();
        if reclaimed > 0 {
            debug!(reclaimed, tiers = self.filters.len(), "reclaimed drained tiers");
        }
    }

    /// Replace an oversized idle insertion target with a smaller tier
    ///
    /// The replacement continues the tightening series, so the compound
    /// error budget stays satisfied; the old tier drains and is reclaimed by
    /// a later sweep.
    fn maybe_shrink(&mut self) {
        let Some(target) = self.filters.last() else {
            return;
        };
        if target.estimated_fill() >= self.min_fill_factor {
            return;
        }
        let shrunk = ((target.capacity() as f64) / self.growth_factor).round() as usize;
        if shrunk < self.base_capacity {
            return;
        }
        let error_rate = target.error_rate() * self.error_tightening_ratio;
        debug!(capacity = shrunk, error_rate, "shrinking insertion target");
        self.filters
            .push(TimingCore::new(shrunk, self.decay_time, error_rate));
    }

    fn size_estimate(&self) -> f64 {
        self.filters.iter().map(TimingCore::size_estimate).sum()
    }

    fn nonzero_cells(&self) -> usize {
        self.filters.iter().map(TimingCore::nonzero_cells).sum()
    }

    fn memory_usage(&self) -> usize {
        self.filters.iter().map(TimingCore::memory_usage).sum()
    }
}

/// Self-scaling time-decaying Bloom filter
///
/// Exposes the same contract as [`TimingBloomFilter`](crate::TimingBloomFilter)
/// (add, contains, decay, size estimate, start/stop) but grows and shrinks
/// its capacity with the observed stream while keeping the compound
/// false-positive rate at or below the configured `error`. See the
/// [module docs](self) for the tier mechanics.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use timebloom::{ManualScheduler, ScalingTimingBloomFilter};
///
/// let scheduler = Rc::new(ManualScheduler::new());
/// let mut filter =
///     ScalingTimingBloomFilter::with_error(500, 30.0, 0.01, scheduler).unwrap();
/// filter.add(b"flow:a");
/// assert!(filter.contains(b"flow:a"));
/// assert!(!filter.contains(b"flow:b"));
/// ```
pub struct ScalingTimingBloomFilter {
    core: Rc<RefCell<ScalingCore>>,
    scheduler: Rc<dyn Scheduler>,
    decay_task: Option<TaskHandle>,
}

impl ScalingTimingBloomFilter {
    /// Create a scaling filter with default error rate and scaling knobs
    ///
    /// # Arguments
    /// * `capacity` - expected distinct keys within one decay window (the
    ///   first tier's capacity; further tiers grow from it)
    /// * `decay_time` - freshness window in seconds
    /// * `scheduler` - clock source and decay-sweep registry
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidParameter`] on out-of-range parameters.
    pub fn new(capacity: usize, decay_time: f64, scheduler: Rc<dyn Scheduler>) -> Result<Self> {
        Self::with_error(capacity, decay_time, DEFAULT_ERROR_RATE, scheduler)
    }

    /// Create a scaling filter with an explicit compound error target
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidParameter`] on out-of-range parameters.
    pub fn with_error(
        capacity: usize,
        decay_time: f64,
        error_rate: f64,
        scheduler: Rc<dyn Scheduler>,
    ) -> Result<Self> {
        Self::with_params(
            capacity,
            decay_time,
            error_rate,
            DEFAULT_ERROR_TIGHTENING_RATIO,
            DEFAULT_GROWTH_FACTOR,
            DEFAULT_MAX_FILL_FACTOR,
            DEFAULT_MIN_FILL_FACTOR,
            scheduler,
        )
    }

    /// Create a scaling filter with explicit scaling knobs
    ///
    /// The first tier receives the budget `error_rate * (1 -
    /// error_tightening_ratio)` and every later tier tightens it by
    /// `error_tightening_ratio`, which bounds the compound false-positive
    /// rate by `error_rate`.
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidParameter`] if `capacity` is zero,
    /// `decay_time` is not positive and finite, `error_rate` or
    /// `error_tightening_ratio` lies outside (0, 1), `growth_factor` is not
    /// greater than 1, or the fill factors are not `0 < min < max < 1`.
    #[allow(clippy::too_many_arguments)]
    pub fn with_params(
        capacity: usize,
        decay_time: f64,
        error_rate: f64,
        error_tightening_ratio: f64,
        growth_factor: f64,
        max_fill_factor: f64,
        min_fill_factor: f64,
        scheduler: Rc<dyn Scheduler>,
    ) -> Result<Self> {
        validation::validate_capacity(capacity)?;
        validation::validate_decay_time(decay_time)?;
        validation::validate_probability(error_rate, "error")?;
        validation::validate_probability(error_tightening_ratio, "error_tightening_ratio")?;
        validation::validate_growth_factor(growth_factor)?;
        validation::validate_fill_factors(min_fill_factor, max_fill_factor)?;

        Ok(ScalingTimingBloomFilter {
            core: Rc::new(RefCell::new(ScalingCore {
                filters: Vec::new(),
                base_capacity: capacity,
                base_error: error_rate * (1.0 - error_tightening_ratio),
                decay_time,
                error_tightening_ratio,
                growth_factor,
                max_fill_factor,
                min_fill_factor,
            })),
            scheduler,
            decay_task: None,
        })
    }

    /// Record an observation of `key` at the current time
    ///
    /// Writes to the insertion target, appending a larger tier first if the
    /// target is missing or past `max_fill_factor`.
    pub fn add(&mut self, key: &[u8]) {
        let now = self.scheduler.now();
        self.core.borrow_mut().add_at(key, now);
    }

    /// Check whether `key` was observed within the decay window
    ///
    /// True iff any tier reports the key; tiers are probed in insertion
    /// order and the scan short-circuits on the first hit.
    pub fn contains(&self, key: &[u8]) -> bool {
        let now = self.scheduler.now();
        self.core.borrow().contains_at(key, now)
    }

    /// Sweep every tier, reclaim drained tiers, and consider shrinking
    pub fn decay(&mut self) {
        let now = self.scheduler.now();
        self.core.borrow_mut().decay_at(now);
    }

    /// Estimated distinct keys currently held, summed over the tiers
    pub fn size_estimate(&self) -> f64 {
        self.core.borrow().size_estimate()
    }

    /// Returns `true` if no tier holds any occupied cell
    pub fn is_empty(&self) -> bool {
        self.core.borrow().nonzero_cells() == 0
    }

    /// Number of live tiers
    pub fn num_filters(&self) -> usize {
        self.core.borrow().filters.len()
    }

    /// Occupied cells summed over the tiers
    pub fn nonzero_cells(&self) -> usize {
        self.core.borrow().nonzero_cells()
    }

    /// Base (first-tier) capacity
    pub fn capacity(&self) -> usize {
        self.core.borrow().base_capacity
    }

    /// Compound false-positive target
    pub fn error_rate(&self) -> f64 {
        let core = self.core.borrow();
        core.base_error / (1.0 - core.error_tightening_ratio)
    }

    /// Freshness window in seconds
    pub fn decay_time(&self) -> f64 {
        self.core.borrow().decay_time
    }

    /// Interval at which a started filter sweeps, `decay_time / 2`
    pub fn decay_interval(&self) -> f64 {
        self.decay_time() / 2.0
    }

    /// Packed-array footprint summed over the tiers, in bytes
    pub fn memory_usage(&self) -> usize {
        self.core.borrow().memory_usage()
    }

    /// Whether the combined periodic decay sweep is registered
    pub fn is_started(&self) -> bool {
        self.decay_task.is_some()
    }

    /// Register one combined periodic decay sweep covering all tiers
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

    /// Deregister the combined periodic decay sweep
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

    /// Snapshot of the controller and its tiers
    pub fn stats(&self) -> ScalingBloomStats {
        let core = self.core.borrow();
        ScalingBloomStats {
            num_filters: core.filters.len(),
            size_estimate: core.size_estimate(),
            memory_bytes: core.memory_usage(),
            tiers: core
                .filters
                .iter()
                .map(|filter| TierStats {
                    capacity: filter.capacity(),
                    error_rate: filter.error_rate(),
                    num_cells: filter.num_cells(),
                    num_hashes: filter.num_hashes(),
                    nonzero_cells: filter.nonzero_cells(),
                    size_estimate: filter.size_estimate(),
                })
                .collect(),
        }
    }
}

fn decay_callback(core: Weak<RefCell<ScalingCore>>) -> Box<dyn FnMut(f64)> {
    Box::new(move |now| {
        if let Some(core) = core.upgrade() {
            core.borrow_mut().decay_at(now);
        }
    })
}

impl Drop for ScalingTimingBloomFilter {
    fn drop(&mut self) {
        if let Some(handle) = self.decay_task.take() {
            self.scheduler.cancel(handle);
        }
    }
}

impl std::fmt::Debug for ScalingTimingBloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("ScalingTimingBloomFilter")
            .field("base_capacity", &core.base_capacity)
            .field("decay_time", &core.decay_time)
            .field("num_filters", &core.filters.len())
            .field("nonzero_cells", &core.nonzero_cells())
            .field("started", &self.is_started())
            .finish()
    }
}

impl crate::common::DecayingFilter for ScalingTimingBloomFilter {
    fn add(&mut self, key: &[u8]) {
        ScalingTimingBloomFilter::add(self, key);
    }

    fn contains(&self, key: &[u8]) -> bool {
        ScalingTimingBloomFilter::contains(self, key)
    }

    fn decay(&mut self) {
        ScalingTimingBloomFilter::decay(self);
    }

    fn size_estimate(&self) -> f64 {
        ScalingTimingBloomFilter::size_estimate(self)
    }

    fn is_empty(&self) -> bool {
        ScalingTimingBloomFilter::is_empty(self)
    }

    fn start(&mut self) -> Result<()> {
        ScalingTimingBloomFilter::start(self)
    }

    fn stop(&mut self) -> Result<()> {
        ScalingTimingBloomFilter::stop(self)
    }
}

/// Per-tier statistics snapshot
#[derive(Debug, Clone)]
pub struct TierStats {
    /// Tier capacity
    pub capacity: usize,
    /// Tier error budget
    pub error_rate: f64,
    /// Number of cells
    pub num_cells: usize,
    /// Number of hash functions
    pub num_hashes: usize,
    /// Cells holding a nonzero tick
    pub nonzero_cells: usize,
    /// Estimated distinct keys in the tier
    pub size_estimate: f64,
}

/// Statistics snapshot for a [`ScalingTimingBloomFilter`]
#[derive(Debug, Clone)]
pub struct ScalingBloomStats {
    /// Number of live tiers
    pub num_filters: usize,
    /// Estimated distinct keys over all tiers
    pub size_estimate: f64,
    /// Packed-array footprint over all tiers, in bytes
    pub memory_bytes: usize,
    /// Per-tier snapshots in insertion order
    pub tiers: Vec<TierStats>,
}
