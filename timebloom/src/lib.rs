//! timebloom: time-decaying Bloom filters for streaming deduplication
//!
//! Answers "was key K observed in the last D seconds?" with a tunable
//! false-positive rate and sub-linear space per element. Each Bloom cell is a
//! 4-bit freshness tick instead of a bit, so observations age out of the
//! filter without per-key bookkeeping.
//!
//! Two filter kinds share one contract ([`DecayingFilter`]):
//!
//! - [`TimingBloomFilter`]: fixed capacity, one packed cell array
//! - [`ScalingTimingBloomFilter`]: self-scaling tiers with geometrically
//!   tightening error budgets, bounding the compound false-positive rate
//!
//! Time comes from an injected [`Scheduler`]; [`ManualScheduler`] drives it
//! deterministically for tests and batch pipelines.
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//! use timebloom::{ManualScheduler, TimingBloomFilter};
//!
//! let scheduler = Rc::new(ManualScheduler::new());
//! let mut seen = TimingBloomFilter::new(100_000, 300.0, scheduler.clone()).unwrap();
//! seen.start().unwrap();
//!
//! // deduplicate a stream of event ids
//! let mut fresh = 0;
//! for id in ["a:1", "b:2", "a:1", "c:3"] {
//!     if !seen.contains(id.as_bytes()) {
//!         seen.add(id.as_bytes());
//!         fresh += 1;
//!     }
//! }
//! assert_eq!(fresh, 3);
//!
//! // the registered sweep fires as the clock advances
//! scheduler.advance(400.0);
//! assert!(!seen.contains(b"a:1"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod common;
pub mod filter;
pub mod time;

// Re-export the public surface
pub use common::{DecayingFilter, FilterError, Result};
pub use filter::{
    ScalingBloomStats, ScalingTimingBloomFilter, TierStats, TimingBloomFilter, TimingBloomStats,
    DEFAULT_ERROR_RATE, DEFAULT_ERROR_TIGHTENING_RATIO, DEFAULT_GROWTH_FACTOR,
    DEFAULT_MAX_FILL_FACTOR, DEFAULT_MIN_FILL_FACTOR,
};
pub use time::{ManualScheduler, PeriodicCallback, Scheduler, TaskHandle};
