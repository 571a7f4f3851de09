//! Time-decaying membership filters

pub(crate) mod cells;
mod scaling;
mod timing;

pub use scaling::{
    ScalingBloomStats, ScalingTimingBloomFilter, TierStats, DEFAULT_ERROR_TIGHTENING_RATIO,
    DEFAULT_GROWTH_FACTOR, DEFAULT_MAX_FILL_FACTOR, DEFAULT_MIN_FILL_FACTOR,
};
pub use timing::{TimingBloomFilter, TimingBloomStats, DEFAULT_ERROR_RATE};
