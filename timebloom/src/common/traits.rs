//! Shared contract of the decaying membership filters

use super::error::Result;

/// Common interface of the time-decaying membership filters
///
/// Both [`TimingBloomFilter`](crate::TimingBloomFilter) and
/// [`ScalingTimingBloomFilter`](crate::ScalingTimingBloomFilter) answer the
/// question "was this key observed within the last decay window?"
/// and expose the same operations, so callers can swap the self-scaling
/// composite in for the fixed-capacity filter without code changes.
pub trait DecayingFilter {
    /// Record an observation of `key` at the current time
    fn add(&mut self, key: &[u8]);

    /// Check whether `key` was observed within the decay window
    ///
    /// Returns `true` if the key may have been observed (subject to the
    /// configured false-positive rate), `false` if it definitely was not.
    fn contains(&self, key: &[u8]) -> bool;

    /// Sweep out cells whose freshness tick has left the valid window
    fn decay(&mut self);

    /// Estimated number of distinct keys currently held
    fn size_estimate(&self) -> f64;

    /// Returns `true` if no cells are occupied
    fn is_empty(&self) -> bool;

    /// Register the periodic decay sweep with the scheduler
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidState`](super::FilterError::InvalidState)
    /// if the filter is already started.
    fn start(&mut self) -> Result<()>;

    /// Deregister the periodic decay sweep
    ///
    /// The filter remains queryable and mutable but no longer auto-decays.
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidState`](super::FilterError::InvalidState)
    /// if the filter is not started.
    fn stop(&mut self) -> Result<()>;
}
