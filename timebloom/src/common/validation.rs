//! Parameter bounds checking shared by the filter constructors

use crate::common::{FilterError, Result};

/// Maximum capacity for any filter (2^31 - 1, ~2.1 billion items)
pub(crate) const MAX_CAPACITY: usize = (1 << 31) - 1;

/// Validate that capacity is positive and within limits
pub(crate) fn validate_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 {
        return Err(FilterError::InvalidParameter {
            param: "capacity".to_string(),
            value: capacity.to_string(),
            constraint: "must be greater than 0".to_string(),
        });
    }
    if capacity > MAX_CAPACITY {
        return Err(FilterError::InvalidParameter {
            param: "capacity".to_string(),
            value: capacity.to_string(),
            constraint: format!("must not exceed {}", MAX_CAPACITY),
        });
    }
    Ok(())
}

/// Validate that a value is a valid probability (0.0 < p < 1.0)
///
/// Used for the error rate and the error tightening ratio.
pub(crate) fn validate_probability(value: f64, param_name: &str) -> Result<()> {
    if !(0.0 < value && value < 1.0) {
        return Err(FilterError::InvalidParameter {
            param: param_name.to_string(),
            value: value.to_string(),
            constraint: "must be in range (0.0, 1.0) (exclusive)".to_string(),
        });
    }
    Ok(())
}

/// Validate that the decay window is a positive, finite number of seconds
pub(crate) fn validate_decay_time(decay_time: f64) -> Result<()> {
    if !(decay_time.is_finite() && decay_time > 0.0) {
        return Err(FilterError::InvalidParameter {
            param: "decay_time".to_string(),
            value: decay_time.to_string(),
            constraint: "must be a positive, finite number of seconds".to_string(),
        });
    }
    Ok(())
}

/// Validate that the tier growth factor is finite and greater than 1
pub(crate) fn validate_growth_factor(growth_factor: f64) -> Result<()> {
    if !(growth_factor.is_finite() && growth_factor > 1.0) {
        return Err(FilterError::InvalidParameter {
            param: "growth_factor".to_string(),
            value: growth_factor.to_string(),
            constraint: "must be finite and greater than 1".to_string(),
        });
    }
    Ok(())
}

/// Validate the fill thresholds: each in (0, 1), minimum strictly below maximum
pub(crate) fn validate_fill_factors(min_fill: f64, max_fill: f64) -> Result<()> {
    validate_probability(min_fill, "min_fill_factor")?;
    validate_probability(max_fill, "max_fill_factor")?;
    if min_fill >= max_fill {
        return Err(FilterError::InvalidParameter {
            param: "min_fill_factor".to_string(),
            value: min_fill.to_string(),
            constraint: format!("must be less than max_fill_factor ({})", max_fill),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_capacity_valid() {
        assert!(validate_capacity(1).is_ok());
        assert!(validate_capacity(1_000_000).is_ok());
        assert!(validate_capacity(MAX_CAPACITY).is_ok());
    }

    #[test]
    fn test_validate_capacity_invalid() {
        assert!(validate_capacity(0).is_err());
        assert!(validate_capacity(MAX_CAPACITY + 1).is_err());
    }

    #[test]
    fn test_validate_probability_valid() {
        assert!(validate_probability(0.005, "error").is_ok());
        assert!(validate_probability(0.5, "error").is_ok());
        assert!(validate_probability(0.99, "error").is_ok());
    }

    #[test]
    fn test_validate_probability_invalid() {
        assert!(validate_probability(0.0, "error").is_err());
        assert!(validate_probability(1.0, "error").is_err());
        assert!(validate_probability(-0.1, "error").is_err());
        assert!(validate_probability(f64::NAN, "error").is_err());
    }

    #[test]
    fn test_validate_decay_time() {
        assert!(validate_decay_time(60.0).is_ok());
        assert!(validate_decay_time(0.25).is_ok());
        assert!(validate_decay_time(0.0).is_err());
        assert!(validate_decay_time(-1.0).is_err());
        assert!(validate_decay_time(f64::INFINITY).is_err());
        assert!(validate_decay_time(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_growth_factor() {
        assert!(validate_growth_factor(2.0).is_ok());
        assert!(validate_growth_factor(2.0 * std::f64::consts::SQRT_2).is_ok());
        assert!(validate_growth_factor(1.0).is_err());
        assert!(validate_growth_factor(0.5).is_err());
        assert!(validate_growth_factor(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_fill_factors() {
        assert!(validate_fill_factors(0.2, 0.9).is_ok());
        assert!(validate_fill_factors(0.9, 0.2).is_err());
        assert!(validate_fill_factors(0.5, 0.5).is_err());
        assert!(validate_fill_factors(0.0, 0.9).is_err());
        assert!(validate_fill_factors(0.2, 1.0).is_err());
    }
}
