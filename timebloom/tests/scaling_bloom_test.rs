//! Scaling timing Bloom filter tests
//!
//! Testing the self-scaling composite:
//! - Tier growth past the fill threshold, with geometric capacities
//! - Reclamation of drained tiers and shrink back toward the base capacity
//! - Compound false-positive rate under the configured target across tiers

use proptest::prelude::*;
use std::rc::Rc;
use timebloom::{DecayingFilter, FilterError, ManualScheduler, ScalingTimingBloomFilter};

fn setup_default(capacity: usize, decay_time: f64) -> (Rc<ManualScheduler>, ScalingTimingBloomFilter) {
    let scheduler = Rc::new(ManualScheduler::new());
    let filter = ScalingTimingBloomFilter::new(capacity, decay_time, scheduler.clone())
        .expect("valid parameters");
    (scheduler, filter)
}

/// Doubling tiers make the growth arithmetic easy to assert on
fn setup_doubling(
    capacity: usize,
    decay_time: f64,
    error: f64,
) -> (Rc<ManualScheduler>, ScalingTimingBloomFilter) {
    let scheduler = Rc::new(ManualScheduler::new());
    let filter = ScalingTimingBloomFilter::with_params(
        capacity,
        decay_time,
        error,
        0.9, // error tightening ratio
        2.0, // growth factor
        0.9, // max fill
        0.2, // min fill
        scheduler.clone(),
    )
    .expect("valid parameters");
    (scheduler, filter)
}

// ============================================================================
// Phase 1: Construction Tests
// ============================================================================

#[test]
fn test_new_controller_is_empty_with_no_tiers() {
    let (_, filter) = setup_default(1000, 60.0);
    assert!(filter.is_empty());
    assert_eq!(filter.num_filters(), 0);
    assert_eq!(filter.size_estimate(), 0.0);
    assert_eq!(filter.memory_usage(), 0);
    assert!(!filter.contains(b"anything"));
}

#[test]
fn test_accessors_reflect_configuration() {
    let (_, filter) = setup_doubling(500, 120.0, 0.01);
    assert_eq!(filter.capacity(), 500);
    assert_eq!(filter.decay_time(), 120.0);
    assert_eq!(filter.decay_interval(), 60.0);
    assert!((filter.error_rate() - 0.01).abs() < 1e-12);
}

#[test]
fn test_invalid_parameters_are_rejected() {
    let scheduler: Rc<ManualScheduler> = Rc::new(ManualScheduler::new());

    let bad: Vec<timebloom::Result<ScalingTimingBloomFilter>> = vec![
        ScalingTimingBloomFilter::new(0, 60.0, scheduler.clone()),
        ScalingTimingBloomFilter::new(1000, 0.0, scheduler.clone()),
        ScalingTimingBloomFilter::with_error(1000, 60.0, 1.0, scheduler.clone()),
        // tightening ratio out of (0, 1)
        ScalingTimingBloomFilter::with_params(
            1000, 60.0, 0.005, 1.0, 2.0, 0.9, 0.2, scheduler.clone(),
        ),
        // growth factor must exceed 1
        ScalingTimingBloomFilter::with_params(
            1000, 60.0, 0.005, 0.9, 1.0, 0.9, 0.2, scheduler.clone(),
        ),
        // fill factors inverted
        ScalingTimingBloomFilter::with_params(
            1000, 60.0, 0.005, 0.9, 2.0, 0.2, 0.9, scheduler.clone(),
        ),
        // fill factor on the boundary
        ScalingTimingBloomFilter::with_params(
            1000, 60.0, 0.005, 0.9, 2.0, 1.0, 0.2, scheduler.clone(),
        ),
    ];
    for result in bad {
        assert!(matches!(
            result,
            Err(FilterError::InvalidParameter { .. })
        ));
    }
}

// ============================================================================
// Phase 2: Membership
// ============================================================================

#[test]
fn test_add_then_contains() {
    let (_, mut filter) = setup_default(1000, 60.0);
    filter.add(b"alpha");
    assert_eq!(filter.num_filters(), 1);
    assert!(filter.contains(b"alpha"));
    assert!(!filter.contains(b"beta"));
}

#[test]
fn test_first_add_creates_the_base_tier() {
    let (_, mut filter) = setup_doubling(250, 60.0, 0.005);
    filter.add(b"alpha");
    let stats = filter.stats();
    assert_eq!(stats.num_filters, 1);
    assert_eq!(stats.tiers[0].capacity, 250);
    // first tier budget is error * (1 - r)
    assert!((stats.tiers[0].error_rate - 0.0005).abs() < 1e-12);
}

#[test]
fn test_no_false_negatives_across_tiers() {
    let (_, mut filter) = setup_doubling(50, 60.0, 0.005);
    let keys: Vec<Vec<u8>> = (0..400u64).map(|i| i.to_le_bytes().to_vec()).collect();
    for key in &keys {
        filter.add(key);
    }
    assert!(filter.num_filters() > 1, "load must have spilled tiers");
    for key in &keys {
        assert!(filter.contains(key), "false negative for {:?}", key);
    }
}

// ============================================================================
// Phase 3: Growth
// ============================================================================

#[test]
fn test_growth_to_a_second_tier() {
    // capacity=30, growth=2, max_fill=0.9: 60 rapid inserts spill once
    let (_, mut filter) = setup_doubling(30, 60.0, 0.005);
    for i in 0..60u64 {
        filter.add(&i.to_le_bytes());
    }

    let stats = filter.stats();
    assert_eq!(stats.num_filters, 2);
    assert_eq!(stats.tiers[0].capacity, 30);
    assert_eq!(stats.tiers[1].capacity, 60);
    assert!(stats.tiers[1].error_rate < stats.tiers[0].error_rate);
    for i in 0..60u64 {
        assert!(filter.contains(&i.to_le_bytes()));
    }
}

#[test]
fn test_default_growth_factor_scales_tier_capacity() {
    let (_, mut filter) = setup_default(100, 60.0);
    for i in 0..400u64 {
        filter.add(&i.to_le_bytes());
    }
    let stats = filter.stats();
    assert!(stats.num_filters >= 2);
    // g = 2 * sqrt(2): the second tier rounds to 283
    assert_eq!(stats.tiers[1].capacity, 283);
}

#[test]
fn test_size_estimate_spans_tiers() {
    let (_, mut filter) = setup_doubling(50, 60.0, 0.005);
    for i in 0..300u64 {
        filter.add(&i.to_le_bytes());
    }
    let estimate = filter.size_estimate();
    assert!(
        (estimate - 300.0).abs() < 45.0,
        "estimate {} too far from 300",
        estimate
    );
}

// ============================================================================
// Phase 4: Decay, Reclamation, Shrink
// ============================================================================

#[test]
fn test_drained_tier_is_reclaimed_while_fresh_tier_survives() {
    let (scheduler, mut filter) = setup_doubling(30, 60.0, 0.005);

    // first wave fills the base tier and spills
    for i in 0..30u64 {
        filter.add(&i.to_le_bytes());
    }
    scheduler.advance(20.0);
    // second wave lands in the larger tier
    for i in 30..60u64 {
        filter.add(&i.to_le_bytes());
    }
    assert_eq!(filter.num_filters(), 2);

    scheduler.advance(15.0); // t = 35: everything still fresh
    filter.decay();
    assert_eq!(filter.num_filters(), 2);

    scheduler.advance(30.0); // t = 65: the first wave has aged out
    filter.decay();
    let stats = filter.stats();
    assert_eq!(stats.num_filters, 1, "drained base tier is reclaimed");
    assert_eq!(stats.tiers[0].capacity, 60);
    for i in 30..60u64 {
        assert!(filter.contains(&i.to_le_bytes()), "second wave stays visible");
    }

    scheduler.advance(30.0); // t = 95: the second wave has aged out too
    filter.decay();
    let stats = filter.stats();
    assert!(filter.is_empty());
    assert_eq!(stats.num_filters, 1);
    assert_eq!(
        stats.tiers[0].capacity, 30,
        "idle oversized tier shrinks back to the base capacity"
    );
}

#[test]
fn test_presence_invariant_every_tier_is_nonempty_or_target() {
    let (scheduler, mut filter) = setup_doubling(20, 60.0, 0.005);
    let mut key = 0u64;
    for round in 1..12 {
        for _ in 0..round * 7 {
            filter.add(&key.to_le_bytes());
            key += 1;
        }
        scheduler.advance(20.0);
        filter.decay();

        let stats = filter.stats();
        assert!(stats.num_filters >= 1);
        for (index, tier) in stats.tiers.iter().enumerate() {
            assert!(
                tier.nonzero_cells > 0 || index == stats.num_filters - 1,
                "round {}: drained tier {} was not reclaimed",
                round,
                index
            );
        }
    }
}

#[test]
fn test_long_idle_controller_settles_at_one_base_tier() {
    let (scheduler, mut filter) = setup_doubling(25, 60.0, 0.005);
    for i in 0..200u64 {
        filter.add(&i.to_le_bytes());
    }
    assert!(filter.num_filters() >= 3);

    for _ in 0..12 {
        scheduler.advance(30.0);
        filter.decay();
    }
    let stats = filter.stats();
    assert!(filter.is_empty());
    assert_eq!(stats.num_filters, 1);
    assert_eq!(stats.tiers[0].capacity, 25);
}

// ============================================================================
// Phase 5: Start/Stop Lifecycle
// ============================================================================

#[test]
fn test_started_controller_decays_all_tiers() {
    let (scheduler, mut filter) = setup_doubling(30, 60.0, 0.005);
    filter.start().unwrap();
    assert_eq!(scheduler.pending_tasks(), 1, "one combined sweep task");

    for i in 0..60u64 {
        filter.add(&i.to_le_bytes());
    }
    assert_eq!(filter.num_filters(), 2);

    scheduler.advance(240.0);
    assert!(filter.is_empty());
    assert_eq!(filter.num_filters(), 1);
}

#[test]
fn test_start_stop_state_errors() {
    let (_, mut filter) = setup_default(1000, 60.0);
    assert!(matches!(
        filter.stop(),
        Err(FilterError::InvalidState { .. })
    ));
    filter.start().unwrap();
    assert!(matches!(
        filter.start(),
        Err(FilterError::InvalidState { .. })
    ));
    filter.stop().unwrap();
    assert!(!filter.is_started());
}

#[test]
fn test_dropping_a_started_controller_cancels_its_task() {
    let scheduler = Rc::new(ManualScheduler::new());
    {
        let mut filter =
            ScalingTimingBloomFilter::new(1000, 60.0, scheduler.clone()).unwrap();
        filter.start().unwrap();
        assert_eq!(scheduler.pending_tasks(), 1);
    }
    assert_eq!(scheduler.pending_tasks(), 0);
}

// ============================================================================
// Phase 6: Compound False Positive Rate
// ============================================================================

#[test]
fn test_compound_false_positive_rate_across_saturated_tiers() {
    // error=0.01, tightening=0.9, doubling growth; saturate 10 tiers
    let (_, mut filter) = setup_doubling(50, 60.0, 0.01);
    let mut key = 0u64;
    while filter.num_filters() < 10 {
        filter.add(&key.to_le_bytes());
        key += 1;
    }

    let probes = 100_000u64;
    let false_positives = (10_000_000..10_000_000 + probes)
        .filter(|i| filter.contains(&i.to_le_bytes()))
        .count();
    let rate = false_positives as f64 / probes as f64;
    assert!(
        rate <= 2.0 * 0.01,
        "compound false positive rate {} exceeds 2x target",
        rate
    );
}

// ============================================================================
// Phase 7: Shared Contract
// ============================================================================

#[test]
fn test_usable_through_the_trait_object() {
    let scheduler = Rc::new(ManualScheduler::new());
    let mut filter: Box<dyn DecayingFilter> =
        Box::new(ScalingTimingBloomFilter::new(100, 60.0, scheduler.clone()).unwrap());

    assert!(filter.is_empty());
    filter.add(b"alpha");
    assert!(filter.contains(b"alpha"));
    filter.start().unwrap();
    scheduler.advance(240.0);
    assert!(filter.is_empty());
    filter.stop().unwrap();
}

// ============================================================================
// Phase 8: Property-Based Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_fresh_adds_are_always_found_across_tiers(
        keys in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..48), 1..200),
    ) {
        let scheduler = Rc::new(ManualScheduler::new());
        // a small base capacity forces tier spill for larger inputs
        let mut filter =
            ScalingTimingBloomFilter::new(20, 60.0, scheduler).unwrap();
        for key in &keys {
            filter.add(key);
        }
        for key in &keys {
            prop_assert!(filter.contains(key), "false negative for {:?}", key);
        }
    }

    #[test]
    fn prop_cadenced_decay_drains_the_controller(
        keys in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 1..100),
        decay_time in 1.0f64..500.0,
    ) {
        let scheduler = Rc::new(ManualScheduler::new());
        let mut filter =
            ScalingTimingBloomFilter::new(20, decay_time, scheduler.clone()).unwrap();
        for key in &keys {
            filter.add(key);
        }
        for _ in 0..6 {
            scheduler.advance(decay_time / 2.0);
            filter.decay();
        }
        prop_assert!(filter.is_empty());
        prop_assert_eq!(filter.num_filters(), 1);
        for key in &keys {
            prop_assert!(!filter.contains(key));
        }
    }
}
