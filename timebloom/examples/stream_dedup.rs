//! Deduplicating an event stream with a scaling timing Bloom filter
//!
//! Run with: cargo run --example stream_dedup

use std::rc::Rc;
use timebloom::common::hash::hash_item;
use timebloom::{ManualScheduler, ScalingTimingBloomFilter};

fn main() {
    // events repeat within a 60 second horizon; remember them for that long
    let scheduler = Rc::new(ManualScheduler::new());
    let mut seen = ScalingTimingBloomFilter::new(10_000, 60.0, scheduler.clone())
        .expect("valid filter parameters");
    seen.start().expect("fresh filter starts");

    let mut delivered = 0u64;
    let mut suppressed = 0u64;

    // a bursty synthetic stream: every batch replays half of the previous one
    for batch in 0u64..40 {
        for i in 0..500u64 {
            let key = hash_item(&("order", batch * 250 + i)).to_le_bytes();
            if seen.contains(&key) {
                suppressed += 1;
            } else {
                seen.add(&key);
                delivered += 1;
            }
        }
        // five seconds pass between batches; the scheduler fires the decay
        // sweep on its own as the clock moves
        scheduler.advance(5.0);
    }

    let stats = seen.stats();
    println!("delivered:  {}", delivered);
    println!("suppressed: {}", suppressed);
    println!(
        "filter: {} tier(s), ~{:.0} keys held, {} bytes",
        stats.num_filters, stats.size_estimate, stats.memory_bytes
    );
}
