//! Property-based tests for the concurrency governor: arbitrary interleaved
//! start/finish sequences must never breach a cap or corrupt a counter.

use crawler_core::concurrency::ConcurrencyGovernor;
use crawler_core::config::{GovernorConfig, QueuePolicy};
use proptest::prelude::*;
use std::sync::Arc;

const QUEUES: [&str; 2] = ["crawl-metadata", "crawl-chapters"];
const SOURCES: [&str; 3] = ["mangadex", "webtoon", "mirror"];

#[derive(Debug, Clone)]
enum Op {
    Start { queue: usize, source: Option<usize> },
    Finish { queue: usize, source: Option<usize> },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let key = (0..QUEUES.len(), proptest::option::of(0..SOURCES.len()));
    prop_oneof![
        key.clone().prop_map(|(queue, source)| Op::Start { queue, source }),
        key.prop_map(|(queue, source)| Op::Finish { queue, source }),
    ]
}

fn governor(global_max: u32, per_queue: u32, per_source: Option<u32>) -> ConcurrencyGovernor {
    ConcurrencyGovernor::new(&GovernorConfig {
        global_max_concurrent: global_max,
        queues: QUEUES
            .iter()
            .map(|name| QueuePolicy {
                queue_name: (*name).to_string(),
                max_concurrent_per_queue: per_queue,
                max_concurrent_per_source: per_source,
                priority: 0,
            })
            .collect(),
        ..GovernorConfig::default()
    })
}

proptest! {
    /// Property: no interleaving of starts and finishes breaches any cap,
    /// and the snapshot counters stay internally consistent throughout.
    #[test]
    fn caps_hold_under_arbitrary_sequences(
        ops in proptest::collection::vec(op_strategy(), 1..200),
        global_max in 1u32..8,
        per_queue in 1u32..6,
        per_source in proptest::option::of(1u32..4),
    ) {
        let governor = governor(global_max, per_queue, per_source);

        for op in ops {
            match op {
                Op::Start { queue, source } => {
                    governor.try_start(QUEUES[queue], source.map(|s| SOURCES[s]));
                }
                Op::Finish { queue, source } => {
                    governor.finish(QUEUES[queue], source.map(|s| SOURCES[s]));
                }
            }

            let snapshot = governor.snapshot();

            prop_assert!(snapshot.global_in_flight <= global_max);

            let queue_sum: u32 = snapshot.per_queue_in_flight.values().sum();
            prop_assert_eq!(queue_sum, snapshot.global_in_flight);

            for (queue, count) in &snapshot.per_queue_in_flight {
                prop_assert!(
                    *count <= per_queue,
                    "queue {} holds {} > cap {}", queue, count, per_queue
                );
            }

            if let Some(source_cap) = per_source {
                for (key, count) in &snapshot.per_source_in_flight {
                    prop_assert!(
                        *count <= source_cap,
                        "source {} holds {} > cap {}", key, count, source_cap
                    );
                }
            }
        }
    }

    /// Property: every admitted start that is later finished leaves the
    /// governor exactly where it began.
    #[test]
    fn balanced_sequences_return_to_zero(
        keys in proptest::collection::vec(
            (0..QUEUES.len(), proptest::option::of(0..SOURCES.len())),
            0..50
        ),
    ) {
        let governor = governor(u32::MAX, u32::MAX, None);

        let admitted: Vec<_> = keys
            .into_iter()
            .filter(|(queue, source)| {
                governor.try_start(QUEUES[*queue], source.map(|s| SOURCES[s]))
            })
            .collect();

        for (queue, source) in admitted {
            governor.finish(QUEUES[queue], source.map(|s| SOURCES[s]));
        }

        let snapshot = governor.snapshot();
        prop_assert_eq!(snapshot.global_in_flight, 0);
        prop_assert!(snapshot.per_queue_in_flight.is_empty());
        prop_assert!(snapshot.per_source_in_flight.is_empty());
    }
}

/// Hammer a small capacity pool from many threads; the admitted set must
/// match the cap exactly and fully drain afterwards.
#[test]
fn test_concurrent_claims_never_exceed_cap() {
    let governor = Arc::new(governor(6, 6, None));

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let governor = Arc::clone(&governor);
            std::thread::spawn(move || {
                let queue = QUEUES[i % 2];
                governor.try_start(queue, None)
            })
        })
        .collect();

    let admitted = handles
        .into_iter()
        .map(|h| h.join())
        .filter(|r| matches!(r, Ok(true)))
        .count();

    assert_eq!(admitted, 6);
    assert_eq!(governor.snapshot().global_in_flight, 6);
}

/// Permits taken on worker threads release cleanly from any thread.
#[test]
fn test_permits_drain_across_threads() {
    let governor = Arc::new(governor(8, 8, None));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let governor = Arc::clone(&governor);
            std::thread::spawn(move || {
                if let Some(permit) = governor.acquire("crawl-metadata", Some("mangadex")) {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                    permit.complete();
                    true
                } else {
                    false
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(governor.snapshot().global_in_flight, 0);
}
