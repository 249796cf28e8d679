//! Integration test: batch completeness and decision accounting under
//! varying worker counts, in both decision modes.
//!
//! An instrumented decision function counts every call; after each
//! request the count must equal the sum of the returned episode
//! lengths, and every row must be zero past its length.

use std::sync::Arc;

use tinyrl_collector::{Collector, CollectorConfig, DecisionFn, EpisodeBatch, PaddingPolicy};
use tinyrl_core::Action;
use tinyrl_test_utils::{small_schema, CountingPolicy, ScriptedGame};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn collector(config: CollectorConfig) -> Collector {
    Collector::new(config, |slot| {
        Ok(ScriptedGame::with_schema(slot.seed, small_schema()).end_probability(0.1))
    })
    .unwrap()
}

fn assert_padding_is_zero(batch: &EpisodeBatch) {
    let (width, d) = (batch.width(), batch.obs_dim());
    for (i, &len) in batch.lengths().iter().enumerate() {
        for t in len as usize..width {
            let k = i * width + t;
            assert_eq!(batch.actions()[k], 0, "row {i} step {t}");
            assert_eq!(batch.rewards()[k], 0.0, "row {i} step {t}");
            assert_eq!(batch.log_probs()[k], 0.0, "row {i} step {t}");
            assert_eq!(batch.values()[k], 0.0, "row {i} step {t}");
            assert_eq!(batch.dones()[k], 0, "row {i} step {t}");
            assert!(batch.observations()[k * d..(k + 1) * d]
                .iter()
                .all(|&v| v == 0.0));
        }
    }
}

fn assert_well_formed(batch: &EpisodeBatch, count: usize, max_steps: usize) {
    assert_eq!(batch.count(), count);
    assert_eq!(batch.lengths().len(), count);
    assert!(batch
        .lengths()
        .iter()
        .all(|&l| (1..=max_steps as u32).contains(&l)));
    let mut ids = batch.episode_ids().to_vec();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), count, "duplicate episode ids");
    for row in batch.iter_rows() {
        assert_eq!(row.dones.last(), Some(&1));
        assert!(row.dones[..row.len() - 1].iter().all(|&d| d == 0));
    }
    assert_padding_is_zero(batch);
}

#[test]
fn direct_mode_counts_match_lengths() {
    init();
    for workers in [1, 2, 8] {
        let c = collector(CollectorConfig::new(workers, 40, 8));
        let policy = Arc::new(CountingPolicy::new(Action::HardDrop));
        let batch = c
            .request_episodes(32, DecisionFn::Shared(policy.clone()))
            .unwrap();
        assert_well_formed(&batch, 32, 40);
        assert_eq!(policy.calls(), batch.total_steps(), "workers={workers}");

        let m = c.metrics();
        assert_eq!(m.episodes_completed, 32);
        assert_eq!(m.steps_executed as usize, batch.total_steps());
        assert_eq!(m.decisions_served as usize, batch.total_steps());
        let report = c.close();
        assert_eq!(report.workers_joined, workers);
    }
}

#[test]
fn serialized_mode_counts_match_lengths() {
    init();
    for workers in [1, 2, 8] {
        let c = collector(CollectorConfig::new(workers, 40, 8));
        let mut policy = CountingPolicy::new(Action::RotateCw);
        let batch = c
            .request_episodes(32, DecisionFn::exclusive(&mut policy))
            .unwrap();
        assert_well_formed(&batch, 32, 40);
        assert_eq!(policy.calls(), batch.total_steps(), "workers={workers}");
        assert!(policy.batches() >= 1);
        assert!(policy.batches() <= policy.calls());
        assert_eq!(c.metrics().decision_batches as usize, policy.batches());
    }
}

#[test]
fn serve_batch_size_one_disables_batching() {
    init();
    let c = collector(CollectorConfig {
        serve_batch_size: 1,
        ..CollectorConfig::new(4, 20, 4)
    });
    let mut policy = CountingPolicy::new(Action::SoftDrop);
    let batch = c
        .request_episodes(8, DecisionFn::exclusive(&mut policy))
        .unwrap();
    assert_eq!(policy.batches(), policy.calls());
    assert_eq!(policy.calls(), batch.total_steps());
}

#[test]
fn count_larger_than_queue_capacity() {
    init();
    let c = collector(CollectorConfig::new(2, 10, 1));
    let policy = Arc::new(CountingPolicy::new(Action::MoveLeft));
    let batch = c
        .request_episodes(50, DecisionFn::Shared(policy.clone()))
        .unwrap();
    assert_well_formed(&batch, 50, 10);
    assert_eq!(policy.calls(), batch.total_steps());
}

#[test]
fn max_steps_padding_fixes_width() {
    init();
    let c = collector(CollectorConfig {
        padding: PaddingPolicy::MaxSteps,
        ..CollectorConfig::new(2, 25, 4)
    });
    let batch = c
        .request_episodes(6, DecisionFn::shared(CountingPolicy::new(Action::Hold)))
        .unwrap();
    assert_eq!(batch.width(), 25);
    assert_eq!(batch.observations_shape().as_slice(), &[6, 25, c.obs_dim()]);
    assert_well_formed(&batch, 6, 25);
}

#[test]
fn repeated_requests_reuse_workers() {
    init();
    let c = collector(CollectorConfig::new(3, 30, 4));
    let policy = Arc::new(CountingPolicy::new(Action::HardDrop));
    let mut total = 0;
    for _ in 0..5 {
        let batch = c
            .request_episodes(7, DecisionFn::Shared(policy.clone()))
            .unwrap();
        assert_well_formed(&batch, 7, 30);
        total += batch.total_steps();
    }
    assert_eq!(policy.calls(), total);
    assert_eq!(c.metrics().requests_completed, 5);
}
