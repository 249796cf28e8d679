//! Collect a few batches from the scripted test engine and print a
//! summary of each.
//!
//! ```text
//! RUST_LOG=debug cargo run -p tinyrl --example collect
//! ```

use std::time::Instant;

use tinyrl::prelude::*;
use tinyrl_test_utils::{RandomPolicy, ScriptedGame};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = CollectorConfig {
        seed_base: 42,
        ..CollectorConfig::new(4, 300, 64)
    };
    let collector = Collector::new(config, |slot| Ok(ScriptedGame::new(slot.seed)))?;
    log::info!(
        "obs_dim {} action_count {}",
        collector.obs_dim(),
        collector.action_count()
    );

    // Direct mode: the policy is called on the worker threads.
    let start = Instant::now();
    let batch = collector.request_episodes(64, DecisionFn::shared(RandomPolicy::new(1)))?;
    summarize("direct", &batch, start);

    // Serialized mode: the policy stays on this thread and sees batches.
    let mut policy = RandomPolicy::new(2);
    let start = Instant::now();
    let batch = collector.request_episodes(64, DecisionFn::exclusive(&mut policy))?;
    summarize("serialized", &batch, start);

    let report = collector.close();
    log::info!("{:?}", collector.metrics());
    log::info!("shutdown: {report:?}");
    Ok(())
}

fn summarize(mode: &str, batch: &EpisodeBatch, start: Instant) {
    let elapsed = start.elapsed();
    let steps = batch.total_steps();
    let mean_return =
        batch.iter_rows().map(|row| row.total_reward()).sum::<f64>() / batch.count() as f64;
    let truncated = batch.truncated().iter().filter(|&&t| t).count();
    log::info!(
        "{mode}: {} episodes, {steps} steps in {:.1} ms ({:.0} steps/s), width {}, mean return {mean_return:.2}, {truncated} truncated",
        batch.count(),
        elapsed.as_secs_f64() * 1e3,
        steps as f64 / elapsed.as_secs_f64().max(1e-9),
        batch.width(),
    );
}
