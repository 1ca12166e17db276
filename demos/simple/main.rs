use std::sync::Arc;

use toggle_engine::{
    fetcher::StaticFetcher,
    metrics::aggregator::{self, MetricsAggregatorConfig},
    poller_thread::PollerThread,
    repository::ToggleRepository,
    Context, Evaluator, EvaluatorConfig,
};

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // A real deployment would fetch definitions over the network. The static fetcher serves a
    // bundled definition set.
    let fetcher = StaticFetcher::from_json(include_str!("../../tests/data/features.json"))?;
    let repository = Arc::new(ToggleRepository::new());

    // Start a poller thread to keep the repository up to date.
    let poller = PollerThread::start(fetcher, repository.clone())?;

    // Block waiting for definitions. Until this call returns, every feature evaluates as
    // disabled.
    poller.wait_for_features()?;

    let (sink, aggregator) = aggregator::channel(MetricsAggregatorConfig::new());
    let metrics = aggregator.spawn(|bucket| match serde_json::to_string_pretty(&bucket) {
        Ok(json) => println!("Metrics: {json}"),
        Err(err) => eprintln!("Failed to encode metrics: {err}"),
    })?;

    let evaluator = Evaluator::new(EvaluatorConfig::new(repository).with_metrics(sink));

    for user in ["1", "2", "40", "123"] {
        let context = Context::new()
            .with_user_id(user)
            .with_environment("production")
            .with_property("appVersion", "1.10.0");
        println!(
            "user {user}: feature.flexible = {}, test.variants = {:?}",
            evaluator.is_enabled("feature.flexible", &context),
            evaluator.get_variant("test.variants", &context),
        );
    }

    // Dropping the evaluator drops the last metrics sink, which flushes the aggregator.
    drop(evaluator);
    let _ = metrics.join();

    poller.shutdown()?;
    Ok(())
}
