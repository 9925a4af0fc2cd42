use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wikisurge::config::Config;
use wikisurge::indexing::{DocumentIndexer, IndexingStrategy};
use wikisurge::logbus::{EditConsumer, EditProducer};
use wikisurge::processor::Processor;
use wikisurge::store::{KvStore, RedisKv};
use wikisurge::{api, ingest, metrics, sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))).init();

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   WikiSurge — Wikipedia recent-change pipeline    ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    let prometheus = metrics::prometheus::install();
    let cancel = CancellationToken::new();

    info!(redis_url = %config.redis_url, "connecting to Redis");
    let kv: Arc<dyn KvStore> = Arc::new(RedisKv::connect(&config.redis_url).await?);

    let producer = EditProducer::new(&config.kafka_brokers, &config.kafka_topic)?;
    let ingest_stats = Arc::new(ingest::IngestStats::default());

    let processor = Arc::new(Processor::new(kv.clone(), &config));
    let indexing_strategy = Arc::new(IndexingStrategy::new(
        &config,
        processor.hot_pages.clone(),
        processor.trending.clone(),
        processor.spike.clone(),
        processor.editwar.clone(),
    ));
    let (indexer, indexer_stats) = DocumentIndexer::spawn(
        config.index_base_url.clone(),
        config.bulk_size,
        std::time::Duration::from_secs(config.flush_interval_secs),
        config.bulk_size * 4,
        cancel.clone(),
    );

    // ── Ingestor: one task for the SSE read loop ─────────────────
    let ingest_config = config.clone();
    let ingest_cancel = cancel.clone();
    let ingest_stats_task = ingest_stats.clone();
    let ingest_handle = tokio::spawn(async move {
        ingest::run(&ingest_config, &producer, &ingest_stats_task, ingest_cancel).await;
    });

    // ── Log consumers: one task per partition ────────────────────
    let mut consumer_handles = Vec::new();
    for partition in 0..config.kafka_partitions {
        let brokers = config.kafka_brokers.clone();
        let group_id = config.kafka_group_id.clone();
        let topic = config.kafka_topic.clone();
        let processor = processor.clone();
        let indexing_strategy = indexing_strategy.clone();
        let indexer = indexer.clone();
        let cancel = cancel.clone();

        consumer_handles.push(tokio::spawn(async move {
            let consumer = match EditConsumer::new(&brokers, &group_id, &topic) {
                Ok(c) => c,
                Err(e) => {
                    error!(partition, error = %e, "failed to start log consumer");
                    return;
                }
            };
            consumer.run(&processor, &indexing_strategy, &indexer, now_secs, cancel).await;
        }));
    }

    // ── Periodic sweepers ─────────────────────────────────────────
    let intervals = sweeper::SweepIntervals::from_config(&config);
    let hot_pages_for_sweep = processor.hot_pages.clone();
    let trending_for_sweep = processor.trending.clone();
    let kv_for_sweep = kv.clone();

    let hot_gc = {
        let cancel = cancel.clone();
        tokio::spawn(async move { sweeper::run_hot_page_gc(&hot_pages_for_sweep, intervals.hot_page_gc_secs, cancel).await })
    };
    let trending_prune = {
        let cancel = cancel.clone();
        tokio::spawn(async move { sweeper::run_trending_prune(&trending_for_sweep, intervals.trending_prune_secs, now_secs, cancel).await })
    };
    let alert_trim = {
        let cancel = cancel.clone();
        tokio::spawn(async move { sweeper::run_alert_trim(&*kv_for_sweep, intervals.alert_trim_secs, cancel).await })
    };
    let retention_sweep = {
        let cancel = cancel.clone();
        let base_url = config.index_base_url.clone();
        let retention_days = config.retention_days;
        tokio::spawn(async move { sweeper::run_retention_sweep(&base_url, retention_days, intervals.retention_sweep_secs, now_secs, cancel).await })
    };

    // ── Health/metrics server ─────────────────────────────────────
    let api_router = api::router(kv.clone(), prometheus);
    let api_addr = format!("0.0.0.0:{}", config.metrics_port);
    let api_cancel = cancel.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api_router, &api_addr, api_cancel).await {
            error!(error = %e, "health/metrics server exited with error");
        }
    });

    info!(metrics_port = config.metrics_port, partitions = config.kafka_partitions, "wikisurge running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, cancelling tasks");
    cancel.cancel();

    let _ = tokio::time::timeout(api::SHUTDOWN_DEADLINE, async {
        let _ = ingest_handle.await;
        for handle in consumer_handles {
            let _ = handle.await;
        }
        let _ = hot_gc.await;
        let _ = trending_prune.await;
        let _ = alert_trim.await;
        let _ = retention_sweep.await;
        let _ = api_handle.await;
    })
    .await;

    let (indexed, failed, dropped) = indexer_stats.snapshot();
    info!(indexed, failed, dropped, "final indexer tally");

    Ok(())
}

fn now_secs() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
