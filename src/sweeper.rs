use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alerts::STREAM_MAXLEN;
use crate::config::Config;
use crate::error::PipelineError;
use crate::models::AlertKind;
use crate::processor::{HotPageTracker, TrendingScorer};
use crate::store::KvStore;

/// Periodic background maintenance (spec.md §5 "Periodic sweepers (hot-page
/// GC, trending prune, alert-stream trim)"). Each sweep runs as its own
/// task on its own interval so a slow sweep never delays the others.

pub async fn run_hot_page_gc(tracker: &HotPageTracker, interval_secs: u64, cancel: CancellationToken) {
    run_periodic("hot_page_gc", interval_secs, cancel, || async {
        let reaped = tracker.sweep().await?;
        if reaped > 0 {
            info!(reaped, "hot-page sweep reaped stale windows");
        }
        let live = tracker.live_count().await?;
        crate::metrics::prometheus::counters::hot_pages_live(live);
        Ok(())
    })
    .await;
}

pub async fn run_trending_prune(scorer: &TrendingScorer, interval_secs: u64, now_fn: impl Fn() -> i64, cancel: CancellationToken) {
    run_periodic("trending_prune", interval_secs, cancel, || async {
        match scorer.prune(now_fn()).await {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, "trending prune removed stale entries");
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    })
    .await;
}

/// Opportunistic re-trim of every alert stream, belt-and-braces alongside
/// the trim each `alerts::publish` call already performs (spec.md §3
/// "streams are length-bounded").
pub async fn run_alert_trim(kv: &dyn KvStore, interval_secs: u64, cancel: CancellationToken) {
    let kinds = [AlertKind::Spike, AlertKind::EditWar, AlertKind::Trending, AlertKind::Vandalism];
    run_periodic("alert_trim", interval_secs, cancel, || async {
        for kind in kinds {
            kv.xtrim_maxlen(kind.stream_key(), STREAM_MAXLEN).await?;
        }
        Ok(())
    })
    .await;
}

/// Lookback window (days past `retention_days`) the sweep checks for
/// leftover indices each run — bounded rather than unbounded so a single
/// sweep tick never issues an unbounded number of delete requests.
const RETENTION_LOOKBACK_DAYS: i64 = 14;

/// Deletes document indices older than `retention_days` (spec.md §4.8
/// "Retention"). Index names are date-routed (`wikipedia-edits-YYYY-MM-DD`),
/// so retention walks that naming scheme day by day rather than relying on
/// an index-lifecycle-management policy document; a 404 on an
/// already-deleted index is treated as success (spec.md §4.8 "already
/// exists' responses are not errors", applied symmetrically to deletes).
pub async fn run_retention_sweep(index_base_url: &str, retention_days: i64, interval_secs: u64, now_fn: impl Fn() -> i64, cancel: CancellationToken) {
    let client = reqwest::Client::new();
    run_periodic("retention_sweep", interval_secs, cancel, || async {
        for age in retention_days..(retention_days + RETENTION_LOOKBACK_DAYS) {
            let index = crate::indexing::document::index_name(now_fn() - age * 86_400);
            let url = format!("{index_base_url}/{index}");
            match client.delete(&url).send().await {
                Ok(resp) if resp.status().is_success() || resp.status().as_u16() == 404 => {}
                Ok(resp) => return Err(PipelineError::transient("document_index", anyhow::anyhow!("retention delete of {index} returned {}", resp.status()))),
                Err(e) => return Err(PipelineError::transient("document_index", e)),
            }
        }
        Ok(())
    })
    .await;
}

async fn run_periodic<F, Fut>(name: &'static str, interval_secs: u64, cancel: CancellationToken, mut sweep: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), PipelineError>>,
{
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                if let Err(e) = sweep().await {
                    warn!(sweep = name, error = %e, "sweep failed");
                }
            }
        }
    }
}

/// Bundles the config-derived intervals each sweeper needs, so `main.rs`
/// only has to destructure one struct when spawning the sweep tasks.
pub struct SweepIntervals {
    pub hot_page_gc_secs: u64,
    pub trending_prune_secs: u64,
    pub alert_trim_secs: u64,
    pub retention_sweep_secs: u64,
}

impl SweepIntervals {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hot_page_gc_secs: config.hot_cleanup_interval_secs,
            trending_prune_secs: config.trending_prune_interval_secs,
            alert_trim_secs: 300,
            retention_sweep_secs: 3600,
        }
    }
}
