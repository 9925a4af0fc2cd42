use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::instrument;

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::Edit;
use crate::processor::{EditWarDetector, HotPageTracker, SpikeDetector, TrendingScorer};

/// How long a page's fetched context is trusted before the four lookups
/// are repeated (spec.md §4.7 "cached for 1 s per-page").
const CONTEXT_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
struct PageContext {
    trending_rank: Option<u64>,
    spike_ratio: Option<f64>,
    edit_war_active: bool,
    is_hot: bool,
}

/// `ShouldIndex(edit) -> (bool, reason)` (spec.md §4.7). Consults the
/// watchlist, trending rank, spike ratio, edit-war status, and hot-page
/// status in that order, short-circuiting on the first match.
pub struct IndexingStrategy {
    watchlist: HashSet<String>,
    trending_top_n: u64,
    spike_ratio_min: f64,
    edit_war_enabled: bool,
    hot_pages: Arc<HotPageTracker>,
    trending: Arc<TrendingScorer>,
    spike: Arc<SpikeDetector>,
    editwar: Arc<EditWarDetector>,
    context_cache: RwLock<HashMap<String, (Instant, PageContext)>>,
}

impl IndexingStrategy {
    pub fn new(
        config: &Config,
        hot_pages: Arc<HotPageTracker>,
        trending: Arc<TrendingScorer>,
        spike: Arc<SpikeDetector>,
        editwar: Arc<EditWarDetector>,
    ) -> Self {
        Self {
            watchlist: config.watchlist(),
            trending_top_n: config.trending_top_n,
            spike_ratio_min: config.index_spike_ratio_min,
            edit_war_enabled: config.edit_war_enabled,
            hot_pages,
            trending,
            spike,
            editwar,
            context_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Decision order from spec.md §4.7. Errors fetching context never
    /// force-include; the edit is skipped and the caller ticks a counter.
    #[instrument(skip(self, edit), fields(page = %edit.page_key()))]
    pub async fn should_index(&self, edit: &Edit) -> Result<(bool, String), PipelineError> {
        let page_key = edit.page_key();

        if self.watchlist.contains(&page_key) {
            return Ok((true, "watchlist".to_string()));
        }

        let ctx = self.context(&page_key).await?;

        if let Some(rank) = ctx.trending_rank {
            if rank < self.trending_top_n {
                return Ok((true, "trending_top_k".to_string()));
            }
        }
        if let Some(ratio) = ctx.spike_ratio {
            if ratio >= self.spike_ratio_min {
                return Ok((true, format!("spiking_{ratio}")));
            }
        }
        if self.edit_war_enabled && ctx.edit_war_active {
            return Ok((true, "edit_war".to_string()));
        }
        if ctx.is_hot {
            return Ok((true, "hot_page".to_string()));
        }

        Ok((false, "none".to_string()))
    }

    async fn context(&self, page_key: &str) -> Result<PageContext, PipelineError> {
        if let Some((fetched_at, ctx)) = self.context_cache.read().get(page_key).copied() {
            if fetched_at.elapsed() < CONTEXT_TTL {
                return Ok(ctx);
            }
        }

        let trending_rank = self.trending.rank(page_key).await?;
        let spike_ratio = self.spike.last_ratio(page_key).await?;
        let edit_war_active = self.editwar.status(page_key).await?.active;
        let is_hot = self.hot_pages.is_hot(page_key).await?;

        let ctx = PageContext { trending_rank, spike_ratio, edit_war_active, is_hot };
        self.context_cache.write().insert(page_key.to_string(), (Instant::now(), ctx));
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FakeKv, KvStore};
    use clap::Parser;

    fn config(watchlist: &str) -> Config {
        let mut c = Config::parse_from(["wikisurge"]);
        c.watchlist = watchlist.into();
        c.trending_top_n = 5;
        c.index_spike_ratio_min = 2.0;
        c
    }

    fn edit(title: &str) -> Edit {
        Edit {
            id: 1,
            kind: "edit".into(),
            title: title.into(),
            user: "u".into(),
            bot: false,
            wiki: "enwiki".into(),
            server_url: "".into(),
            timestamp: 0,
            length_old: 0,
            length_new: 1,
            revision_old: 0,
            revision_new: 0,
            comment: "".into(),
            byte_change: 1,
            language: "en".into(),
        }
    }

    fn strategy(config: &Config, kv: Arc<dyn KvStore>) -> IndexingStrategy {
        IndexingStrategy::new(
            config,
            Arc::new(HotPageTracker::new(kv.clone(), config)),
            Arc::new(TrendingScorer::new(kv.clone(), config)),
            Arc::new(SpikeDetector::new(kv.clone(), config)),
            Arc::new(EditWarDetector::new(kv, config)),
        )
    }

    #[tokio::test]
    async fn watchlist_short_circuits_everything() {
        let config = config("enwiki:Watched");
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let strat = strategy(&config, kv);

        let (indexed, reason) = strat.should_index(&edit("Watched")).await.unwrap();
        assert!(indexed);
        assert_eq!(reason, "watchlist");
    }

    #[tokio::test]
    async fn unremarkable_edit_is_not_indexed() {
        let config = config("");
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let strat = strategy(&config, kv);

        let (indexed, reason) = strat.should_index(&edit("Quiet")).await.unwrap();
        assert!(!indexed);
        assert_eq!(reason, "none");
    }

    #[tokio::test]
    async fn hot_page_is_indexed_when_nothing_else_matches() {
        let config = config("");
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let hot_pages = Arc::new(HotPageTracker::new(kv.clone(), &config));
        let strat = IndexingStrategy::new(
            &config,
            hot_pages.clone(),
            Arc::new(TrendingScorer::new(kv.clone(), &config)),
            Arc::new(SpikeDetector::new(kv.clone(), &config)),
            Arc::new(EditWarDetector::new(kv, &config)),
        );

        let e = edit("Hot");
        hot_pages.record_edit(&e, 0).await.unwrap();
        hot_pages.record_edit(&e, 1).await.unwrap();
        hot_pages.record_edit(&e, 2).await.unwrap();
        hot_pages.record_edit(&e, 3).await.unwrap();
        hot_pages.record_edit(&e, 4).await.unwrap();
        hot_pages.record_edit(&e, 5).await.unwrap();

        let (indexed, reason) = strat.should_index(&e).await.unwrap();
        assert!(indexed);
        assert_eq!(reason, "hot_page");
    }
}
