pub mod editwar;
pub mod hot_pages;
pub mod spike;
pub mod trending;

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::Edit;
use crate::store::KvStore;

pub use editwar::EditWarDetector;
pub use hot_pages::HotPageTracker;
pub use spike::SpikeDetector;
pub use trending::TrendingScorer;

/// What happened to one edit as it passed through the processor stage
/// (spec.md §4 "Processor"). Consumed by the indexing strategy to decide
/// whether the edit's page belongs in the search index this cycle.
#[derive(Debug, Clone, Default)]
pub struct ProcessingOutcome {
    pub is_hot: bool,
    pub spike_alert: bool,
    pub edit_war_alert: bool,
    pub trending_score: f64,
}

/// Fans a single edit out to every detector (spec.md §4 "Processor runs the
/// edit through hot-page tracking, trending, spike detection, and edit-war
/// detection, in any order — they don't depend on each other's output").
pub struct Processor {
    kv: Arc<dyn KvStore>,
    pub hot_pages: Arc<HotPageTracker>,
    pub trending: Arc<TrendingScorer>,
    pub spike: Arc<SpikeDetector>,
    pub editwar: Arc<EditWarDetector>,
}

impl Processor {
    pub fn new(kv: Arc<dyn KvStore>, config: &Config) -> Self {
        Self {
            hot_pages: Arc::new(HotPageTracker::new(kv.clone(), config)),
            trending: Arc::new(TrendingScorer::new(kv.clone(), config)),
            spike: Arc::new(SpikeDetector::new(kv.clone(), config)),
            editwar: Arc::new(EditWarDetector::new(kv.clone(), config)),
            kv,
        }
    }

    /// Processes one edit through every detector. Each detector is
    /// independently idempotent against replays of the same edit id, so a
    /// consumer retrying after a crash before committing its offset
    /// (spec.md §4.2 "at-least-once") never double-counts beyond what the
    /// underlying KV primitives already tolerate.
    #[instrument(skip(self, edit), fields(page = %edit.page_key(), wiki = %edit.wiki))]
    pub async fn process(&self, edit: &Edit, now: i64) -> Result<ProcessingOutcome, PipelineError> {
        let is_hot = self.hot_pages.record_edit(edit, now).await?;
        let trending_score = self.trending.record_edit(edit, now).await?;

        // Every edit feeds the spike detector's minute buckets (spec.md §4.5
        // "Every edit feeds a per-page minute-bucket count"), unlike edit-war
        // detection below, which is explicitly scoped to hot pages only
        // (spec.md §4.6 "For each edit on a hot page, increment editwar...").
        let spike_alert = self.spike.record_edit(edit, now).await?.is_some();
        let edit_war_alert = if is_hot { self.editwar.record_edit(edit, now).await?.is_some() } else { false };

        debug!(is_hot, trending_score, spike_alert, edit_war_alert, "edit processed");

        Ok(ProcessingOutcome { is_hot, spike_alert, edit_war_alert, trending_score })
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FakeKv;
    use clap::Parser;

    fn config() -> Config {
        let mut c = Config::parse_from(["wikisurge"]);
        c.hot_threshold = 1;
        c.max_hot_pages = 100;
        c
    }

    fn edit(title: &str, ts: i64) -> Edit {
        Edit {
            id: 1,
            kind: "edit".into(),
            title: title.into(),
            user: "alice".into(),
            bot: false,
            wiki: "enwiki".into(),
            server_url: "".into(),
            timestamp: ts,
            length_old: 0,
            length_new: 10,
            revision_old: 0,
            revision_new: 0,
            comment: "".into(),
            byte_change: 10,
            language: "en".into(),
        }
    }

    #[tokio::test]
    async fn processes_edit_through_every_detector() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let processor = Processor::new(kv, &config());

        let outcome = processor.process(&edit("X", 1000), 1000).await.unwrap();
        assert!(outcome.is_hot);
        assert!(outcome.trending_score > 0.0);
    }
}
