use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{instrument, warn};

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::Edit;
use crate::store::KvStore;

/// Activity-counter TTL (spec.md §3 "Activity counter").
const ACTIVITY_TTL_SECS: i64 = 600;
/// Extra TTL margin added to `window_duration` for both the window and
/// metadata keys (spec.md §3 "Both expire window_duration + 10 minutes").
const TTL_MARGIN_SECS: i64 = 600;
/// How long the live-hot-pages count is cached (spec.md §4.3 "Circuit
/// breaker").
const LIVE_COUNT_CACHE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageStats {
    pub edits_last_hour: i64,
    pub edits_last_5min: i64,
    pub unique_editors: i64,
    pub last_byte_change: i64,
    pub total_edits: i64,
}

pub struct HotPageTracker {
    kv: Arc<dyn KvStore>,
    hot_threshold: i64,
    window_duration_secs: i64,
    max_members_per_page: isize,
    max_hot_pages: i64,
    live_count_cache: Mutex<(Instant, i64)>,
}

impl HotPageTracker {
    pub fn new(kv: Arc<dyn KvStore>, config: &Config) -> Self {
        Self {
            kv,
            hot_threshold: config.hot_threshold as i64,
            window_duration_secs: config.window_duration_secs,
            max_members_per_page: config.max_members_per_page,
            max_hot_pages: config.max_hot_pages as i64,
            live_count_cache: Mutex::new((Instant::now() - LIVE_COUNT_CACHE * 2, 0)),
        }
    }

    fn activity_key(page_key: &str) -> String {
        format!("activity:{page_key}")
    }
    fn window_key(page_key: &str) -> String {
        format!("hot:window:{page_key}")
    }
    fn meta_key(page_key: &str) -> String {
        format!("hot:meta:{page_key}")
    }

    fn ttl(&self) -> i64 {
        self.window_duration_secs + TTL_MARGIN_SECS
    }

    /// Refreshed at most once per `LIVE_COUNT_CACHE` interval via a key
    /// scan, per spec.md §4.3 "cached for 10 s".
    async fn live_hot_pages(&self) -> Result<i64, PipelineError> {
        {
            let guard = self.live_count_cache.lock();
            if guard.0.elapsed() < LIVE_COUNT_CACHE {
                return Ok(guard.1);
            }
        }
        let keys = self.kv.scan_keys("hot:window:*").await?;
        let count = keys.len() as i64;
        *self.live_count_cache.lock() = (Instant::now(), count);
        Ok(count)
    }

    /// Optimistically bump the cached live-hot-page count after a
    /// promotion, so a burst of promotions inside the same 10s cache
    /// window doesn't blow past `max_hot_pages` before the next rescan.
    fn bump_live_count_cache(&self) {
        let mut guard = self.live_count_cache.lock();
        guard.1 += 1;
    }

    /// Promotion gate + update (spec.md §4.3). Returns `true` if the page
    /// is hot after this edit (whether newly promoted or already hot).
    /// Every edit that reaches the tracker counts toward `edit_count`
    /// (spec.md §8 scenario 1 "After the second: ... total_edits = 2"),
    /// whether or not this particular edit ends up promoting or being hot —
    /// `touch()` bumps it for the already-hot/promoting paths, `bump_edit_count`
    /// bumps it for every other path, so each edit is counted exactly once.
    #[instrument(skip(self, edit), fields(page = %edit.page_key()))]
    pub async fn record_edit(&self, edit: &Edit, now: i64) -> Result<bool, PipelineError> {
        let page_key = edit.page_key();
        let already_hot = self.kv.exists(&Self::window_key(&page_key)).await?;

        if already_hot {
            self.touch(&page_key, edit, now).await?;
            return Ok(true);
        }

        let activity_key = Self::activity_key(&page_key);
        let first_touch = !self.kv.exists(&activity_key).await?;
        let count = self.kv.incr(&activity_key).await?;
        if first_touch {
            self.kv.expire(&activity_key, ACTIVITY_TTL_SECS).await?;
        }

        if count < self.hot_threshold {
            self.bump_edit_count(&page_key).await?;
            return Ok(false);
        }

        let live = self.live_hot_pages().await?;
        if live >= self.max_hot_pages {
            warn!(page = %page_key, live, max = self.max_hot_pages, "hot-page promotion rejected by circuit breaker");
            self.bump_edit_count(&page_key).await?;
            return Ok(false);
        }

        self.touch(&page_key, edit, now).await?;
        self.bump_live_count_cache();
        Ok(true)
    }

    /// Bumps `edit_count` for an edit that doesn't go through `touch()`
    /// (still below threshold, or rejected by the live-hot-page breaker).
    async fn bump_edit_count(&self, page_key: &str) -> Result<(), PipelineError> {
        let meta_key = Self::meta_key(page_key);
        let count = self.kv.hincrby(&meta_key, "edit_count", 1).await?;
        if count == 1 {
            self.kv.expire(&meta_key, ACTIVITY_TTL_SECS).await?;
        }
        Ok(())
    }

    async fn touch(&self, page_key: &str, edit: &Edit, now: i64) -> Result<(), PipelineError> {
        let member = format!("{}:{}", now_ns(edit.timestamp), edit.id);
        self.kv
            .hot_page_touch(
                &Self::window_key(page_key),
                &Self::meta_key(page_key),
                &member,
                edit.timestamp as f64,
                now,
                self.window_duration_secs,
                self.max_members_per_page,
                &edit.user,
                edit.byte_change,
                self.ttl(),
            )
            .await?;
        Ok(())
    }

    pub async fn is_hot(&self, page_key: &str) -> Result<bool, PipelineError> {
        Ok(self.kv.exists(&Self::window_key(page_key)).await?)
    }

    /// Live hot-page count for the `/metrics` gauge (spec.md §4.1/§7).
    pub async fn live_count(&self) -> Result<i64, PipelineError> {
        self.live_hot_pages().await
    }

    /// `GetPageStats` (spec.md §4.3 "Queries").
    pub async fn page_stats(&self, page_key: &str, now: i64) -> Result<PageStats, PipelineError> {
        let window_key = Self::window_key(page_key);
        let meta_key = Self::meta_key(page_key);

        let edits_last_hour = self.kv.zcount(&window_key, (now - 3600) as f64, now as f64).await?;
        let edits_last_5min = self.kv.zcount(&window_key, (now - 300) as f64, now as f64).await?;

        let meta = self.kv.hgetall(&meta_key).await?;
        let unique_editors = meta.keys().filter(|k| k.starts_with("editor:")).count() as i64;
        let last_byte_change = meta.get("last_byte_change").and_then(|v| v.parse().ok()).unwrap_or(0);
        let total_edits = meta.get("edit_count").and_then(|v| v.parse().ok()).unwrap_or(0);

        Ok(PageStats { edits_last_hour, edits_last_5min, unique_editors, last_byte_change, total_edits })
    }

    /// Periodic sweep (spec.md §4.3 "Garbage collection"): delete the
    /// window+metadata pair whenever the window is empty or its TTL has
    /// gone negative (expired but not yet reaped by Redis).
    pub async fn sweep(&self) -> Result<u64, PipelineError> {
        let mut reaped = 0u64;
        for window_key in self.kv.scan_keys("hot:window:*").await? {
            let card = self.kv.zcard(&window_key).await?;
            let ttl = self.kv.ttl(&window_key).await?;
            if card == 0 || ttl.is_none() {
                let page_key = window_key.trim_start_matches("hot:window:");
                self.kv.del(&window_key).await?;
                self.kv.del(&Self::meta_key(page_key)).await?;
                reaped += 1;
            }
        }
        Ok(reaped)
    }
}

/// Nanosecond conversion for window member ids. Takes the edit's own
/// timestamp, not wall-clock processing time, so a Kafka redelivery of the
/// same edit produces the same `"{ts_ns}:{edit_id}"` member and dedupes
/// instead of adding a second window entry (spec.md §9 "guarantee
/// uniqueness without requiring the store to enforce set semantics across
/// retries"; spec.md §8 "no duplicated window members — dedup by
/// `(ts_ns, edit_id)`").
fn now_ns(timestamp_secs: i64) -> i64 {
    timestamp_secs * 1_000_000_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FakeKv;
    use clap::Parser;

    fn config(hot_threshold: u64, max_hot_pages: u64, max_members_per_page: isize) -> Config {
        let mut c = Config::parse_from(["wikisurge"]);
        c.hot_threshold = hot_threshold;
        c.max_hot_pages = max_hot_pages;
        c.max_members_per_page = max_members_per_page;
        c.window_duration_secs = 3600;
        c
    }

    fn edit(id: i64, title: &str, ts: i64) -> Edit {
        Edit {
            id,
            kind: "edit".into(),
            title: title.into(),
            user: format!("user{id}"),
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

    // Scenario 1 (spec.md §8): hot_threshold=2, two edits to "TestPage".
    #[tokio::test]
    async fn promotion_below_threshold_then_promotes() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let tracker = HotPageTracker::new(kv, &config(2, 100, 500));

        let e1 = edit(1, "TestPage", 1000);
        tracker.record_edit(&e1, 1000).await.unwrap();
        assert!(!tracker.is_hot("enwiki:TestPage").await.unwrap());

        let e2 = edit(2, "TestPage", 1001);
        tracker.record_edit(&e2, 1001).await.unwrap();
        assert!(tracker.is_hot("enwiki:TestPage").await.unwrap());

        let stats = tracker.page_stats("enwiki:TestPage", 1001).await.unwrap();
        assert_eq!(stats.total_edits, 2);
    }

    // Scenario 2 (spec.md §8): circuit breaker caps live hot pages at 2.
    #[tokio::test]
    async fn circuit_breaker_rejects_third_page() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let tracker = HotPageTracker::new(kv, &config(2, 2, 500));

        for title in ["A", "B"] {
            tracker.record_edit(&edit(1, title, 1000), 1000).await.unwrap();
            tracker.record_edit(&edit(2, title, 1001), 1001).await.unwrap();
        }
        assert!(tracker.is_hot("enwiki:A").await.unwrap());
        assert!(tracker.is_hot("enwiki:B").await.unwrap());

        tracker.record_edit(&edit(1, "C", 1000), 1000).await.unwrap();
        tracker.record_edit(&edit(2, "C", 1001), 1001).await.unwrap();
        assert!(!tracker.is_hot("enwiki:C").await.unwrap());
    }

    // Scenario 3 (spec.md §8): window cap of 3, 7 total edits.
    #[tokio::test]
    async fn window_cap_keeps_newest_entries() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let tracker = HotPageTracker::new(kv.clone(), &config(2, 100, 3));

        for i in 1..=7i64 {
            tracker.record_edit(&edit(i, "P", 1000 + i), 1000 + i).await.unwrap();
        }

        let card = kv.zcard("hot:window:enwiki:P").await.unwrap();
        assert_eq!(card, 3);
    }
}
