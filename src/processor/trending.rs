use std::sync::Arc;

use tracing::instrument;

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::Edit;
use crate::store::KvStore;

const RANKED_SET_KEY: &str = "trending:ranked";
/// Over-fetch multiplier for top-N queries (SPEC_FULL.md §9 / spec.md §9:
/// "implementers should pick over-fetch multiplier >= 2").
const OVER_FETCH_MULTIPLIER: isize = 2;
/// Entries below this current score are pruned (spec.md §4.4).
const PRUNE_THRESHOLD: f64 = 0.01;

/// Lazy-decay time-weighted score for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendingEntry {
    pub page_key: String,
    pub raw_score: f64,
    pub current_score: f64,
    pub last_updated: i64,
}

/// `raw * 2^(-delta_secs/60/half_life_minutes)`. Never negative, never
/// increasing with time. `delta_secs` is clamped to `>= 0` so a slightly
/// out-of-order write never amplifies the score.
pub fn decay(raw: f64, delta_secs: i64, half_life_minutes: f64) -> f64 {
    if raw <= 0.0 {
        return 0.0;
    }
    let delta_min = delta_secs.max(0) as f64 / 60.0;
    if half_life_minutes <= 0.0 {
        return raw;
    }
    raw * 2f64.powf(-delta_min / half_life_minutes)
}

/// Per-edit score increment (spec.md §4.4): base 1.0, multipliers compose.
pub fn score_increment(edit: &Edit) -> f64 {
    let mut score = 1.0;
    if edit.byte_change.abs() > 1_000 {
        score *= 1.5;
    }
    if edit.bot {
        score *= 0.5;
    }
    if edit.kind == "new" {
        score *= 2.0;
    }
    score
}

pub struct TrendingScorer {
    kv: Arc<dyn KvStore>,
    half_life_minutes: f64,
    max_pages: isize,
}

impl TrendingScorer {
    pub fn new(kv: Arc<dyn KvStore>, config: &Config) -> Self {
        Self {
            kv,
            half_life_minutes: config.half_life_minutes,
            max_pages: config.trending_max_pages,
        }
    }

    fn entry_key(page_key: &str) -> String {
        format!("trending:entry:{page_key}")
    }

    /// Applies the per-edit increment to a page's raw score via the
    /// lazy-decay write path (spec.md §4.4 "Write path").
    #[instrument(skip(self, edit), fields(page = %edit.page_key()))]
    pub async fn record_edit(&self, edit: &Edit, now: i64) -> Result<f64, PipelineError> {
        let page_key = edit.page_key();
        let increment = score_increment(edit);
        self.kv
            .trending_apply_increment(&Self::entry_key(&page_key), RANKED_SET_KEY, &page_key, now, self.half_life_minutes, increment)
            .await
    }

    /// Read path (spec.md §4.4 "Read path"): fetch `2n` by raw score,
    /// recompute current (decayed) scores, re-sort, return the top `n`.
    pub async fn top_trending(&self, n: u64, now: i64) -> Result<Vec<TrendingEntry>, PipelineError> {
        let fetch = (n as isize * OVER_FETCH_MULTIPLIER).max(1);
        let candidates = self.kv.zrevrange_withscores(RANKED_SET_KEY, 0, fetch - 1).await?;

        let mut entries = Vec::with_capacity(candidates.len());
        for (page_key, raw_score) in candidates {
            let meta = self.kv.hgetall(&Self::entry_key(&page_key)).await?;
            let last_updated = meta.get("last_updated").and_then(|v| v.parse().ok()).unwrap_or(now);
            let current_score = decay(raw_score, now - last_updated, self.half_life_minutes);
            entries.push(TrendingEntry { page_key, raw_score, current_score, last_updated });
        }

        entries.sort_by(|a, b| b.current_score.partial_cmp(&a.current_score).unwrap());
        entries.truncate(n as usize);
        Ok(entries)
    }

    /// Rank of a page in the current-score ordering, used by the indexing
    /// strategy's `trending_top_k` rule (spec.md §4.7). Returns `None` if
    /// the page is not in the ranked set at all.
    pub async fn rank(&self, page_key: &str) -> Result<Option<u64>, PipelineError> {
        Ok(self.kv.zrevrank(RANKED_SET_KEY, page_key).await?.map(|r| r as u64))
    }

    /// Background prune (spec.md §4.4 "Pruning"): drop raw scores below
    /// 0.01 from the ranked set, then enforce `max_pages` by dropping the
    /// lowest-ranked surplus.
    pub async fn prune(&self, now: i64) -> Result<u64, PipelineError> {
        let mut removed = 0u64;

        let stale = self.kv.zrangebyscore(RANKED_SET_KEY, f64::MIN, PRUNE_THRESHOLD).await?;
        for page_key in &stale {
            self.kv.zrem(RANKED_SET_KEY, page_key).await?;
            self.kv.del(&Self::entry_key(page_key)).await?;
            removed += 1;
        }

        let card = self.kv.zcard(RANKED_SET_KEY).await?;
        if card > self.max_pages as i64 {
            let surplus = (card - self.max_pages as i64) as isize;
            self.kv.zremrangebyrank_lowest(RANKED_SET_KEY, surplus).await?;
            removed += surplus as u64;
        }

        // Orphan scan: decayed score of any remaining per-page key below
        // threshold (page sat untouched long enough that lazy decay alone
        // would have pruned it, but it never received another write).
        let now_keys = self.kv.scan_keys("trending:entry:*").await?;
        for key in now_keys {
            let meta = self.kv.hgetall(&key).await?;
            let raw: f64 = meta.get("raw_score").and_then(|v| v.parse().ok()).unwrap_or(0.0);
            let last_updated: i64 = meta.get("last_updated").and_then(|v| v.parse().ok()).unwrap_or(now);
            if decay(raw, now - last_updated, self.half_life_minutes) < PRUNE_THRESHOLD {
                self.kv.del(&key).await?;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FakeKv;

    fn base_edit(title: &str) -> Edit {
        Edit {
            id: 1,
            kind: "edit".into(),
            title: title.into(),
            user: "alice".into(),
            bot: false,
            wiki: "enwiki".into(),
            server_url: "".into(),
            timestamp: 0,
            length_old: 0,
            length_new: 0,
            revision_old: 0,
            revision_new: 0,
            comment: "".into(),
            byte_change: 0,
            language: "en".into(),
        }
    }

    #[test]
    fn decay_is_half_at_one_half_life() {
        let d = decay(100.0, 30 * 60, 30.0);
        assert!((d - 50.0).abs() < 1e-9);
    }

    #[test]
    fn decay_never_negative_or_increasing() {
        assert_eq!(decay(0.0, 100, 10.0), 0.0);
        assert!(decay(10.0, 1000, 10.0) <= 10.0);
    }

    #[test]
    fn increment_composes_multipliers() {
        let mut e = base_edit("X");
        e.byte_change = 2000;
        e.bot = true;
        e.kind = "new".into();
        // 1.0 * 1.5 (big change) * 0.5 (bot) * 2.0 (new) = 1.5
        assert!((score_increment(&e) - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn lazy_decay_write_then_read() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let config = test_config();
        let scorer = TrendingScorer::new(kv, &config);

        // 100 increments of the plain "edit" multiplier (1.0 each) to get a
        // round raw score, matching the spec.md §8 scenario 4 shape.
        let edit = base_edit("P");
        for _ in 0..100 {
            scorer.record_edit(&edit, 0).await.unwrap();
        }
        let half_life_secs = (config.half_life_minutes * 60.0) as i64;

        let top = scorer.top_trending(10, half_life_secs).await.unwrap();
        assert_eq!(top.len(), 1);
        assert!((top[0].raw_score - 100.0).abs() < 1e-6);
        assert!((top[0].current_score - 50.0).abs() < 1.0);

        // A further increment after a half-life adds to the decayed raw.
        scorer.record_edit(&edit, half_life_secs).await.unwrap();
        let raw_after = scorer.top_trending(10, half_life_secs).await.unwrap()[0].raw_score;
        assert!((raw_after - 51.0).abs() < 1.0);
    }

    fn test_config() -> Config {
        use clap::Parser;
        let mut c = Config::parse_from(["wikisurge"]);
        c.half_life_minutes = 30.0;
        c.trending_max_pages = 100;
        c
    }

    #[tokio::test]
    async fn prune_removes_entries_below_threshold() {
        let kv = Arc::new(FakeKv::new());
        kv.zadd("trending:ranked", "enwiki:Tiny", 0.001).await.unwrap();
        kv.hset("trending:entry:enwiki:Tiny", "raw_score", "0.001").await.unwrap();
        kv.hset("trending:entry:enwiki:Tiny", "last_updated", "0").await.unwrap();

        let config = test_config();
        let scorer = TrendingScorer::new(kv.clone(), &config);
        let removed = scorer.prune(0).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(kv.zcard("trending:ranked").await.unwrap(), 0);
    }
}
