use std::sync::Arc;

use tracing::instrument;

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::alert::{spike_severity, AlertKind, AlertPayload, AlertRecord, SpikePayload};
use crate::models::Edit;
use crate::store::KvStore;

/// Ring-buffer length: long window fits in 60 one-minute buckets (spec.md
/// §9 Open Question, resolved in SPEC_FULL.md §3).
const HISTORY_LEN: i64 = 60;
/// Floor substituted for a zero baseline so `R_s / max(R_l, eps)` never
/// divides by zero (spec.md §4.5).
const EPSILON: f64 = 0.1;

pub struct SpikeDetector {
    kv: Arc<dyn KvStore>,
    short_window_min: i64,
    long_window_min: i64,
    min_edits_in_short: u32,
    min_spike_ratio: f64,
    cooldown_secs: i64,
}

impl SpikeDetector {
    pub fn new(kv: Arc<dyn KvStore>, config: &Config) -> Self {
        Self {
            kv,
            short_window_min: config.spike_short_window_min,
            long_window_min: config.spike_long_window_min,
            min_edits_in_short: config.spike_min_edits_short,
            min_spike_ratio: config.spike_min_ratio,
            cooldown_secs: config.spike_cooldown_secs,
        }
    }

    fn hist_key(page_key: &str) -> String {
        format!("spike:hist:{page_key}")
    }
    fn cooldown_key(page_key: &str) -> String {
        format!("spike:cooldown:{page_key}")
    }

    /// Loads the ring buffer, advances it to `minute`, bumps the current
    /// minute's bucket, and writes it back. Returns the (now up to date)
    /// buckets indexed by `minute % HISTORY_LEN`.
    async fn bump_bucket(&self, page_key: &str, minute: i64) -> Result<Vec<u32>, PipelineError> {
        let key = Self::hist_key(page_key);
        let existing = self.kv.hgetall(&key).await?;

        let mut buckets: Vec<u32> = existing
            .get("buckets")
            .map(|csv| csv.split(',').map(|v| v.parse().unwrap_or(0)).collect())
            .filter(|v: &Vec<u32>| v.len() as i64 == HISTORY_LEN)
            .unwrap_or_else(|| vec![0; HISTORY_LEN as usize]);
        let last_minute: i64 = existing.get("last_minute").and_then(|v| v.parse().ok()).unwrap_or(minute);

        let elapsed = minute - last_minute;
        if elapsed >= HISTORY_LEN {
            buckets.iter_mut().for_each(|b| *b = 0);
        } else {
            for m in (last_minute + 1)..=minute {
                buckets[(m.rem_euclid(HISTORY_LEN)) as usize] = 0;
            }
        }
        buckets[(minute.rem_euclid(HISTORY_LEN)) as usize] += 1;

        let csv = buckets.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(",");
        self.kv.hset(&key, "buckets", &csv).await?;
        self.kv.hset(&key, "last_minute", &minute.to_string()).await?;

        Ok(buckets)
    }

    /// Sums buckets over `[minute - from_offset, minute - to_offset]`
    /// inclusive (offsets are minutes-before-now; `from_offset >= to_offset`).
    fn sum_range(buckets: &[u32], minute: i64, from_offset: i64, to_offset: i64) -> u32 {
        let mut total = 0u32;
        let mut m = minute - from_offset;
        let end = minute - to_offset;
        while m <= end {
            total += buckets[(m.rem_euclid(HISTORY_LEN)) as usize];
            m += 1;
        }
        total
    }

    /// Feeds one edit into the per-minute bucket and evaluates the spike
    /// decision (spec.md §4.5). Returns `Some(alert)` only when a new spike
    /// is recognised (cooldown not active).
    #[instrument(skip(self, edit), fields(page = %edit.page_key()))]
    pub async fn record_edit(&self, edit: &Edit, now: i64) -> Result<Option<AlertRecord>, PipelineError> {
        let page_key = edit.page_key();
        let minute = now / 60;
        let buckets = self.bump_bucket(&page_key, minute).await?;

        let r_s = Self::sum_range(&buckets, minute, self.short_window_min - 1, 0) as f64;

        let long_excl_minutes = (self.long_window_min - self.short_window_min).max(1);
        let long_excl_sum = Self::sum_range(&buckets, minute, self.long_window_min - 1, self.short_window_min) as f64;
        let r_l = (long_excl_sum / long_excl_minutes as f64) * self.short_window_min as f64;

        let ratio = r_s / r_l.max(EPSILON);

        if (r_s as u32) < self.min_edits_in_short || ratio < self.min_spike_ratio {
            return Ok(None);
        }

        if self.kv.exists(&Self::cooldown_key(&page_key)).await? {
            return Ok(None);
        }

        self.kv.set_ex(&Self::cooldown_key(&page_key), &ratio.to_string(), self.cooldown_secs).await?;

        let severity = spike_severity(ratio);
        let alert = AlertRecord {
            id: now as u64,
            kind: AlertKind::Spike,
            timestamp: now,
            payload: AlertPayload::Spike(SpikePayload {
                page: edit.title.clone(),
                wiki: edit.wiki.clone(),
                ratio,
                edit_count: r_s as u32,
                severity,
                timestamp: now,
            }),
        };
        crate::alerts::publish(&*self.kv, &alert).await?;
        Ok(Some(alert))
    }

    /// Ratio of the most recent spike still inside its cooldown window, used
    /// by the indexing strategy's `spiking_{ratio}` rule (spec.md §4.7).
    /// `None` once the cooldown has lapsed.
    pub async fn last_ratio(&self, page_key: &str) -> Result<Option<f64>, PipelineError> {
        Ok(self.kv.get(&Self::cooldown_key(page_key)).await?.and_then(|v| v.parse().ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FakeKv;
    use clap::Parser;

    fn config() -> Config {
        let mut c = Config::parse_from(["wikisurge"]);
        c.spike_short_window_min = 5;
        c.spike_long_window_min = 60;
        c.spike_min_edits_short = 3;
        c.spike_min_ratio = 2.0;
        c.spike_cooldown_secs = 600;
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

    // Scenario 5 (spec.md §8): baseline 1 edit/15min for an hour, then 20
    // edits within 5 minutes.
    #[tokio::test]
    async fn detects_spike_after_baseline() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let detector = SpikeDetector::new(kv, &config());
        let e = edit("X");

        // Baseline: one edit every 15 minutes for the last hour (4 edits),
        // far enough in the past to sit outside the short window.
        for i in 0..4 {
            let ts = i * 15 * 60;
            detector.record_edit(&e, ts).await.unwrap();
        }

        // Spike: 20 edits inside a 5-minute window, well after baseline.
        let spike_start = 3600;
        let mut last = None;
        for i in 0..20 {
            let ts = spike_start + i * 15; // 20 edits over 5 minutes
            last = detector.record_edit(&e, ts).await.unwrap().or(last);
        }

        let alert = last.expect("expected a spike alert");
        match alert.payload {
            AlertPayload::Spike(p) => {
                assert!(p.ratio >= 2.0);
            }
            _ => panic!("wrong payload"),
        }
    }

    #[tokio::test]
    async fn below_min_edits_never_spikes() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let detector = SpikeDetector::new(kv, &config());
        let e = edit("Y");

        // Only 2 edits in the short window — below min_edits_in_short (3).
        assert!(detector.record_edit(&e, 0).await.unwrap().is_none());
        assert!(detector.record_edit(&e, 60).await.unwrap().is_none());
    }
}
