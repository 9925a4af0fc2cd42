use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::PipelineError;

pub type KvResult<T> = Result<T, PipelineError>;

/// Everything the processor, hot-page tracker, trending scorer, spike
/// detector, and edit-war detector need from the shared KV store
/// (spec.md §6 "KV store (stateful)"). Kept as a trait so production code
/// runs against `RedisKv` (a thin wrapper over
/// `redis::aio::ConnectionManager`) and tests run against `FakeKv`, an
/// in-memory double that implements the same contract.
///
/// Compound, multi-command updates that spec.md calls out as "one atomic
/// batch" (hot-page window touch, trending write, edit-war tracking) are
/// their own trait methods rather than being composed client-side from the
/// primitives below, so the Redis implementation can issue them as a single
/// pipeline (spec.md §5 "KV state mutations are issued as server-side
/// pipelines wherever a compound update is defined").
#[async_trait]
pub trait KvStore: Send + Sync {
    // ── Scalar ────────────────────────────────────────────────
    async fn get(&self, key: &str) -> KvResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> KvResult<()>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: i64) -> KvResult<()>;
    /// Atomic increment; returns the post-increment value.
    async fn incr(&self, key: &str) -> KvResult<i64>;
    async fn expire(&self, key: &str, ttl_secs: i64) -> KvResult<()>;
    /// Seconds remaining, or `None` if the key has no TTL, or `-2` semantics
    /// collapse to `None` if the key doesn't exist.
    async fn ttl(&self, key: &str) -> KvResult<Option<i64>>;
    async fn del(&self, key: &str) -> KvResult<()>;
    async fn exists(&self, key: &str) -> KvResult<bool>;

    // ── Hash ──────────────────────────────────────────────────
    async fn hset(&self, key: &str, field: &str, value: &str) -> KvResult<()>;
    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> KvResult<bool>;
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> KvResult<i64>;
    async fn hget(&self, key: &str, field: &str) -> KvResult<Option<String>>;
    async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, String>>;
    async fn hlen(&self, key: &str) -> KvResult<i64>;

    // ── Sorted set ────────────────────────────────────────────
    async fn zadd(&self, key: &str, member: &str, score: f64) -> KvResult<()>;
    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> KvResult<Vec<String>>;
    async fn zcard(&self, key: &str) -> KvResult<i64>;
    async fn zcount(&self, key: &str, min: f64, max: f64) -> KvResult<i64>;
    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> KvResult<i64>;
    /// Remove the lowest-ranked `count` members (rank 0..count-1).
    async fn zremrangebyrank_lowest(&self, key: &str, count: isize) -> KvResult<i64>;
    async fn zscore(&self, key: &str, member: &str) -> KvResult<Option<f64>>;
    async fn zrevrank(&self, key: &str, member: &str) -> KvResult<Option<i64>>;
    async fn zrevrange_withscores(&self, key: &str, start: isize, stop: isize) -> KvResult<Vec<(String, f64)>>;
    async fn zrem(&self, key: &str, member: &str) -> KvResult<()>;

    // ── Stream ────────────────────────────────────────────────
    async fn xadd(&self, key: &str, fields: &[(&str, String)]) -> KvResult<String>;
    async fn xlen(&self, key: &str) -> KvResult<i64>;
    async fn xtrim_maxlen(&self, key: &str, maxlen: usize) -> KvResult<()>;
    async fn xrevrange(&self, key: &str, count: usize) -> KvResult<Vec<(String, HashMap<String, String>)>>;

    // ── List ──────────────────────────────────────────────────
    /// Read back the capped signed-byte-change list the edit-war detector
    /// maintains via `editwar_record` (newest-first, as LPUSH'd).
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> KvResult<Vec<String>>;

    // ── Key scan ──────────────────────────────────────────────
    async fn scan_keys(&self, pattern: &str) -> KvResult<Vec<String>>;

    // ── Compound, component-specific batches ─────────────────
    /// Append `(now_ns, edit_id)` to the window, evict entries older than
    /// `window_duration_secs`, cap cardinality at `max_members`, bump
    /// metadata counters, record the editor, and refresh both TTLs — all in
    /// one round trip. Returns the window cardinality after eviction.
    #[allow(clippy::too_many_arguments)]
    async fn hot_page_touch(
        &self,
        window_key: &str,
        meta_key: &str,
        member: &str,
        score: f64,
        now: i64,
        window_duration_secs: i64,
        max_members: isize,
        editor: &str,
        byte_change: i64,
        ttl_secs: i64,
    ) -> KvResult<i64>;

    /// Read-decay-add-write the trending raw score for one page, updating
    /// the global ranked set in the same round trip. Returns the new raw
    /// score.
    async fn trending_apply_increment(
        &self,
        entry_key: &str,
        ranked_set_key: &str,
        page_key: &str,
        now: i64,
        half_life_minutes: f64,
        increment: f64,
    ) -> KvResult<f64>;

    /// Increment the editor's participation count (10-min TTL refresh) and
    /// prepend the signed byte change to the capped changes list, in one
    /// round trip.
    async fn editwar_record(
        &self,
        editors_key: &str,
        changes_key: &str,
        editor: &str,
        byte_change: i64,
        max_changes: usize,
        editor_ttl_secs: i64,
    ) -> KvResult<()>;
}
