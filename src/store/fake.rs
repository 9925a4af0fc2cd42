use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::kv::{KvResult, KvStore};

/// In-memory stand-in for `KvStore`, used by unit/integration tests so the
/// processor's business logic can be exercised without a live Redis. TTLs
/// are recorded but not actively expired — tests that care about expiry
/// assert on the recorded TTL value directly rather than waiting on it.
#[derive(Default)]
pub struct FakeKv {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    zsets: HashMap<String, Vec<(String, f64)>>,
    streams: HashMap<String, Vec<(u64, HashMap<String, String>)>>,
    lists: HashMap<String, Vec<String>>,
    ttls: HashMap<String, i64>,
    next_stream_id: u64,
}

impl FakeKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(zset: &mut [(String, f64)]) {
        zset.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
    }

    /// Test helper: read a list (`editwar:changes:*`) directly.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.inner.lock().lists.get(key).cloned().unwrap_or_default()
    }

    /// Test helper: read a recorded TTL directly.
    pub fn recorded_ttl(&self, key: &str) -> Option<i64> {
        self.inner.lock().ttls.get(key).copied()
    }
}

#[async_trait]
impl KvStore for FakeKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        Ok(self.inner.lock().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> KvResult<()> {
        self.inner.lock().strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: i64) -> KvResult<()> {
        let mut g = self.inner.lock();
        g.strings.insert(key.to_string(), value.to_string());
        g.ttls.insert(key.to_string(), ttl_secs);
        Ok(())
    }

    async fn incr(&self, key: &str) -> KvResult<i64> {
        let mut g = self.inner.lock();
        let entry = g.strings.entry(key.to_string()).or_insert_with(|| "0".to_string());
        let v: i64 = entry.parse().unwrap_or(0) + 1;
        *entry = v.to_string();
        Ok(v)
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> KvResult<()> {
        self.inner.lock().ttls.insert(key.to_string(), ttl_secs);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> KvResult<Option<i64>> {
        Ok(self.inner.lock().ttls.get(key).copied())
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        let mut g = self.inner.lock();
        g.strings.remove(key);
        g.hashes.remove(key);
        g.zsets.remove(key);
        g.streams.remove(key);
        g.lists.remove(key);
        g.ttls.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        let g = self.inner.lock();
        Ok(g.strings.contains_key(key)
            || g.hashes.contains_key(key)
            || g.zsets.contains_key(key)
            || g.lists.contains_key(key))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> KvResult<()> {
        self.inner
            .lock()
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> KvResult<bool> {
        let mut g = self.inner.lock();
        let map = g.hashes.entry(key.to_string()).or_default();
        if map.contains_key(field) {
            Ok(false)
        } else {
            map.insert(field.to_string(), value.to_string());
            Ok(true)
        }
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> KvResult<i64> {
        let mut g = self.inner.lock();
        let map = g.hashes.entry(key.to_string()).or_default();
        let entry = map.entry(field.to_string()).or_insert_with(|| "0".to_string());
        let v: i64 = entry.parse().unwrap_or(0) + delta;
        *entry = v.to_string();
        Ok(v)
    }

    async fn hget(&self, key: &str, field: &str) -> KvResult<Option<String>> {
        Ok(self.inner.lock().hashes.get(key).and_then(|m| m.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, String>> {
        Ok(self.inner.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hlen(&self, key: &str) -> KvResult<i64> {
        Ok(self.inner.lock().hashes.get(key).map(|m| m.len() as i64).unwrap_or(0))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> KvResult<()> {
        let mut g = self.inner.lock();
        let z = g.zsets.entry(key.to_string()).or_default();
        if let Some(existing) = z.iter_mut().find(|(m, _)| m == member) {
            existing.1 = score;
        } else {
            z.push((member.to_string(), score));
        }
        Self::sorted(z);
        Ok(())
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> KvResult<Vec<String>> {
        let g = self.inner.lock();
        Ok(g.zsets
            .get(key)
            .map(|z| z.iter().filter(|(_, s)| *s >= min && *s <= max).map(|(m, _)| m.clone()).collect())
            .unwrap_or_default())
    }

    async fn zcard(&self, key: &str) -> KvResult<i64> {
        Ok(self.inner.lock().zsets.get(key).map(|z| z.len() as i64).unwrap_or(0))
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> KvResult<i64> {
        let g = self.inner.lock();
        Ok(g.zsets
            .get(key)
            .map(|z| z.iter().filter(|(_, s)| *s >= min && *s <= max).count() as i64)
            .unwrap_or(0))
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> KvResult<i64> {
        let mut g = self.inner.lock();
        if let Some(z) = g.zsets.get_mut(key) {
            let before = z.len();
            z.retain(|(_, s)| !(*s >= min && *s <= max));
            Ok((before - z.len()) as i64)
        } else {
            Ok(0)
        }
    }

    async fn zremrangebyrank_lowest(&self, key: &str, count: isize) -> KvResult<i64> {
        let mut g = self.inner.lock();
        if let Some(z) = g.zsets.get_mut(key) {
            let n = count.max(0) as usize;
            let removed = n.min(z.len());
            z.drain(0..removed);
            Ok(removed as i64)
        } else {
            Ok(0)
        }
    }

    async fn zscore(&self, key: &str, member: &str) -> KvResult<Option<f64>> {
        let g = self.inner.lock();
        Ok(g.zsets.get(key).and_then(|z| z.iter().find(|(m, _)| m == member).map(|(_, s)| *s)))
    }

    async fn zrevrank(&self, key: &str, member: &str) -> KvResult<Option<i64>> {
        let g = self.inner.lock();
        Ok(g.zsets.get(key).and_then(|z| {
            let mut sorted = z.clone();
            sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
            sorted.iter().position(|(m, _)| m == member).map(|p| p as i64)
        }))
    }

    async fn zrevrange_withscores(&self, key: &str, start: isize, stop: isize) -> KvResult<Vec<(String, f64)>> {
        let g = self.inner.lock();
        let Some(z) = g.zsets.get(key) else { return Ok(Vec::new()) };
        let mut sorted = z.clone();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        let len = sorted.len() as isize;
        let start = start.max(0) as usize;
        let stop = if stop < 0 { (len + stop).max(-1) } else { stop.min(len - 1) } as usize;
        if start as isize > stop as isize || start >= sorted.len() {
            return Ok(Vec::new());
        }
        Ok(sorted[start..=stop.min(sorted.len() - 1)].to_vec())
    }

    async fn zrem(&self, key: &str, member: &str) -> KvResult<()> {
        let mut g = self.inner.lock();
        if let Some(z) = g.zsets.get_mut(key) {
            z.retain(|(m, _)| m != member);
        }
        Ok(())
    }

    async fn xadd(&self, key: &str, fields: &[(&str, String)]) -> KvResult<String> {
        let mut g = self.inner.lock();
        g.next_stream_id += 1;
        let id = g.next_stream_id;
        let map: HashMap<String, String> = fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        g.streams.entry(key.to_string()).or_default().push((id, map));
        Ok(format!("{id}-0"))
    }

    async fn xlen(&self, key: &str) -> KvResult<i64> {
        Ok(self.inner.lock().streams.get(key).map(|s| s.len() as i64).unwrap_or(0))
    }

    async fn xtrim_maxlen(&self, key: &str, maxlen: usize) -> KvResult<()> {
        let mut g = self.inner.lock();
        if let Some(s) = g.streams.get_mut(key) {
            if s.len() > maxlen {
                let drop_n = s.len() - maxlen;
                s.drain(0..drop_n);
            }
        }
        Ok(())
    }

    async fn xrevrange(&self, key: &str, count: usize) -> KvResult<Vec<(String, HashMap<String, String>)>> {
        let g = self.inner.lock();
        Ok(g.streams
            .get(key)
            .map(|s| {
                s.iter()
                    .rev()
                    .take(count)
                    .map(|(id, m)| (format!("{id}-0"), m.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> KvResult<Vec<String>> {
        let g = self.inner.lock();
        let Some(list) = g.lists.get(key) else { return Ok(Vec::new()) };
        let len = list.len() as isize;
        if len == 0 {
            return Ok(Vec::new());
        }
        let start = start.max(0).min(len - 1) as usize;
        let stop = if stop < 0 { (len + stop).max(0) } else { stop.min(len - 1) } as usize;
        if start as isize > stop as isize {
            return Ok(Vec::new());
        }
        Ok(list[start..=stop].to_vec())
    }

    async fn scan_keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        let prefix = pattern.trim_end_matches('*');
        let g = self.inner.lock();
        let mut keys: Vec<String> = g.strings.keys().cloned().collect();
        keys.extend(g.hashes.keys().cloned());
        keys.extend(g.zsets.keys().cloned());
        keys.extend(g.lists.keys().cloned());
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

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
    ) -> KvResult<i64> {
        self.zadd(window_key, member, score).await?;
        self.zremrangebyscore(window_key, f64::MIN, (now - window_duration_secs) as f64).await?;

        let card = self.zcard(window_key).await?;
        if card > max_members as i64 {
            self.zremrangebyrank_lowest(window_key, (card - max_members as i64) as isize).await?;
        }

        self.hincrby(meta_key, "edit_count", 1).await?;
        self.hset(meta_key, "last_edit", &now.to_string()).await?;
        self.hset(meta_key, "last_byte_change", &byte_change.to_string()).await?;
        self.hsetnx(meta_key, &format!("editor:{editor}"), &now.to_string()).await?;
        self.expire(window_key, ttl_secs).await?;
        self.expire(meta_key, ttl_secs).await?;

        self.zcard(window_key).await
    }

    async fn trending_apply_increment(
        &self,
        entry_key: &str,
        ranked_set_key: &str,
        page_key: &str,
        now: i64,
        half_life_minutes: f64,
        increment: f64,
    ) -> KvResult<f64> {
        let existing = self.hgetall(entry_key).await?;
        let raw_score: f64 = existing.get("raw_score").and_then(|v| v.parse().ok()).unwrap_or(0.0);
        let last_updated: i64 = existing.get("last_updated").and_then(|v| v.parse().ok()).unwrap_or(now);

        let decayed = crate::processor::trending::decay(raw_score, now - last_updated, half_life_minutes);
        let new_raw = decayed + increment;

        self.hset(entry_key, "raw_score", &new_raw.to_string()).await?;
        self.hset(entry_key, "last_updated", &now.to_string()).await?;
        self.zadd(ranked_set_key, page_key, new_raw).await?;

        Ok(new_raw)
    }

    async fn editwar_record(
        &self,
        editors_key: &str,
        changes_key: &str,
        editor: &str,
        byte_change: i64,
        max_changes: usize,
        editor_ttl_secs: i64,
    ) -> KvResult<()> {
        self.hincrby(editors_key, editor, 1).await?;
        self.expire(editors_key, editor_ttl_secs).await?;

        let mut g = self.inner.lock();
        let list = g.lists.entry(changes_key.to_string()).or_default();
        list.insert(0, byte_change.to_string());
        list.truncate(max_changes);
        g.ttls.insert(changes_key.to_string(), editor_ttl_secs);
        Ok(())
    }
}
