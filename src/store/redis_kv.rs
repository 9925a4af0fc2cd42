use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::kv::{KvResult, KvStore};

/// `KvStore` backed by `redis::aio::ConnectionManager`, cheaply cloneable
/// and auto-reconnecting. Every clone shares the same underlying
/// multiplexed connection, so `RedisKv` is itself cheap to clone and hand
/// to every task.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
}

impl RedisKv {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        Ok(self.conn().get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> KvResult<()> {
        Ok(self.conn().set(key, value).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: i64) -> KvResult<()> {
        Ok(self.conn().set_ex(key, value, ttl_secs.max(1) as u64).await?)
    }

    async fn incr(&self, key: &str) -> KvResult<i64> {
        Ok(self.conn().incr(key, 1).await?)
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> KvResult<()> {
        let _: bool = self.conn().expire(key, ttl_secs.max(0)).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> KvResult<Option<i64>> {
        let ttl: i64 = self.conn().ttl(key).await?;
        Ok(if ttl < 0 { None } else { Some(ttl) })
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        Ok(self.conn().del(key).await?)
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        Ok(self.conn().exists(key).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> KvResult<()> {
        Ok(self.conn().hset(key, field, value).await?)
    }

    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> KvResult<bool> {
        Ok(self.conn().hset_nx(key, field, value).await?)
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> KvResult<i64> {
        Ok(self.conn().hincr(key, field, delta).await?)
    }

    async fn hget(&self, key: &str, field: &str) -> KvResult<Option<String>> {
        Ok(self.conn().hget(key, field).await?)
    }

    async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, String>> {
        Ok(self.conn().hgetall(key).await?)
    }

    async fn hlen(&self, key: &str) -> KvResult<i64> {
        Ok(self.conn().hlen(key).await?)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> KvResult<()> {
        let _: f64 = self.conn().zadd(key, member, score).await?;
        Ok(())
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> KvResult<Vec<String>> {
        Ok(self.conn().zrangebyscore(key, min, max).await?)
    }

    async fn zcard(&self, key: &str) -> KvResult<i64> {
        Ok(self.conn().zcard(key).await?)
    }

    async fn zcount(&self, key: &str, min: f64, max: f64) -> KvResult<i64> {
        Ok(self.conn().zcount(key, min, max).await?)
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> KvResult<i64> {
        Ok(self.conn().zrembyscore(key, min, max).await?)
    }

    async fn zremrangebyrank_lowest(&self, key: &str, count: isize) -> KvResult<i64> {
        if count <= 0 {
            return Ok(0);
        }
        Ok(self.conn().zremrangebyrank(key, 0, count - 1).await?)
    }

    async fn zscore(&self, key: &str, member: &str) -> KvResult<Option<f64>> {
        Ok(self.conn().zscore(key, member).await?)
    }

    async fn zrevrank(&self, key: &str, member: &str) -> KvResult<Option<i64>> {
        Ok(self.conn().zrevrank(key, member).await?)
    }

    async fn zrevrange_withscores(&self, key: &str, start: isize, stop: isize) -> KvResult<Vec<(String, f64)>> {
        Ok(self.conn().zrevrange_withscores(key, start, stop).await?)
    }

    async fn zrem(&self, key: &str, member: &str) -> KvResult<()> {
        Ok(self.conn().zrem(key, member).await?)
    }

    async fn xadd(&self, key: &str, fields: &[(&str, String)]) -> KvResult<String> {
        let items: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        Ok(self.conn().xadd(key, "*", &items).await?)
    }

    async fn xlen(&self, key: &str) -> KvResult<i64> {
        Ok(self.conn().xlen(key).await?)
    }

    async fn xtrim_maxlen(&self, key: &str, maxlen: usize) -> KvResult<()> {
        use redis::streams::StreamMaxlen;
        let _: i64 = self.conn().xtrim(key, StreamMaxlen::Approx(maxlen)).await?;
        Ok(())
    }

    async fn xrevrange(&self, key: &str, count: usize) -> KvResult<Vec<(String, HashMap<String, String>)>> {
        use redis::streams::StreamRangeReply;
        let reply: StreamRangeReply = self.conn().xrevrange_count(key, "+", "-", count).await?;
        Ok(reply
            .ids
            .into_iter()
            .map(|id| {
                let mut map = HashMap::new();
                for (k, v) in id.map {
                    if let redis::Value::BulkString(bytes) = v {
                        map.insert(k, String::from_utf8_lossy(&bytes).to_string());
                    }
                }
                (id.id, map)
            })
            .collect())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> KvResult<Vec<String>> {
        Ok(self.conn().lrange(key, start, stop).await?)
    }

    async fn scan_keys(&self, pattern: &str) -> KvResult<Vec<String>> {
        let mut conn = self.conn();
        let mut cursor = 0u64;
        let mut out = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await?;
            out.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(out)
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
        let mut conn = self.conn();
        let floor = (now - window_duration_secs) as f64;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("ZADD").arg(window_key).arg(score).arg(member).ignore();
        pipe.cmd("ZREMRANGEBYSCORE").arg(window_key).arg("-inf").arg(floor).ignore();
        pipe.cmd("HINCRBY").arg(meta_key).arg("edit_count").arg(1).ignore();
        pipe.cmd("HSET").arg(meta_key).arg("last_edit").arg(now).ignore();
        pipe.cmd("HSET").arg(meta_key).arg("last_byte_change").arg(byte_change).ignore();
        pipe.cmd("HSETNX").arg(meta_key).arg(format!("editor:{editor}")).arg(now).ignore();
        pipe.cmd("EXPIRE").arg(window_key).arg(ttl_secs).ignore();
        pipe.cmd("EXPIRE").arg(meta_key).arg(ttl_secs).ignore();
        pipe.cmd("ZCARD").arg(window_key);

        let (card,): (i64,) = pipe.query_async(&mut conn).await?;

        if card > max_members as i64 {
            let overflow = card - max_members as i64;
            let _: i64 = conn.zremrangebyrank(window_key, 0, overflow - 1).await?;
        }

        Ok(card.min(max_members as i64))
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
        let mut conn = self.conn();
        let existing: HashMap<String, String> = conn.hgetall(entry_key).await?;

        let raw_score: f64 = existing.get("raw_score").and_then(|v| v.parse().ok()).unwrap_or(0.0);
        let last_updated: i64 = existing.get("last_updated").and_then(|v| v.parse().ok()).unwrap_or(now);

        let decayed = crate::processor::trending::decay(raw_score, now - last_updated, half_life_minutes);
        let new_raw = decayed + increment;

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("HSET").arg(entry_key).arg("raw_score").arg(new_raw).ignore();
        pipe.cmd("HSET").arg(entry_key).arg("last_updated").arg(now).ignore();
        pipe.cmd("ZADD").arg(ranked_set_key).arg(new_raw).arg(page_key).ignore();
        let _: () = pipe.query_async(&mut conn).await?;

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
        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("HINCRBY").arg(editors_key).arg(editor).arg(1).ignore();
        pipe.cmd("EXPIRE").arg(editors_key).arg(editor_ttl_secs).ignore();
        pipe.cmd("LPUSH").arg(changes_key).arg(byte_change).ignore();
        pipe.cmd("LTRIM").arg(changes_key).arg(0).arg(max_changes as isize - 1).ignore();
        pipe.cmd("EXPIRE").arg(changes_key).arg(editor_ttl_secs).ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
