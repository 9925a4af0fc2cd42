use clap::Parser;
use std::time::Duration;

/// Process configuration. Every field recognised by spec.md §6 is a CLI
/// flag with a matching environment variable override (`clap`'s `env`
/// feature), following the flag-plus-env-override convention
/// `wiki-otel-bridge` uses for its `--streams`/`--base-url` pair.
#[derive(Parser, Debug, Clone)]
#[command(name = "wikisurge", about = "Wikipedia recent-change streaming intelligence pipeline")]
pub struct Config {
    // ── Ingestor ──────────────────────────────────────────────
    #[arg(long, env = "WIKISURGE_SSE_URL", default_value = "https://stream.wikimedia.org/v2/stream/recentchange")]
    pub sse_url: String,

    #[arg(long, env = "WIKISURGE_EXCLUDE_BOTS", default_value_t = false)]
    pub exclude_bots: bool,

    /// Comma-separated two-letter language codes; empty = allow all.
    #[arg(long, env = "WIKISURGE_ALLOWED_LANGUAGES", default_value = "")]
    pub allowed_languages: String,

    #[arg(long, env = "WIKISURGE_RATE_LIMIT", default_value_t = 500.0)]
    pub rate_limit: f64,

    #[arg(long, env = "WIKISURGE_BURST_LIMIT", default_value_t = 100)]
    pub burst_limit: u64,

    #[arg(long, env = "WIKISURGE_RECONNECT_DELAY_SECS", default_value_t = 1)]
    pub reconnect_delay_secs: u64,

    #[arg(long, env = "WIKISURGE_METRICS_PORT", default_value_t = 9898)]
    pub metrics_port: u16,

    // ── Log ───────────────────────────────────────────────────
    #[arg(long, env = "WIKISURGE_KAFKA_BROKERS", default_value = "localhost:9092")]
    pub kafka_brokers: String,

    #[arg(long, env = "WIKISURGE_KAFKA_TOPIC", default_value = "wikipedia.edits")]
    pub kafka_topic: String,

    #[arg(long, env = "WIKISURGE_KAFKA_GROUP_ID", default_value = "wikisurge-processor")]
    pub kafka_group_id: String,

    #[arg(long, env = "WIKISURGE_KAFKA_PARTITIONS", default_value_t = 3)]
    pub kafka_partitions: u32,

    // ── KV store ──────────────────────────────────────────────
    #[arg(long, env = "WIKISURGE_REDIS_URL", default_value = "redis://127.0.0.1:6379/")]
    pub redis_url: String,

    // ── Hot pages ─────────────────────────────────────────────
    #[arg(long, env = "WIKISURGE_MAX_TRACKED", default_value_t = 10_000)]
    pub max_tracked: u64,

    #[arg(long, env = "WIKISURGE_HOT_THRESHOLD", default_value_t = 5)]
    pub hot_threshold: u64,

    #[arg(long, env = "WIKISURGE_WINDOW_DURATION_SECS", default_value_t = 3600)]
    pub window_duration_secs: i64,

    #[arg(long, env = "WIKISURGE_MAX_MEMBERS_PER_PAGE", default_value_t = 500)]
    pub max_members_per_page: isize,

    #[arg(long, env = "WIKISURGE_MAX_HOT_PAGES", default_value_t = 1_000)]
    pub max_hot_pages: u64,

    #[arg(long, env = "WIKISURGE_HOT_CLEANUP_INTERVAL_SECS", default_value_t = 300)]
    pub hot_cleanup_interval_secs: u64,

    // ── Trending ──────────────────────────────────────────────
    #[arg(long, env = "WIKISURGE_TRENDING_ENABLED", default_value_t = true)]
    pub trending_enabled: bool,

    #[arg(long, env = "WIKISURGE_TRENDING_MAX_PAGES", default_value_t = 5_000)]
    pub trending_max_pages: isize,

    #[arg(long, env = "WIKISURGE_HALF_LIFE_MINUTES", default_value_t = 30.0)]
    pub half_life_minutes: f64,

    #[arg(long, env = "WIKISURGE_TRENDING_PRUNE_INTERVAL_SECS", default_value_t = 120)]
    pub trending_prune_interval_secs: u64,

    // ── Spike detector ────────────────────────────────────────
    #[arg(long, env = "WIKISURGE_SPIKE_SHORT_WINDOW_MIN", default_value_t = 5)]
    pub spike_short_window_min: i64,

    #[arg(long, env = "WIKISURGE_SPIKE_LONG_WINDOW_MIN", default_value_t = 60)]
    pub spike_long_window_min: i64,

    #[arg(long, env = "WIKISURGE_SPIKE_MIN_EDITS_SHORT", default_value_t = 3)]
    pub spike_min_edits_short: u32,

    #[arg(long, env = "WIKISURGE_SPIKE_MIN_RATIO", default_value_t = 2.0)]
    pub spike_min_ratio: f64,

    #[arg(long, env = "WIKISURGE_SPIKE_COOLDOWN_SECS", default_value_t = 600)]
    pub spike_cooldown_secs: i64,

    // ── Indexing ──────────────────────────────────────────────
    /// Comma-separated `{wiki}:{title}` pairs always indexed (spec.md §4.7
    /// rule 1).
    #[arg(long, env = "WIKISURGE_WATCHLIST", default_value = "")]
    pub watchlist: String,

    #[arg(long, env = "WIKISURGE_TRENDING_TOP_N", default_value_t = 50)]
    pub trending_top_n: u64,

    #[arg(long, env = "WIKISURGE_INDEX_SPIKE_RATIO_MIN", default_value_t = 2.0)]
    pub index_spike_ratio_min: f64,

    #[arg(long, env = "WIKISURGE_EDIT_WAR_ENABLED", default_value_t = true)]
    pub edit_war_enabled: bool,

    #[arg(long, env = "WIKISURGE_RETENTION_DAYS", default_value_t = 30)]
    pub retention_days: i64,

    #[arg(long, env = "WIKISURGE_INDEX_BASE_URL", default_value = "http://127.0.0.1:9200")]
    pub index_base_url: String,

    #[arg(long, env = "WIKISURGE_BULK_SIZE", default_value_t = 500)]
    pub bulk_size: usize,

    #[arg(long, env = "WIKISURGE_FLUSH_INTERVAL_SECS", default_value_t = 5)]
    pub flush_interval_secs: u64,

    // ── Logging ───────────────────────────────────────────────
    #[arg(long, env = "WIKISURGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn allowed_languages(&self) -> Vec<String> {
        self.allowed_languages
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn window_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_duration_secs)
    }

    pub fn watchlist(&self) -> std::collections::HashSet<String> {
        self.watchlist
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
