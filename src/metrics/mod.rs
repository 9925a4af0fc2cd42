pub mod latency;
pub mod percentiles;
pub mod prometheus;

pub use latency::LatencyCollector;
pub use percentiles::PercentileSet;
