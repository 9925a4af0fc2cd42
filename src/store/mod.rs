pub mod fake;
pub mod kv;
pub mod redis_kv;

pub use fake::FakeKv;
pub use kv::KvStore;
pub use redis_kv::RedisKv;
