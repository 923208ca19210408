// docvault-core/src/stores/redis/mod.rs
// Redis-backed CachePort and ScanQueuePort. Both connect through a single
// `redis::aio::ConnectionManager`, which reconnects transparently on its
// own, rather than hand-rolling a connection pool the way the teacher's
// deadpool-based Postgres store does for its driver.

pub mod cache;
pub mod scan_queue;

pub use cache::RedisCache;
pub use scan_queue::RedisScanQueue;
