//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod file_limit_cache_store;
mod in_memory_limit_cache_store;
mod in_memory_limit_directory;
mod in_memory_limit_repository;
mod postgres_limit_directory;
mod postgres_limit_repository;
mod redis_limit_cache_store;
mod tracing_limit_event_publisher;

pub use file_limit_cache_store::FileLimitCacheStore;
pub use in_memory_limit_cache_store::InMemoryLimitCacheStore;
pub use in_memory_limit_directory::InMemoryLimitDirectory;
pub use in_memory_limit_repository::InMemoryLimitRepository;
pub use postgres_limit_directory::PostgresLimitDirectory;
pub use postgres_limit_repository::PostgresLimitRepository;
pub use redis_limit_cache_store::RedisLimitCacheStore;
pub use tracing_limit_event_publisher::TracingLimitEventPublisher;
