use std::sync::Arc;

use limitgate_application::{
    LimitCacheStore, LimitDirectory, LimitEventPublisher, LimitRepository,
};
use limitgate_core::AppResult;
use limitgate_infrastructure::{
    FileLimitCacheStore, InMemoryLimitCacheStore, PostgresLimitDirectory,
    PostgresLimitRepository, RedisLimitCacheStore, TracingLimitEventPublisher,
};
use sqlx::PgPool;
use tracing::info;

use crate::api_config::{ApiConfig, LimitCacheStoreConfig};
use crate::state::AppState;

use super::redis::build_redis_client;

pub async fn build_app_state(pool: PgPool, config: &ApiConfig) -> AppResult<AppState> {
    let repository: Arc<dyn LimitRepository> = Arc::new(PostgresLimitRepository::new(pool.clone()));
    let directory: Arc<dyn LimitDirectory> = Arc::new(PostgresLimitDirectory::new(pool));
    let cache = build_limit_cache_store(config).await?;
    let events: Arc<dyn LimitEventPublisher> = Arc::new(TracingLimitEventPublisher::new());

    Ok(AppState::new(
        repository,
        directory,
        cache,
        events,
        config.limit_cache_failure_policy,
    ))
}

async fn build_limit_cache_store(config: &ApiConfig) -> AppResult<Arc<dyn LimitCacheStore>> {
    let prefix = config.limit_cache_prefix.as_str();

    match &config.limit_cache_store {
        LimitCacheStoreConfig::File { path } => {
            info!(path = %path.display(), "using file limit cache store");
            Ok(Arc::new(FileLimitCacheStore::open(path.clone(), prefix).await?))
        }
        LimitCacheStoreConfig::Redis(redis_config) => {
            info!(host = %redis_config.host, port = redis_config.port, "using redis limit cache store");
            let client = build_redis_client(redis_config)?;
            Ok(Arc::new(RedisLimitCacheStore::new(client, prefix)))
        }
        LimitCacheStoreConfig::Memory => {
            info!("using in-memory limit cache store");
            Ok(Arc::new(InMemoryLimitCacheStore::new()))
        }
    }
}
