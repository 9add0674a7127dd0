use limitgate_core::AppError;

use crate::api_config::RedisCacheConfig;

pub fn build_redis_client(config: &RedisCacheConfig) -> Result<redis::Client, AppError> {
    redis::Client::open(config.connection_url()).map_err(|error| {
        AppError::Validation(format!("invalid limit cache redis settings: {error}"))
    })
}
