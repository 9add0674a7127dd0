use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use limitgate_application::CacheFailurePolicy;
use limitgate_core::AppError;
use tracing_subscriber::EnvFilter;

/// Redis connection settings for the limit cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisCacheConfig {
    pub host: String,
    pub port: u16,
    pub database: u32,
    pub password: Option<String>,
}

impl RedisCacheConfig {
    pub fn connection_url(&self) -> String {
        match self.password.as_deref() {
            Some(password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

/// Backend holding limit counters and lockout markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitCacheStoreConfig {
    File { path: PathBuf },
    Redis(RedisCacheConfig),
    Memory,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub frontend_url: String,
    pub api_host: String,
    pub api_port: u16,
    pub limit_cache_store: LimitCacheStoreConfig,
    pub limit_cache_prefix: String,
    pub limit_cache_failure_policy: CacheFailurePolicy,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        Self::from_lookup(migrate_only, |name| env::var(name).ok())
    }

    pub fn from_lookup(
        migrate_only: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let database_url = required_non_empty(&lookup, "DATABASE_URL")?;
        let frontend_url =
            lookup("FRONTEND_URL").unwrap_or_else(|| "http://localhost:3000".to_owned());

        let api_host = lookup("API_HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = lookup("API_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let limit_cache_store = parse_cache_store(&lookup)?;
        let limit_cache_prefix = lookup("LIMIT_CACHE_PREFIX")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "limits".to_owned());
        let limit_cache_failure_policy = lookup("LIMIT_CACHE_FAILURE_POLICY")
            .map(|value| CacheFailurePolicy::from_str(&value))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            migrate_only,
            database_url,
            frontend_url,
            api_host,
            api_port,
            limit_cache_store,
            limit_cache_prefix,
            limit_cache_failure_policy,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_cache_store(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<LimitCacheStoreConfig, AppError> {
    let kind = lookup("LIMIT_CACHE_STORE").unwrap_or_else(|| "file".to_owned());

    match kind.trim().to_ascii_lowercase().as_str() {
        "file" => Ok(LimitCacheStoreConfig::File {
            path: lookup("LIMIT_CACHE_FILE_PATH")
                .filter(|value| !value.trim().is_empty())
                .map_or_else(|| PathBuf::from("storage/limit-cache"), PathBuf::from),
        }),
        "redis" => {
            let client = lookup("LIMIT_CACHE_REDIS_CLIENT").unwrap_or_else(|| "redis".to_owned());
            if !client.trim().eq_ignore_ascii_case("redis") {
                return Err(AppError::Validation(format!(
                    "LIMIT_CACHE_REDIS_CLIENT only supports 'redis', got '{client}'"
                )));
            }

            Ok(LimitCacheStoreConfig::Redis(RedisCacheConfig {
                host: lookup("LIMIT_CACHE_REDIS_HOST").unwrap_or_else(|| "127.0.0.1".to_owned()),
                port: parse_number(lookup, "LIMIT_CACHE_REDIS_PORT", 6379)?,
                database: parse_number(lookup, "LIMIT_CACHE_REDIS_DATABASE", 0)?,
                password: lookup("LIMIT_CACHE_REDIS_PASSWORD")
                    .filter(|value| !value.is_empty()),
            }))
        }
        "memory" => Ok(LimitCacheStoreConfig::Memory),
        other => Err(AppError::Validation(format!(
            "LIMIT_CACHE_STORE must be 'file', 'redis' or 'memory', got '{other}'"
        ))),
    }
}

fn parse_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name).filter(|value| !value.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
        None => Ok(default),
    }
}

fn required_non_empty(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<String, AppError> {
    let value = lookup(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use limitgate_application::CacheFailurePolicy;

    use super::{ApiConfig, LimitCacheStoreConfig, RedisCacheConfig};

    fn load(pairs: &[(&str, &str)]) -> Result<ApiConfig, limitgate_core::AppError> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        ApiConfig::from_lookup(false, |name| values.get(name).cloned())
    }

    #[test]
    fn defaults_to_file_store_and_fail_open() {
        let Ok(config) = load(&[("DATABASE_URL", "postgres://localhost/limits")]) else {
            panic!("default configuration should load");
        };

        assert_eq!(
            config.limit_cache_store,
            LimitCacheStoreConfig::File {
                path: PathBuf::from("storage/limit-cache")
            }
        );
        assert_eq!(config.limit_cache_prefix, "limits");
        assert_eq!(config.limit_cache_failure_policy, CacheFailurePolicy::FailOpen);
        assert_eq!(config.api_port, 3001);
    }

    #[test]
    fn missing_database_url_is_rejected() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DATABASE_URL", "  ")]).is_err());
    }

    #[test]
    fn redis_store_reads_connection_settings() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/limits"),
            ("LIMIT_CACHE_STORE", "Redis"),
            ("LIMIT_CACHE_REDIS_HOST", "cache.internal"),
            ("LIMIT_CACHE_REDIS_PORT", "6380"),
            ("LIMIT_CACHE_REDIS_DATABASE", "2"),
            ("LIMIT_CACHE_REDIS_PASSWORD", "secret"),
            ("LIMIT_CACHE_FAILURE_POLICY", "closed"),
        ]);
        let Ok(config) = config else {
            panic!("redis configuration should load");
        };

        let expected = RedisCacheConfig {
            host: "cache.internal".to_owned(),
            port: 6380,
            database: 2,
            password: Some("secret".to_owned()),
        };
        assert_eq!(
            expected.connection_url(),
            "redis://:secret@cache.internal:6380/2"
        );
        assert_eq!(config.limit_cache_store, LimitCacheStoreConfig::Redis(expected));
        assert_eq!(
            config.limit_cache_failure_policy,
            CacheFailurePolicy::FailClosed
        );
    }

    #[test]
    fn unsupported_redis_client_is_rejected() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/limits"),
            ("LIMIT_CACHE_STORE", "redis"),
            ("LIMIT_CACHE_REDIS_CLIENT", "predis"),
        ]);
        assert!(config.is_err());
    }

    #[test]
    fn invalid_values_are_validation_errors() {
        assert!(
            load(&[
                ("DATABASE_URL", "postgres://localhost/limits"),
                ("LIMIT_CACHE_STORE", "memcached"),
            ])
            .is_err()
        );
        assert!(
            load(&[
                ("DATABASE_URL", "postgres://localhost/limits"),
                ("LIMIT_CACHE_STORE", "redis"),
                ("LIMIT_CACHE_REDIS_PORT", "not-a-port"),
            ])
            .is_err()
        );
        assert!(
            load(&[
                ("DATABASE_URL", "postgres://localhost/limits"),
                ("LIMIT_CACHE_FAILURE_POLICY", "sometimes"),
            ])
            .is_err()
        );
    }

    #[test]
    fn memory_store_is_selectable() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/limits"),
            ("LIMIT_CACHE_STORE", "memory"),
        ]);
        assert!(matches!(
            config.map(|config| config.limit_cache_store),
            Ok(LimitCacheStoreConfig::Memory)
        ));
    }
}
