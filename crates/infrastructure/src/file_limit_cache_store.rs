//! File-backed limit cache store.
//!
//! Each store owns a subdirectory named after the SHA-256 of its key prefix,
//! and each key is a small JSON document named after the SHA-256 of the key.
//! Read-modify-write sequences are serialized by an in-process lock, so
//! counters are exact for a single node sharing the directory. Expired
//! documents read as absent and are removed when found.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use limitgate_application::LimitCacheStore;
use limitgate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::warn;

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct FileCacheEntry {
    value: i64,
    expires_at: i64,
}

impl FileCacheEntry {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// File implementation of the limit cache store port.
pub struct FileLimitCacheStore {
    directory: PathBuf,
    write_lock: Mutex<()>,
    staging_sequence: AtomicU64,
}

impl FileLimitCacheStore {
    /// Creates a store under a directory, creating its prefix subdirectory
    /// when missing.
    pub async fn open(directory: impl Into<PathBuf>, key_prefix: impl AsRef<str>) -> AppResult<Self> {
        let directory = directory
            .into()
            .join(hex::encode(Sha256::digest(key_prefix.as_ref().as_bytes())));
        tokio::fs::create_dir_all(&directory).await.map_err(|error| {
            AppError::Unavailable(format!(
                "failed to create limit cache directory '{}': {error}",
                directory.display()
            ))
        })?;

        Ok(Self {
            directory,
            write_lock: Mutex::new(()),
            staging_sequence: AtomicU64::new(0),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.directory
            .join(format!("{}.{ENTRY_EXTENSION}", hex::encode(digest)))
    }

    /// Reads a live entry. Callers must hold the write lock.
    async fn read_live(&self, path: &Path) -> AppResult<Option<FileCacheEntry>> {
        match read_entry(path).await? {
            Some(entry) if entry.is_live(Utc::now().timestamp()) => Ok(Some(entry)),
            Some(_) => {
                remove_if_present(path).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn write_entry(&self, path: &Path, entry: FileCacheEntry) -> AppResult<()> {
        let payload = serde_json::to_vec(&entry).map_err(|error| {
            AppError::Internal(format!("failed to encode limit cache entry: {error}"))
        })?;

        let sequence = self.staging_sequence.fetch_add(1, Ordering::Relaxed);
        let staging = path.with_extension(format!("{}.{sequence}.tmp", std::process::id()));
        tokio::fs::write(&staging, payload).await.map_err(|error| {
            AppError::Unavailable(format!("failed to write limit cache entry: {error}"))
        })?;
        if let Err(error) = tokio::fs::rename(&staging, path).await {
            let _ = remove_if_present(&staging).await;
            return Err(AppError::Unavailable(format!(
                "failed to store limit cache entry: {error}"
            )));
        }
        Ok(())
    }
}

async fn read_entry(path: &Path) -> AppResult<Option<FileCacheEntry>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(AppError::Unavailable(format!(
                "failed to read limit cache entry: {error}"
            )));
        }
    };

    let entry = match serde_json::from_slice::<FileCacheEntry>(&bytes) {
        Ok(entry) => entry,
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring unreadable limit cache entry");
            return Ok(None);
        }
    };

    Ok(Some(entry))
}

#[async_trait]
impl LimitCacheStore for FileLimitCacheStore {
    async fn get(&self, key: &str) -> AppResult<Option<i64>> {
        let path = self.path_for(key);
        match read_entry(&path).await? {
            Some(entry) if entry.is_live(Utc::now().timestamp()) => Ok(Some(entry.value)),
            Some(_) => {
                let _guard = self.write_lock.lock().await;
                Ok(self.read_live(&path).await?.map(|entry| entry.value))
            }
            None => Ok(None),
        }
    }

    async fn add(&self, key: &str, value: i64, ttl_seconds: u64) -> AppResult<bool> {
        let path = self.path_for(key);
        let _guard = self.write_lock.lock().await;

        if self.read_live(&path).await?.is_some() {
            return Ok(false);
        }

        let entry = FileCacheEntry {
            value,
            expires_at: expires_at(ttl_seconds),
        };
        self.write_entry(&path, entry).await?;
        Ok(true)
    }

    async fn increment(&self, key: &str, ttl_seconds: u64) -> AppResult<i64> {
        let path = self.path_for(key);
        let _guard = self.write_lock.lock().await;

        let entry = match self.read_live(&path).await? {
            Some(entry) => FileCacheEntry {
                value: entry.value + 1,
                expires_at: entry.expires_at,
            },
            None => FileCacheEntry {
                value: 1,
                expires_at: expires_at(ttl_seconds),
            },
        };

        self.write_entry(&path, entry).await?;
        Ok(entry.value)
    }

    async fn forget(&self, key: &str) -> AppResult<bool> {
        let path = self.path_for(key);
        let _guard = self.write_lock.lock().await;
        remove_if_present(&path).await
    }

    async fn flush(&self) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = tokio::fs::read_dir(&self.directory).await.map_err(|error| {
            AppError::Unavailable(format!("failed to list limit cache directory: {error}"))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|error| {
            AppError::Unavailable(format!("failed to list limit cache directory: {error}"))
        })? {
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|extension| extension == ENTRY_EXTENSION)
            {
                remove_if_present(&path).await?;
            }
        }

        Ok(())
    }
}

fn expires_at(ttl_seconds: u64) -> i64 {
    Utc::now()
        .timestamp()
        .saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX))
}

async fn remove_if_present(path: &Path) -> AppResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(AppError::Unavailable(format!(
            "failed to remove limit cache entry: {error}"
        ))),
    }
}
