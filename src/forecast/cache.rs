//! Two-tier on-disk cache.
//!
//! * Response cache: one JSON record per (rounded coordinate, endpoint), valid
//!   for ten minutes and evicted lazily on the first read after expiry.
//! * Fallback snapshot: a single record holding the most recent successful
//!   current-weather payload from any coordinate.
//!
//! Every write goes to a temp file in the target directory and is renamed
//! into place, so a concurrent reader sees either the old or the new record.
//! Unreadable or malformed records are reported as absent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

use super::{Coordinate, Endpoint};
use crate::utils::parse_timestamp;

pub const RESPONSE_TTL_MINUTES: i64 = 10;
pub const FALLBACK_MAX_AGE_HOURS: i64 = 3;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("cache serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to replace cache record: {0}")]
    Persist(#[from] tempfile::PersistError),
}

#[derive(Debug, Serialize, Deserialize)]
struct ResponseRecord {
    cached_at: String,
    response: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    city: Option<String>,
    lat: f64,
    lon: f64,
    fetched_at: String,
    weather: Value,
}

/// The last current-weather payload the system saw, from whichever
/// coordinate produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSnapshot {
    pub city: Option<String>,
    pub coordinate: Coordinate,
    pub fetched_at: DateTime<Utc>,
    pub weather: Value,
}

impl FallbackSnapshot {
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age_at(now) <= max_age
    }
}

#[derive(Debug, Clone)]
pub struct TieredCache {
    response_dir: PathBuf,
    fallback_path: PathBuf,
}

impl TieredCache {
    pub fn new(response_dir: impl Into<PathBuf>, fallback_path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let response_dir = response_dir.into();
        let fallback_path = fallback_path.into();

        fs::create_dir_all(&response_dir)?;
        if let Some(parent) = fallback_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            response_dir,
            fallback_path,
        })
    }

    pub fn get_response(&self, coordinate: Coordinate, endpoint: Endpoint) -> Option<Value> {
        self.get_response_at(coordinate, endpoint, Utc::now())
    }

    pub fn put_response(&self, coordinate: Coordinate, endpoint: Endpoint, payload: &Value) -> Result<(), CacheError> {
        self.put_response_at(coordinate, endpoint, payload, Utc::now())
    }

    pub fn get_fallback_snapshot(&self) -> Option<FallbackSnapshot> {
        let record: SnapshotRecord = read_record(&self.fallback_path)?;
        let Some(fetched_at) = parse_timestamp(&record.fetched_at) else {
            tracing::warn!("Fallback snapshot has unparseable timestamp {:?}", record.fetched_at);
            return None;
        };

        Some(FallbackSnapshot {
            city: record.city,
            coordinate: Coordinate::new(record.lat, record.lon),
            fetched_at,
            weather: record.weather,
        })
    }

    pub fn put_fallback_snapshot(
        &self,
        city: Option<&str>,
        coordinate: Coordinate,
        payload: &Value,
    ) -> Result<(), CacheError> {
        let record = SnapshotRecord {
            city: city.map(str::to_string),
            lat: coordinate.lat,
            lon: coordinate.lon,
            fetched_at: Utc::now().to_rfc3339(),
            weather: payload.clone(),
        };
        write_atomic(&self.fallback_path, &record)
    }

    pub fn snapshot_is_fresh(&self, max_age: Duration) -> bool {
        self.get_fallback_snapshot()
            .is_some_and(|snapshot| snapshot.is_fresh_at(Utc::now(), max_age))
    }

    fn response_path(&self, coordinate: Coordinate, endpoint: Endpoint) -> PathBuf {
        self.response_dir
            .join(format!("{}.json", coordinate.cache_key(endpoint)))
    }

    fn get_response_at(&self, coordinate: Coordinate, endpoint: Endpoint, now: DateTime<Utc>) -> Option<Value> {
        let path = self.response_path(coordinate, endpoint);
        let record: ResponseRecord = read_record(&path)?;
        let cached_at = parse_timestamp(&record.cached_at)?;

        if now - cached_at <= Duration::minutes(RESPONSE_TTL_MINUTES) {
            tracing::debug!("Cache hit for {}", coordinate.cache_key(endpoint));
            return Some(record.response);
        }

        tracing::debug!("Evicting expired cache record {}", path.display());
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to evict {}: {}", path.display(), e);
            }
        }
        None
    }

    fn put_response_at(
        &self,
        coordinate: Coordinate,
        endpoint: Endpoint,
        payload: &Value,
        cached_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let record = ResponseRecord {
            cached_at: cached_at.to_rfc3339(),
            response: payload.clone(),
        };
        write_atomic(&self.response_path(coordinate, endpoint), &record)
    }
}

fn read_record<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("Unreadable cache record {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!("Malformed cache record {}: {}", path.display(), e);
            None
        }
    }
}

/// Serialize `value` next to `path` and rename it over the destination.
pub(crate) fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
