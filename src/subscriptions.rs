use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

use crate::forecast::cache::{write_atomic, CacheError};
use crate::forecast::Coordinate;

pub type UserId = i64;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("subscription store write failed: {0}")]
    Write(#[from] CacheError),
    #[error("subscription store I/O failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredLocation {
    pub lat: f64,
    pub lon: f64,
}

/// One user's preferences as persisted in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub location: Option<StoredLocation>,
    #[serde(default)]
    pub notifications: bool,
    #[serde(default)]
    pub waiting_for_extended: bool,
}

impl UserRecord {
    pub fn coordinate(&self) -> Option<Coordinate> {
        self.location.map(|l| Coordinate::new(l.lat, l.lon))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserSubscription {
    pub id: UserId,
    pub coordinate: Option<Coordinate>,
    pub notifications_enabled: bool,
}

pub trait SubscriptionStore: Send + Sync {
    fn get(&self, id: UserId) -> Option<UserRecord>;
    fn put(&self, id: UserId, record: UserRecord) -> Result<(), StoreError>;
    fn list(&self) -> Vec<(UserId, UserRecord)>;

    /// Create a default record on first interaction.
    fn ensure_user(&self, id: UserId) -> Result<UserRecord, StoreError> {
        if let Some(record) = self.get(id) {
            return Ok(record);
        }
        let record = UserRecord::default();
        self.put(id, record.clone())?;
        Ok(record)
    }

    fn set_location(&self, id: UserId, coordinate: Coordinate) -> Result<UserRecord, StoreError> {
        let mut record = self.get(id).unwrap_or_default();
        record.location = Some(StoredLocation {
            lat: coordinate.lat,
            lon: coordinate.lon,
        });
        self.put(id, record.clone())?;
        Ok(record)
    }

    /// Flip the notification flag and return the new value.
    fn toggle_notifications(&self, id: UserId) -> Result<bool, StoreError> {
        let mut record = self.get(id).unwrap_or_default();
        record.notifications = !record.notifications;
        let enabled = record.notifications;
        self.put(id, record)?;
        Ok(enabled)
    }

    fn set_waiting_for_extended(&self, id: UserId, waiting: bool) -> Result<(), StoreError> {
        let mut record = self.get(id).unwrap_or_default();
        record.waiting_for_extended = waiting;
        self.put(id, record)
    }

    /// Users with notifications on and a stored location, in id order.
    fn subscribers(&self) -> Vec<UserSubscription> {
        self.list()
            .into_iter()
            .filter(|(_, record)| record.notifications)
            .filter_map(|(id, record)| {
                record.coordinate().map(|coordinate| UserSubscription {
                    id,
                    coordinate: Some(coordinate),
                    notifications_enabled: true,
                })
            })
            .collect()
    }
}

/// Flat JSON file keyed by decimal user id, loaded once and rewritten whole on
/// every change.
pub struct JsonSubscriptionStore {
    path: PathBuf,
    users: RwLock<BTreeMap<UserId, UserRecord>>,
}

impl JsonSubscriptionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let users = load_users(&path);
        tracing::info!("Loaded {} bot users from {}", users.len(), path.display());

        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }
}

fn load_users(path: &Path) -> BTreeMap<UserId, UserRecord> {
    let raw: BTreeMap<String, UserRecord> = match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Ignoring malformed user store {}: {}", path.display(), e);
                return BTreeMap::new();
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            tracing::warn!("Cannot read user store {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };

    raw.into_iter()
        .filter_map(|(key, record)| match key.parse::<UserId>() {
            Ok(id) => Some((id, record)),
            Err(_) => {
                tracing::warn!("Skipping user record with non-numeric id {:?}", key);
                None
            }
        })
        .collect()
}

impl SubscriptionStore for JsonSubscriptionStore {
    fn get(&self, id: UserId) -> Option<UserRecord> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users.get(&id).cloned()
    }

    fn put(&self, id: UserId, record: UserRecord) -> Result<(), StoreError> {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        users.insert(id, record);

        let on_disk: BTreeMap<String, &UserRecord> =
            users.iter().map(|(id, record)| (id.to_string(), record)).collect();
        write_atomic(&self.path, &on_disk)?;
        Ok(())
    }

    fn list(&self) -> Vec<(UserId, UserRecord)> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users.iter().map(|(id, record)| (*id, record.clone())).collect()
    }
}

// In-memory store for tests
#[cfg(test)]
#[derive(Default)]
pub struct MockSubscriptionStore {
    users: RwLock<BTreeMap<UserId, UserRecord>>,
}

#[cfg(test)]
impl MockSubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl SubscriptionStore for MockSubscriptionStore {
    fn get(&self, id: UserId) -> Option<UserRecord> {
        self.users.read().unwrap().get(&id).cloned()
    }

    fn put(&self, id: UserId, record: UserRecord) -> Result<(), StoreError> {
        self.users.write().unwrap().insert(id, record);
        Ok(())
    }

    fn list(&self) -> Vec<(UserId, UserRecord)> {
        self.users
            .read()
            .unwrap()
            .iter()
            .map(|(id, record)| (*id, record.clone()))
            .collect()
    }
}
