//! Profile and credential persistence.
//!
//! The engine only sees the [`ProfileStore`] trait and the authentication step
//! only sees [`CredentialStore`]. [`JsonStore`] keeps one JSON file per user
//! under the data directory; [`MemoryStore`] backs tests.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

const MAX_USERNAME_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username {0:?} is not allowed")]
    InvalidUsername(String),
    #[error("username {0} is already taken")]
    DuplicateUser(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store unavailable")]
    Unavailable,
}

/// Persisted progression of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub username: String,
    pub level: u32,
    #[serde(rename = "currentEXP")]
    pub current_exp: u32,
    #[serde(rename = "requiredEXPForNextLevel", default)]
    pub required_exp_for_next_level: u32,
}

impl Profile {
    /// A fresh level 1 profile.
    pub fn new(username: &str, required_exp: u32) -> Self {
        Self {
            username: username.to_string(),
            level: 1,
            current_exp: 0,
            required_exp_for_next_level: required_exp,
        }
    }
}

pub trait ProfileStore: Send + Sync {
    /// Returns `None` when the player has never been saved.
    fn load_profile(&self, username: &str) -> Result<Option<Profile>, StoreError>;
    fn save_profile(&self, profile: &Profile) -> Result<(), StoreError>;
}

pub trait CredentialStore: Send + Sync {
    /// Stored password for `username`, or `None` for unknown users.
    fn password_for(&self, username: &str) -> Result<Option<String>, StoreError>;
    /// Fails with [`StoreError::DuplicateUser`] if the name is taken.
    fn register(&self, username: &str, password: &str) -> Result<(), StoreError>;
}

/// Usernames become file names, so only a conservative alphabet is accepted.
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Serialize, Deserialize)]
struct UserRecord {
    username: String,
    password: String,
}

/// File-backed store: `<data>/players/<name>.json` and `<data>/users/<name>.json`.
pub struct JsonStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir.join("players"))?;
        std::fs::create_dir_all(data_dir.join("users"))?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, kind: &str, username: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_username(username) {
            return Err(StoreError::InvalidUsername(username.to_string()));
        }
        Ok(self.data_dir.join(kind).join(format!("{}.json", username)))
    }

    fn read_record<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
    ) -> Result<Option<T>, StoreError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_record<T: Serialize>(&self, path: &Path, record: &T) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(record)?;
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Unavailable)?;

        // Write-then-rename so readers never observe a half-written file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

impl ProfileStore for JsonStore {
    fn load_profile(&self, username: &str) -> Result<Option<Profile>, StoreError> {
        let path = self.record_path("players", username)?;
        self.read_record(&path)
    }

    fn save_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let path = self.record_path("players", &profile.username)?;
        self.write_record(&path, profile)
    }
}

impl CredentialStore for JsonStore {
    fn password_for(&self, username: &str) -> Result<Option<String>, StoreError> {
        let path = self.record_path("users", username)?;
        Ok(self.read_record::<UserRecord>(&path)?.map(|r| r.password))
    }

    fn register(&self, username: &str, password: &str) -> Result<(), StoreError> {
        let path = self.record_path("users", username)?;
        if path.exists() {
            return Err(StoreError::DuplicateUser(username.to_string()));
        }
        self.write_record(
            &path,
            &UserRecord {
                username: username.to_string(),
                password: password.to_string(),
            },
        )
    }
}

/// In-memory store. Saves can be made to fail to exercise error paths.
#[derive(Default)]
pub struct MemoryStore {
    profiles: Mutex<HashMap<String, Profile>>,
    users: Mutex<HashMap<String, String>>,
    fail_saves: AtomicBool,
    saves: Mutex<Vec<Profile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, profile: Profile) -> Self {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(profile.username.clone(), profile);
        }
        self
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Every profile written so far, oldest first.
    pub fn saved_profiles(&self) -> Vec<Profile> {
        self.saves.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn profile(&self, username: &str) -> Option<Profile> {
        self.profiles
            .lock()
            .ok()
            .and_then(|p| p.get(username).cloned())
    }
}

impl ProfileStore for MemoryStore {
    fn load_profile(&self, username: &str) -> Result<Option<Profile>, StoreError> {
        let profiles = self.profiles.lock().map_err(|_| StoreError::Unavailable)?;
        Ok(profiles.get(username).cloned())
    }

    fn save_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        self.profiles
            .lock()
            .map_err(|_| StoreError::Unavailable)?
            .insert(profile.username.clone(), profile.clone());
        self.saves
            .lock()
            .map_err(|_| StoreError::Unavailable)?
            .push(profile.clone());
        Ok(())
    }
}

impl CredentialStore for MemoryStore {
    fn password_for(&self, username: &str) -> Result<Option<String>, StoreError> {
        let users = self.users.lock().map_err(|_| StoreError::Unavailable)?;
        Ok(users.get(username).cloned())
    }

    fn register(&self, username: &str, password: &str) -> Result<(), StoreError> {
        if !is_valid_username(username) {
            return Err(StoreError::InvalidUsername(username.to_string()));
        }
        let mut users = self.users.lock().map_err(|_| StoreError::Unavailable)?;
        if users.contains_key(username) {
            return Err(StoreError::DuplicateUser(username.to_string()));
        }
        users.insert(username.to_string(), password.to_string());
        Ok(())
    }
}
