// Per-device local profile: device id, username, ids handed out by the
// store, and per-room game snapshots. Persisted as JSON in the platform data
// directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::lobby::{normalize_name, NameError};
use crate::question::{AnswerLetter, Question};
use crate::store::TableStore;

const PROFILE_FILE: &str = "device.json";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("could not determine a data directory for this platform")]
    NoDataDir,

    #[error("failed to read profile {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write profile {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("profile {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    InvalidName(#[from] NameError),
}

// ---------------------------------------------------------------------------
// Stored data
// ---------------------------------------------------------------------------

/// In-progress state of one room's game on this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub answers: HashMap<String, AnswerLetter>,
    pub saved_at_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub player_id: Option<String>,
    /// Keyed by room code.
    #[serde(default)]
    pub snapshots: HashMap<String, GameSnapshot>,
}

// ---------------------------------------------------------------------------
// DeviceProfile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DeviceProfile {
    path: PathBuf,
    data: ProfileData,
}

impl DeviceProfile {
    /// `<platform data dir>/quizsync/device.json`.
    pub fn default_path() -> Result<PathBuf, DeviceError> {
        directories::ProjectDirs::from("", "", "quizsync")
            .map(|dirs| dirs.data_dir().join(PROFILE_FILE))
            .ok_or(DeviceError::NoDataDir)
    }

    /// Load the profile at `path`. A missing file is an empty profile.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, DeviceError> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "no device profile yet");
            return Ok(Self {
                path,
                data: ProfileData::default(),
            });
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| DeviceError::Read {
            path: path.clone(),
            source,
        })?;
        let data = serde_json::from_str(&raw).map_err(|source| DeviceError::Corrupt {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, data })
    }

    pub fn save(&self) -> Result<(), DeviceError> {
        let write_err = |source| DeviceError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(&self.data).map_err(|source| DeviceError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(write_err)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &ProfileData {
        &self.data
    }

    /// This device's stable id, generated and persisted on first use.
    pub fn device_id(&mut self) -> Result<String, DeviceError> {
        if let Some(id) = &self.data.device_id {
            return Ok(id.clone());
        }
        let id = Uuid::new_v4().to_string();
        self.data.device_id = Some(id.clone());
        self.save()?;
        info!(device_id = %id, "generated device id");
        Ok(id)
    }

    pub fn username(&self) -> Option<&str> {
        self.data.username.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.data.user_id.as_deref()
    }

    pub fn player_id(&self) -> Option<&str> {
        self.data.player_id.as_deref()
    }

    /// Remember which player row this device owns in its current room.
    pub fn set_player_id(&mut self, player_id: Option<String>) -> Result<(), DeviceError> {
        self.data.player_id = player_id;
        self.save()
    }

    pub fn snapshot(&self, room_code: &str) -> Option<&GameSnapshot> {
        self.data.snapshots.get(room_code)
    }

    pub fn save_snapshot(&mut self, room_code: &str, snapshot: GameSnapshot) -> Result<(), DeviceError> {
        self.data.snapshots.insert(room_code.to_string(), snapshot);
        self.save()
    }

    /// Drop a room's snapshot, e.g. once the player has finished it.
    pub fn clear_snapshot(&mut self, room_code: &str) -> Result<(), DeviceError> {
        if self.data.snapshots.remove(room_code).is_some() {
            self.save()?;
        }
        Ok(())
    }
}

/// Validate and store the player's chosen username, locally and in the
/// `users` table. A failed store write is logged and the name is still kept
/// on the device.
pub fn save_username(
    store: &dyn TableStore,
    profile: &mut DeviceProfile,
    raw: &str,
    now: DateTime<Utc>,
) -> Result<String, DeviceError> {
    let username = normalize_name(raw)?;
    let device_id = profile.device_id()?;

    match store.upsert_user(&device_id, &username, now) {
        Ok(user) => profile.data.user_id = Some(user.id),
        Err(e) => warn!(device_id = %device_id, "failed to save username to store: {e:#}"),
    }

    profile.data.username = Some(username.clone());
    profile.save()?;
    Ok(username)
}
