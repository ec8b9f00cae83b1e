//! Persistence for overrides, progress and favorites.
//!
//! Every call goes to the remote row store first. When the remote reports a
//! missing table (or none is configured) the call is served from the local
//! key-value store instead; any other failure is logged and read paths come
//! back empty. Nothing here returns an error to the caller.

mod remote;
mod session;

use std::cell::Cell;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{LocalStore, NS_FAVORITES, NS_OVERRIDES, NS_PROGRESS};
use crate::model::{FavoriteSet, OverrideMap, OverridePatch, ProgressMap, ProgressRecord};

pub(crate) use remote::{OverrideRow, PostgrestBackend, Unconfigured, UserDataRow};
pub(crate) use session::DeviceSession;

const IMAGE_BUCKET: &str = "images";

#[derive(Debug, Error)]
pub(crate) enum RemoteError {
    #[error("remote table is missing: {0}")]
    MissingTable(String),
    #[error("no remote store configured")]
    NotConfigured,
    #[error("remote request failed with HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("remote transport error: {0}")]
    Transport(String),
    #[error("remote response decode failed: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether the call should be served from local storage instead.
    pub(crate) fn is_missing_table(&self) -> bool {
        matches!(self, Self::MissingTable(_) | Self::NotConfigured)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum DataKind {
    Progress,
    Favorite,
}

impl DataKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Favorite => "favorite",
        }
    }
}

pub(crate) trait RemoteBackend {
    fn select_overrides(&self) -> Result<Vec<OverrideRow>, RemoteError>;
    fn select_override(&self, content_id: &str) -> Result<Option<OverrideRow>, RemoteError>;
    fn upsert_override(&self, row: &OverrideRow) -> Result<(), RemoteError>;
    fn select_user_data(&self, user_id: &str, kind: DataKind)
    -> Result<Vec<UserDataRow>, RemoteError>;
    fn upsert_user_data(&self, row: &UserDataRow) -> Result<(), RemoteError>;
    fn insert_user_data(&self, row: &UserDataRow) -> Result<(), RemoteError>;
    fn delete_user_data(
        &self,
        user_id: &str,
        content_id: &str,
        kind: DataKind,
    ) -> Result<(), RemoteError>;
    /// Stores a binary object and returns its public URL.
    fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, RemoteError>;
}

/// Receives play-head positions worth keeping.
pub(crate) trait ProgressSink {
    fn save_progress(&self, content_id: &str, position_secs: f64, episode_id: Option<&str>);
}

/// Result of the initial bulk load.
#[derive(Debug, Clone, Default)]
pub(crate) struct LoadedState {
    pub(crate) favorites: FavoriteSet,
    pub(crate) overrides: OverrideMap,
    pub(crate) progress: ProgressMap,
}

pub(crate) struct StoreAdapter {
    remote: Box<dyn RemoteBackend>,
    local: LocalStore,
    session: DeviceSession,
    fallback_warned: Cell<bool>,
}

impl StoreAdapter {
    pub(crate) fn new(
        remote: Box<dyn RemoteBackend>,
        local: LocalStore,
        session: DeviceSession,
    ) -> Self {
        Self {
            remote,
            local,
            session,
            fallback_warned: Cell::new(false),
        }
    }

    pub(crate) fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Favorites, overrides and progress have no ordering dependency; the
    /// catalog needs all three before it can be shown.
    pub(crate) fn load_all(&self) -> LoadedState {
        LoadedState {
            favorites: self.fetch_favorites(),
            overrides: self.fetch_overrides(),
            progress: self.fetch_progress(),
        }
    }

    pub(crate) fn fetch_overrides(&self) -> OverrideMap {
        match self.remote.select_overrides() {
            Ok(rows) => rows.into_iter().map(OverrideRow::into_patch).collect(),
            Err(err) if self.should_fall_back(&err) => self.read_local(NS_OVERRIDES),
            Err(err) => {
                tracing::error!(error = %err, "failed to fetch overrides");
                OverrideMap::new()
            }
        }
    }

    /// Merges `patch` over whatever is stored for `content_id` and writes the
    /// result. Fields absent from `patch` keep their stored values.
    pub(crate) fn save_override(&self, content_id: &str, patch: &OverridePatch) {
        let current = match self.remote.select_override(content_id) {
            Ok(current) => current,
            Err(err) if self.should_fall_back(&err) => {
                self.save_override_locally(content_id, patch);
                return;
            }
            Err(err) => {
                tracing::error!(content_id, error = %err, "failed to read override before save; edit dropped");
                return;
            }
        };

        let stored = current
            .map(|row| row.into_patch().1)
            .unwrap_or_default();
        let merged = stored.merged_with(patch.clone());
        let row = OverrideRow::from_patch(content_id, &merged, Utc::now().to_rfc3339());
        match self.remote.upsert_override(&row) {
            Ok(()) => tracing::debug!(content_id, "saved override"),
            Err(err) if self.should_fall_back(&err) => {
                self.save_override_locally(content_id, patch)
            }
            Err(err) => tracing::error!(content_id, error = %err, "failed to save override"),
        }
    }

    pub(crate) fn fetch_progress(&self) -> ProgressMap {
        match self
            .remote
            .select_user_data(self.session.device_id(), DataKind::Progress)
        {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| match serde_json::from_value::<ProgressRecord>(row.payload) {
                    Ok(record) => Some((row.content_id, record)),
                    Err(err) => {
                        tracing::warn!(content_id = %row.content_id, error = %err, "skipping unreadable progress row");
                        None
                    }
                })
                .collect(),
            Err(err) if self.should_fall_back(&err) => self.read_local(NS_PROGRESS),
            Err(err) => {
                tracing::error!(error = %err, "failed to fetch progress");
                ProgressMap::new()
            }
        }
    }

    /// Upserts the full progress record for `content_id`, stamped now.
    pub(crate) fn save_progress_record(
        &self,
        content_id: &str,
        position_secs: f64,
        episode_id: Option<&str>,
    ) {
        let record = ProgressRecord {
            position_secs,
            last_updated_ms: Utc::now().timestamp_millis(),
            episode_id: episode_id.map(str::to_string),
        };
        let payload = match serde_json::to_value(&record) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(content_id, error = %err, "failed to encode progress");
                return;
            }
        };
        let row = UserDataRow {
            user_id: self.session.device_id().to_string(),
            content_id: content_id.to_string(),
            data_type: DataKind::Progress,
            payload,
            updated_at: Some(Utc::now().to_rfc3339()),
        };

        match self.remote.upsert_user_data(&row) {
            Ok(()) => tracing::debug!(content_id, position_secs, "saved progress"),
            Err(err) if self.should_fall_back(&err) => {
                if let Some(mut progress) = self.read_local_for_update::<ProgressMap>(NS_PROGRESS) {
                    progress.insert(content_id.to_string(), record);
                    self.write_local(NS_PROGRESS, &progress);
                }
            }
            Err(err) => tracing::error!(content_id, error = %err, "failed to save progress"),
        }
    }

    pub(crate) fn fetch_favorites(&self) -> FavoriteSet {
        match self
            .remote
            .select_user_data(self.session.device_id(), DataKind::Favorite)
        {
            Ok(rows) => rows.into_iter().map(|row| row.content_id).collect(),
            Err(err) if self.should_fall_back(&err) => self.read_local(NS_FAVORITES),
            Err(err) => {
                tracing::error!(error = %err, "failed to fetch favorites");
                FavoriteSet::new()
            }
        }
    }

    /// Removes `content_id` from the favorites when present, adds it
    /// otherwise, and returns the resulting set regardless of whether the
    /// write reached the store.
    pub(crate) fn toggle_favorite(&self, content_id: &str, current: &FavoriteSet) -> FavoriteSet {
        let was_favorite = current.contains(content_id);
        let mut updated = current.clone();
        if was_favorite {
            updated.remove(content_id);
        } else {
            updated.insert(content_id.to_string());
        }

        let device_id = self.session.device_id();
        let result = if was_favorite {
            self.remote
                .delete_user_data(device_id, content_id, DataKind::Favorite)
        } else {
            self.remote.insert_user_data(&UserDataRow {
                user_id: device_id.to_string(),
                content_id: content_id.to_string(),
                data_type: DataKind::Favorite,
                payload: serde_json::json!({}),
                updated_at: Some(Utc::now().to_rfc3339()),
            })
        };

        match result {
            Ok(()) => {}
            Err(err) if self.should_fall_back(&err) => {
                self.toggle_favorite_locally(content_id, was_favorite)
            }
            Err(err) => {
                tracing::error!(content_id, error = %err, "failed to update favorite")
            }
        }
        updated
    }

    /// Uploads an image and returns its public URL, or `None` on failure.
    pub(crate) fn upload_image(&self, file_name: &str, bytes: &[u8]) -> Option<String> {
        let path = image_object_path(file_name, Utc::now().timestamp_millis());
        match self
            .remote
            .upload_object(IMAGE_BUCKET, &path, bytes, guess_image_type(file_name))
        {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::error!(file_name, error = %err, "image upload failed");
                None
            }
        }
    }

    fn should_fall_back(&self, err: &RemoteError) -> bool {
        if !err.is_missing_table() {
            return false;
        }
        if self.fallback_warned.replace(true) {
            return true;
        }
        match err {
            RemoteError::NotConfigured => tracing::debug!("using local storage"),
            _ => tracing::warn!(reason = %err, "remote tables unavailable; using local storage"),
        }
        true
    }

    fn save_override_locally(&self, content_id: &str, patch: &OverridePatch) {
        let Some(mut overrides) = self.read_local_for_update::<OverrideMap>(NS_OVERRIDES) else {
            return;
        };
        let merged = overrides
            .get(content_id)
            .cloned()
            .unwrap_or_default()
            .merged_with(patch.clone());
        overrides.insert(content_id.to_string(), merged);
        self.write_local(NS_OVERRIDES, &overrides);
    }

    /// Applies the toggle to the stored set rather than the caller's copy,
    /// which may have been read as empty.
    fn toggle_favorite_locally(&self, content_id: &str, was_favorite: bool) {
        let Some(mut stored) = self.read_local_for_update::<FavoriteSet>(NS_FAVORITES) else {
            return;
        };
        if was_favorite {
            stored.remove(content_id);
        } else {
            stored.insert(content_id.to_string());
        }
        self.write_local(NS_FAVORITES, &stored);
    }

    fn read_local<T: serde::de::DeserializeOwned + Default>(&self, namespace: &str) -> T {
        self.local.read_json(namespace).unwrap_or_else(|err| {
            tracing::error!(namespace, error = %format!("{err:#}"), "local fallback read failed");
            T::default()
        })
    }

    /// Current document for a read-modify-write. `None` when it cannot be
    /// read, in which case the write is skipped and the stored data kept.
    fn read_local_for_update<T: serde::de::DeserializeOwned + Default>(
        &self,
        namespace: &str,
    ) -> Option<T> {
        match self.local.read_json(namespace) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!(namespace, error = %format!("{err:#}"), "local document unreadable; write skipped");
                None
            }
        }
    }

    fn write_local<T: Serialize>(&self, namespace: &str, value: &T) {
        if let Err(err) = self.local.write_json(namespace, value) {
            tracing::error!(namespace, error = %err, "local fallback write failed");
        }
    }
}

impl ProgressSink for StoreAdapter {
    fn save_progress(&self, content_id: &str, position_secs: f64, episode_id: Option<&str>) {
        self.save_progress_record(content_id, position_secs, episode_id);
    }
}

pub(crate) fn image_object_path(file_name: &str, now_ms: i64) -> String {
    let sanitized: String = file_name
        .chars()
        .map(|ch| if ch.is_whitespace() { '_' } else { ch })
        .collect();
    format!("public/{now_ms}_{sanitized}")
}

fn guess_image_type(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    match lower.rsplit_once('.').map(|(_, ext)| ext) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
