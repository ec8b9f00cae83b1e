use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub(crate) const NS_OVERRIDES: &str = "cinetrack_overrides";
pub(crate) const NS_PROGRESS: &str = "cinetrack_progress";
pub(crate) const NS_FAVORITES: &str = "cinetrack_favorites";
pub(crate) const NS_DEVICE_ID: &str = "cinetrack_device_id";

/// On-device key-value store, one JSON document per namespace.
pub(crate) struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory().context("failed to open in-memory database")?,
        };
        store.migrate()?;
        Ok(store)
    }

    pub(crate) fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS local_kv (
                namespace TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub(crate) fn get_raw(&self, namespace: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM local_kv WHERE namespace = ?1",
                params![namespace],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read local namespace {namespace}"))?;
        Ok(value)
    }

    pub(crate) fn put_raw(&self, namespace: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                r#"
                INSERT INTO local_kv (namespace, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(namespace) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
                params![namespace, value, now],
            )
            .with_context(|| format!("failed to write local namespace {namespace}"))?;
        Ok(())
    }

    /// Reads a namespace as JSON. A missing namespace is the default value;
    /// a document that does not decode is an error and is left untouched.
    pub(crate) fn read_json<T: DeserializeOwned + Default>(&self, namespace: &str) -> Result<T> {
        let Some(raw) = self.get_raw(namespace)? else {
            return Ok(T::default());
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("unreadable document in local namespace {namespace}"))
    }

    pub(crate) fn write_json<T: Serialize>(&self, namespace: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("failed to encode local namespace {namespace}"))?;
        self.put_raw(namespace, &raw)
    }
}
