use anyhow::{Context, Result};
use uuid::Uuid;

use crate::db::{LocalStore, NS_DEVICE_ID};

/// Stable identity of this device, the owner of every progress and favorite
/// row. Generated once, persisted locally, then reused on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeviceSession {
    device_id: String,
}

impl DeviceSession {
    pub(crate) fn load_or_create(local: &LocalStore) -> Result<Self> {
        if let Some(existing) = local.get_raw(NS_DEVICE_ID)?
            && !existing.trim().is_empty()
        {
            return Ok(Self {
                device_id: existing.trim().to_string(),
            });
        }

        let device_id = Uuid::new_v4().to_string();
        local
            .put_raw(NS_DEVICE_ID, &device_id)
            .context("failed to persist device id")?;
        tracing::debug!(%device_id, "generated new device id");
        Ok(Self { device_id })
    }

    #[cfg(test)]
    pub(crate) fn fixed(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
        }
    }

    pub(crate) fn device_id(&self) -> &str {
        &self.device_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_once_and_reuses() {
        let local = LocalStore::open_in_memory().expect("open store");
        let first = DeviceSession::load_or_create(&local).expect("create session");
        let second = DeviceSession::load_or_create(&local).expect("reload session");
        assert_eq!(first, second);
        assert_eq!(first.device_id().len(), 36);
    }

    #[test]
    fn survives_reopening_the_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cinetrack.db");

        let first = {
            let local = LocalStore::open(&path).expect("open");
            local.migrate().expect("migrate");
            DeviceSession::load_or_create(&local).expect("create session")
        };
        let local = LocalStore::open(&path).expect("reopen");
        local.migrate().expect("migrate");
        let second = DeviceSession::load_or_create(&local).expect("reload session");
        assert_eq!(first.device_id(), second.device_id());
    }

    #[test]
    fn blank_stored_id_is_replaced() {
        let local = LocalStore::open_in_memory().expect("open store");
        local.put_raw(NS_DEVICE_ID, "  ").expect("write");
        let session = DeviceSession::load_or_create(&local).expect("create session");
        assert!(!session.device_id().trim().is_empty());
        assert_eq!(
            local.get_raw(NS_DEVICE_ID).expect("read").as_deref(),
            Some(session.device_id())
        );
    }
}
