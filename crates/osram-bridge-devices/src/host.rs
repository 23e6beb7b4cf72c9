//! Accessory host contract.
//!
//! The host is whatever publishes accessories to the home automation side
//! and remembers them across restarts. The bridge only needs four calls.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;
use uuid::Uuid;

use osram_bridge_core::{Error, Result};
use osram_bridge_storage::AccessoryStore;

use crate::accessory::AccessoryRecord;

/// Host that publishes and caches accessories.
pub trait AccessoryHost: Send {
    /// Accessories cached by a previous run.
    fn cached_accessories(&mut self) -> Result<Vec<AccessoryRecord>>;

    /// Publish a new accessory.
    fn register_accessory(&mut self, accessory: &AccessoryRecord) -> Result<()>;

    /// Push changes of an already published accessory.
    fn update_accessory(&mut self, accessory: &AccessoryRecord) -> Result<()>;

    /// Withdraw an accessory. Returns false if it was unknown.
    fn unregister_accessory(&mut self, uuid: &Uuid) -> Result<bool>;
}

/// In-memory host, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryHost {
    accessories: BTreeMap<Uuid, AccessoryRecord>,
    registrations: usize,
    updates: usize,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host that already caches the given records.
    pub fn with_cached(records: impl IntoIterator<Item = AccessoryRecord>) -> Self {
        Self {
            accessories: records.into_iter().map(|r| (r.uuid, r)).collect(),
            ..Self::default()
        }
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&AccessoryRecord> {
        self.accessories.get(uuid)
    }

    pub fn len(&self) -> usize {
        self.accessories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessories.is_empty()
    }

    /// Number of register calls received.
    pub fn registrations(&self) -> usize {
        self.registrations
    }

    /// Number of update calls received.
    pub fn updates(&self) -> usize {
        self.updates
    }
}

impl AccessoryHost for MemoryHost {
    fn cached_accessories(&mut self) -> Result<Vec<AccessoryRecord>> {
        Ok(self.accessories.values().cloned().collect())
    }

    fn register_accessory(&mut self, accessory: &AccessoryRecord) -> Result<()> {
        if self.accessories.contains_key(&accessory.uuid) {
            return Err(Error::Host(format!(
                "Accessory {} is already registered",
                accessory.uuid
            )));
        }
        self.registrations += 1;
        self.accessories.insert(accessory.uuid, accessory.clone());
        Ok(())
    }

    fn update_accessory(&mut self, accessory: &AccessoryRecord) -> Result<()> {
        match self.accessories.get_mut(&accessory.uuid) {
            Some(existing) => {
                self.updates += 1;
                *existing = accessory.clone();
                Ok(())
            }
            None => Err(Error::Host(format!("Unknown accessory {}", accessory.uuid))),
        }
    }

    fn unregister_accessory(&mut self, uuid: &Uuid) -> Result<bool> {
        Ok(self.accessories.remove(uuid).is_some())
    }
}

/// Host backed by the persistent accessory cache.
pub struct StoredHost {
    store: AccessoryStore,
}

impl StoredHost {
    pub fn new(store: AccessoryStore) -> Self {
        Self { store }
    }

    /// Open (or create) the cache database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = AccessoryStore::open(path.as_ref()).map_err(|e| {
            Error::Host(format!(
                "Failed to open accessory cache {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &AccessoryStore {
        &self.store
    }

    fn save(&self, accessory: &AccessoryRecord) -> Result<()> {
        self.store
            .save(&accessory.uuid.to_string(), accessory)
            .map_err(|e| Error::Host(e.to_string()))
    }
}

impl AccessoryHost for StoredHost {
    fn cached_accessories(&mut self) -> Result<Vec<AccessoryRecord>> {
        let records: Vec<AccessoryRecord> = self.store.list().map_err(|e| Error::Host(e.to_string()))?;
        debug!("Loaded {} cached accessories", records.len());
        Ok(records)
    }

    fn register_accessory(&mut self, accessory: &AccessoryRecord) -> Result<()> {
        self.save(accessory)
    }

    fn update_accessory(&mut self, accessory: &AccessoryRecord) -> Result<()> {
        self.save(accessory)
    }

    fn unregister_accessory(&mut self, uuid: &Uuid) -> Result<bool> {
        self.store
            .remove(&uuid.to_string())
            .map_err(|e| Error::Host(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DeviceDescriptor;

    fn record(name: &str, address: &str) -> AccessoryRecord {
        let mut record = AccessoryRecord::new(&DeviceDescriptor::new(name, address));
        record.configure();
        record
    }

    #[test]
    fn test_memory_host_register_twice_fails() {
        let mut host = MemoryHost::new();
        let record = record("remote1", "0x1");
        host.register_accessory(&record).unwrap();
        assert!(matches!(host.register_accessory(&record), Err(Error::Host(_))));
        assert_eq!(host.registrations(), 1);
    }

    #[test]
    fn test_memory_host_update_unknown_fails() {
        let mut host = MemoryHost::new();
        assert!(host.update_accessory(&record("remote1", "0x1")).is_err());
    }

    #[test]
    fn test_memory_host_unregister() {
        let record = record("remote1", "0x1");
        let mut host = MemoryHost::with_cached(vec![record.clone()]);
        assert_eq!(host.cached_accessories().unwrap().len(), 1);
        assert!(host.unregister_accessory(&record.uuid).unwrap());
        assert!(!host.unregister_accessory(&record.uuid).unwrap());
        assert!(host.is_empty());
    }

    #[test]
    fn test_stored_host_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accessories.redb");
        let record = record("remote1", "0x1");

        {
            let mut host = StoredHost::open(&path).unwrap();
            host.register_accessory(&record).unwrap();
        }

        let mut host = StoredHost::open(&path).unwrap();
        let cached = host.cached_accessories().unwrap();
        assert_eq!(cached, vec![record.clone()]);
        assert!(host.unregister_accessory(&record.uuid).unwrap());
        assert_eq!(host.store().count().unwrap(), 0);
    }
}
