//! Accessory cache using redb.
//!
//! Records are stored as JSON keyed by the accessory UUID string. The store
//! is generic over the record type so the device crate owns the accessory
//! model.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::Error;

// key = accessory uuid, value = accessory record (JSON)
const ACCESSORIES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("accessories");

/// Accessory cache store.
pub struct AccessoryStore {
    db: Database,
}

impl AccessoryStore {
    /// Open or create the cache at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(path)?;

        // Make sure the table exists so read transactions never miss it.
        let write_txn = db.begin_write()?;
        {
            let _accessories = write_txn.open_table(ACCESSORIES_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Insert or replace a record.
    pub fn save<T: Serialize>(&self, uuid: &str, record: &T) -> Result<(), Error> {
        let json = serde_json::to_string(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ACCESSORIES_TABLE)?;
            table.insert(uuid, json.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load one record.
    pub fn load<T: DeserializeOwned>(&self, uuid: &str) -> Result<Option<T>, Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCESSORIES_TABLE)?;

        let entry = table.get(uuid)?;
        let record = match entry {
            Some(value) => Some(serde_json::from_str(value.value())?),
            None => None,
        };
        Ok(record)
    }

    /// Load every record. Entries that no longer decode are skipped.
    pub fn list<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCESSORIES_TABLE)?;

        let mut records = Vec::new();
        for result in table.iter()? {
            let (key, value) = result?;
            match serde_json::from_str::<T>(value.value()) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable cached accessory {}: {}", key.value(), e),
            }
        }

        Ok(records)
    }

    /// Remove a record. Returns whether it existed.
    pub fn remove(&self, uuid: &str) -> Result<bool, Error> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(ACCESSORIES_TABLE)?;
            let existed = table.remove(uuid)?.is_some();
            existed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize, Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCESSORIES_TABLE)?;
        let count = table.iter()?.count();
        Ok(count)
    }

    /// Store raw JSON. Used to seed corrupt entries in tests.
    #[cfg(test)]
    fn save_raw(&self, uuid: &str, json: &str) -> Result<(), Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ACCESSORIES_TABLE)?;
            table.insert(uuid, json)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        battery: Option<u8>,
    }

    fn create_temp_store() -> (tempfile::TempDir, AccessoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AccessoryStore::open(dir.path().join("cache").join("accessories.redb")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_save_load_remove() {
        let (_dir, store) = create_temp_store();
        let record = Record {
            name: "remote1".to_string(),
            battery: Some(80),
        };

        store.save("uuid-1", &record).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.load::<Record>("uuid-1").unwrap(), Some(record));
        assert_eq!(store.load::<Record>("uuid-2").unwrap(), None);

        assert!(store.remove("uuid-1").unwrap());
        assert!(!store.remove("uuid-1").unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_save_replaces() {
        let (_dir, store) = create_temp_store();
        store
            .save("uuid-1", &Record { name: "a".into(), battery: None })
            .unwrap();
        store
            .save("uuid-1", &Record { name: "b".into(), battery: Some(5) })
            .unwrap();

        let records: Vec<Record> = store.list().unwrap();
        assert_eq!(records, vec![Record { name: "b".into(), battery: Some(5) }]);
    }

    #[test]
    fn test_list_skips_corrupt_entries() {
        let (_dir, store) = create_temp_store();
        store
            .save("uuid-1", &Record { name: "ok".into(), battery: None })
            .unwrap();
        store.save_raw("uuid-2", "{not valid json").unwrap();

        let records: Vec<Record> = store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ok");
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accessories.redb");
        {
            let store = AccessoryStore::open(&path).unwrap();
            store
                .save("uuid-1", &Record { name: "remote1".into(), battery: None })
                .unwrap();
        }
        let store = AccessoryStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
