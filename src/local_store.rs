//! Device-local persistent key-value storage.
//!
//! The local store is the first tier of every write and the fallback source of
//! truth whenever the remote store cannot be reached. [`LmdbLocalStore`] keeps the
//! data in an LMDB environment on disk; [`MemoryLocalStore`] keeps it in process.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use lmdb::{Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{debug, info};

use crate::error::{StoreError, StoreResult};

/// String-keyed, string-valued storage scoped to one device.
pub trait LocalStore: Send + Sync {
    fn get_item(&self, key: &str) -> StoreResult<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Returns `true` if a value was present.
    fn remove_item(&self, key: &str) -> StoreResult<bool>;

    fn clear(&self) -> StoreResult<()>;
}

/// LMDB-backed local store.
///
/// The environment is a directory named `<name>.lmdb`, created on first open.
/// Every write runs in its own read-write transaction and is committed before
/// returning, so a value is durable once `set_item` succeeds.
pub struct LmdbLocalStore {
    env: Environment,
    db: Database,
    path: PathBuf,
}

impl LmdbLocalStore {
    pub fn open(name: impl AsRef<Path>, map_size: usize) -> StoreResult<Self> {
        let mut dir = name.as_ref().as_os_str().to_owned();
        dir.push(".lmdb");
        let path = PathBuf::from(dir);

        if !path.exists() {
            info!("Creating local store at: {}", path.display());
            fs::create_dir_all(&path)?;
        }

        let env = Environment::new()
            .set_map_size(map_size)
            .set_max_dbs(1)
            .open(&path)?;
        let db = env.create_db(None, DatabaseFlags::empty())?;

        info!("Local store opened at: {}", path.display());
        Ok(Self { env, db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalStore for LmdbLocalStore {
    fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        let txn = self.env.begin_ro_txn()?;
        let value = match txn.get(self.db, &key) {
            Ok(bytes) => Some(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| StoreError::Local(format!("Invalid UTF-8 for key '{key}': {e}")))?,
            ),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        txn.abort();
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.db, &key, &value, WriteFlags::empty())?;
        txn.commit()?;
        debug!("Local store wrote key '{key}' ({} bytes)", value.len());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StoreResult<bool> {
        let mut txn = self.env.begin_rw_txn()?;
        let removed = match txn.del(self.db, &key, None) {
            Ok(()) => true,
            Err(lmdb::Error::NotFound) => false,
            Err(e) => return Err(e.into()),
        };
        txn.commit()?;
        Ok(removed)
    }

    fn clear(&self) -> StoreResult<()> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.clear_db(self.db)?;
        txn.commit()?;
        Ok(())
    }
}

/// In-process local store.
///
/// `set_failing(true)` makes every call fail the way a full or disabled
/// storage area does.
#[derive(Default)]
pub struct MemoryLocalStore {
    items: RwLock<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Local("storage quota exceeded".to_string()));
        }
        Ok(())
    }
}

impl LocalStore for MemoryLocalStore {
    fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        self.check()?;
        let items = self.items.read().map_err(|_| StoreError::Local("lock poisoned".to_string()))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check()?;
        let mut items = self.items.write().map_err(|_| StoreError::Local("lock poisoned".to_string()))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StoreResult<bool> {
        self.check()?;
        let mut items = self.items.write().map_err(|_| StoreError::Local("lock poisoned".to_string()))?;
        Ok(items.remove(key).is_some())
    }

    fn clear(&self) -> StoreResult<()> {
        self.check()?;
        let mut items = self.items.write().map_err(|_| StoreError::Local("lock poisoned".to_string()))?;
        items.clear();
        Ok(())
    }
}
