use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::path::Path;

use log::{debug, error, trace};
#[cfg(any(test, feature = "testing"))]
use mockall::automock;
use parking_lot::Mutex;
use serde_json::Value;

use crate::core::storage;
use crate::core::storage::{Storage, StorageError};

const SCOPE_EXTENSION: &str = "json";
const CORRUPT_EXTENSION: &str = "corrupt";

/// The entries of a single persistence scope, keyed by their storage key.
pub type ScopeEntries = BTreeMap<String, Value>;

/// The key-value substrate in which the storage engine persists its entries.
///
/// Entries are grouped by scope, each scope is an independent key space.
/// Values are stored as-is, implementations don't validate their contents.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait Persistence: Debug + Send + Sync {
    /// Retrieve all entries of the given scope.
    ///
    /// An unknown scope results in an empty set of entries.
    fn get_all(&self, scope: &str) -> storage::Result<ScopeEntries>;

    /// Write the given value for the key within the scope, replacing any previous value.
    fn put(&self, scope: &str, key: &str, value: Value) -> storage::Result<()>;

    /// Remove the key from the scope.
    /// Removing an unknown key is not an error.
    fn remove(&self, scope: &str, key: &str) -> storage::Result<()>;

    /// Remove all entries of the given scope.
    fn clear_scope(&self, scope: &str) -> storage::Result<()>;
}

/// A persistence which only keeps its entries in memory.
///
/// All entries are lost once the instance is dropped.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    scopes: Mutex<HashMap<String, ScopeEntries>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn get_all(&self, scope: &str) -> storage::Result<ScopeEntries> {
        let scopes = self.scopes.lock();
        Ok(scopes.get(scope).cloned().unwrap_or_default())
    }

    fn put(&self, scope: &str, key: &str, value: Value) -> storage::Result<()> {
        let mut scopes = self.scopes.lock();
        trace!("Storing {} into memory scope {}", key, scope);
        scopes
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, scope: &str, key: &str) -> storage::Result<()> {
        let mut scopes = self.scopes.lock();
        if let Some(entries) = scopes.get_mut(scope) {
            trace!("Removing {} from memory scope {}", key, scope);
            entries.remove(key);
        }
        Ok(())
    }

    fn clear_scope(&self, scope: &str) -> storage::Result<()> {
        let mut scopes = self.scopes.lock();
        debug!("Clearing memory scope {}", scope);
        scopes.remove(scope);
        Ok(())
    }
}

/// A persistence which stores each scope as a json document within a data directory.
///
/// The document of a scope is named after the scope, e.g. `timespan.ping.json`.
/// A document which can't be parsed is treated as an empty scope,
/// it's moved aside to `<scope>.json.corrupt` before the scope is written again.
/// Documents which can't be read at all result in a [StorageError::IO].
#[derive(Debug)]
pub struct FilePersistence {
    storage: Storage,
    lock: Mutex<()>,
}

impl FilePersistence {
    /// Create a new file persistence which stores its scopes within the given directory.
    /// The directory is created on the first write.
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            storage: Storage::from(directory.as_ref()),
            lock: Mutex::new(()),
        }
    }

    /// Returns the data directory of this persistence.
    pub fn directory(&self) -> &Path {
        self.storage.base_path()
    }

    fn read_scope(&self, scope: &str) -> storage::Result<ScopeEntries> {
        match self
            .storage
            .options()
            .serializer(Self::filename(scope)?)
            .read::<ScopeEntries>()
        {
            Err(StorageError::NotFound(_)) => {
                trace!("Scope {} has not been persisted yet", scope);
                Ok(ScopeEntries::new())
            }
            result => result,
        }
    }

    /// Read the scope before modifying it.
    /// A corrupt document is moved aside so the following write doesn't destroy it.
    fn read_scope_for_update(&self, scope: &str) -> storage::Result<ScopeEntries> {
        match self.read_scope(scope) {
            Err(StorageError::ReadingFailed(path, e)) => {
                error!("Scope document {} is corrupt, {}", path, e);
                self.storage
                    .options()
                    .serializer(Self::filename(scope)?)
                    .move_aside(CORRUPT_EXTENSION)?;
                Ok(ScopeEntries::new())
            }
            result => result,
        }
    }

    fn write_scope(&self, scope: &str, entries: &ScopeEntries) -> storage::Result<()> {
        let serializer = self
            .storage
            .options()
            .make_dirs(true)
            .serializer(Self::filename(scope)?);

        if entries.is_empty() {
            return serializer.delete();
        }

        serializer.write(entries).map(|_| ())
    }

    fn filename(scope: &str) -> storage::Result<String> {
        let valid = !scope.is_empty()
            && !scope.starts_with('.')
            && scope
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

        if valid {
            Ok(format!("{}.{}", scope, SCOPE_EXTENSION))
        } else {
            Err(StorageError::InvalidScope(scope.to_string()))
        }
    }
}

impl Persistence for FilePersistence {
    fn get_all(&self, scope: &str) -> storage::Result<ScopeEntries> {
        let _guard = self.lock.lock();
        match self.read_scope(scope) {
            Err(StorageError::ReadingFailed(path, e)) => {
                error!("Scope document {} is corrupt and will be ignored, {}", path, e);
                Ok(ScopeEntries::new())
            }
            result => result,
        }
    }

    fn put(&self, scope: &str, key: &str, value: Value) -> storage::Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_scope_for_update(scope)?;

        trace!("Storing {} into scope {}", key, scope);
        entries.insert(key.to_string(), value);
        self.write_scope(scope, &entries)
    }

    fn remove(&self, scope: &str, key: &str) -> storage::Result<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_scope_for_update(scope)?;

        if entries.remove(key).is_some() {
            trace!("Removing {} from scope {}", key, scope);
            self.write_scope(scope, &entries)?;
        }

        Ok(())
    }

    fn clear_scope(&self, scope: &str) -> storage::Result<()> {
        let _guard = self.lock.lock();
        debug!("Clearing scope {}", scope);
        self.storage
            .options()
            .serializer(Self::filename(scope)?)
            .delete()
    }
}
