use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors from a [`TableStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The backing file doesn't hold a valid store.
    #[error("corrupted store file {}: {source}", path.display())]
    Corrupted {
        /// The backing file.
        path: PathBuf,
        /// The decoding error.
        #[source]
        source: serde_json::Error,
    },
    /// A value couldn't be encoded.
    #[error("failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A named, persistent key-value store kept in a directory.
///
/// All entries live in one JSON file named after the store. Every operation
/// reads the file again, so separate handles on the same store see each
/// other's writes. Writes go to a temporary file that then replaces the
/// store file, so readers never see a partial write.
///
/// Clones share a write lock, so writes from concurrent tool calls are
/// applied one after another instead of overwriting each other.
#[derive(Clone, Debug)]
pub struct TableStore<T> {
    dir: PathBuf,
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> TableStore<T> {
    /// Opens the store `name` in `dir`, creating the directory if needed.
    ///
    /// With `init`, every file or directory in `dir` whose name starts with
    /// `name` is removed first, so the store starts empty.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        name: &str,
        init: bool,
    ) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        if init {
            remove_prefixed(&dir, name)?;
        }

        let path = dir.join(format!("{name}.json"));
        debug!("opened table store at {}", path.display());
        Ok(Self {
            dir,
            path,
            write_lock: Arc::default(),
            _marker: PhantomData,
        })
    }

    /// Path of the backing file.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn save(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let _guard = self.lock();
        let mut entries = self.load()?;
        let value = serde_json::to_value(value).map_err(StoreError::Encode)?;
        entries.insert(key.to_owned(), value);
        self.persist(&entries)
    }

    /// Returns the value stored under `key`.
    pub fn fetch(&self, key: &str) -> Result<Option<T>, StoreError> {
        let mut entries = self.load()?;
        let Some(value) = entries.remove(key) else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| self.corrupted(source))
    }

    /// Removes the value under `key`. Returns `false` if there was none.
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let _guard = self.lock();
        let mut entries = self.load()?;
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        self.persist(&entries)?;
        Ok(true)
    }

    /// Returns all keys in ascending order.
    pub fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.load()?.into_keys().collect())
    }

    /// Replaces every entry with `entries` in a single write.
    pub fn replace_all<K: Into<String>>(
        &self,
        entries: Vec<(K, T)>,
    ) -> Result<(), StoreError> {
        let mut encoded = BTreeMap::new();
        for (key, value) in entries {
            let value =
                serde_json::to_value(&value).map_err(StoreError::Encode)?;
            encoded.insert(key.into(), value);
        }
        let _guard = self.lock();
        self.persist(&encoded)
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> Result<BTreeMap<String, serde_json::Value>, StoreError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&data).map_err(|source| self.corrupted(source))
    }

    fn persist(
        &self,
        entries: &BTreeMap<String, serde_json::Value>,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_vec(entries).map_err(StoreError::Encode)?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        file.write_all(&data).map_err(io_err)?;
        file.persist(&self.path).map_err(|err| io_err(err.error))?;
        trace!("wrote {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }

    fn corrupted(&self, source: serde_json::Error) -> StoreError {
        StoreError::Corrupted {
            path: self.path.clone(),
            source,
        }
    }
}

fn remove_prefixed(dir: &Path, prefix: &str) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }

        let path = entry.path();
        debug!("removing {}", path.display());
        let removed = if entry.file_type().map_err(io_err)?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|source| StoreError::Io { path, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tempfile::tempdir;

    use super::*;
    use crate::Table;

    fn table(cell: &str) -> Table {
        Table::new(vec!["name".to_owned()], vec![vec![cell.to_owned()]])
    }

    #[test]
    fn test_save_fetch_delete() {
        let dir = tempdir().unwrap();
        let store = TableStore::open(dir.path(), "wiki_tables", true).unwrap();

        assert!(store.list_keys().unwrap().is_empty());
        assert_eq!(store.fetch("table_1").unwrap(), None);

        store.save("table_2", &table("b")).unwrap();
        store.save("table_1", &table("a")).unwrap();
        store.save("table_1", &table("c")).unwrap();
        assert_eq!(store.list_keys().unwrap(), ["table_1", "table_2"]);
        assert_eq!(store.fetch("table_1").unwrap(), Some(table("c")));

        assert!(store.delete("table_2").unwrap());
        assert!(!store.delete("table_2").unwrap());
        assert_eq!(store.list_keys().unwrap(), ["table_1"]);

        store.clear().unwrap();
        assert!(store.list_keys().unwrap().is_empty());
        store.clear().unwrap();
    }

    #[test]
    fn test_handles_share_writes() {
        let dir = tempdir().unwrap();
        let writer =
            TableStore::<Table>::open(dir.path(), "wiki_tables", true).unwrap();
        let reader = TableStore::<Table>::open(dir.path(), "wiki_tables", false)
            .unwrap();

        writer.save("table_1", &table("a")).unwrap();
        assert_eq!(reader.fetch("table_1").unwrap(), Some(table("a")));
    }

    #[test]
    fn test_init_removes_prefixed_entries() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("wiki_tables.db"), b"old").unwrap();
        fs::create_dir(dir.path().join("wiki_tables.dir")).unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        let store = TableStore::<Table>::open(dir.path(), "wiki_tables", false)
            .unwrap();
        store.save("table_1", &table("a")).unwrap();

        let store =
            TableStore::<Table>::open(dir.path(), "wiki_tables", true).unwrap();
        assert!(store.list_keys().unwrap().is_empty());
        assert!(!dir.path().join("wiki_tables.db").exists());
        assert!(!dir.path().join("wiki_tables.dir").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_replace_all() {
        let dir = tempdir().unwrap();
        let store = TableStore::open(dir.path(), "wiki_tables", true).unwrap();
        store.save("table_9", &table("old")).unwrap();

        store
            .replace_all(vec![("table_1", table("a")), ("table_2", table("b"))])
            .unwrap();
        assert_eq!(store.list_keys().unwrap(), ["table_1", "table_2"]);
        assert_eq!(store.fetch("table_2").unwrap(), Some(table("b")));

        store.replace_all(Vec::<(String, Table)>::new()).unwrap();
        assert!(store.list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_saves_keep_every_key() {
        let dir = tempdir().unwrap();
        let store =
            TableStore::<Table>::open(dir.path(), "wiki_tables", true).unwrap();

        let handles = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for round in 0..5 {
                        let key = format!("table_{i}_{round}");
                        store.save(&key, &table(&key)).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.list_keys().unwrap().len(), 40);
        assert_eq!(
            store.fetch("table_3_4").unwrap(),
            Some(table("table_3_4"))
        );
    }

    #[test]
    fn test_corrupted_file() {
        let dir = tempdir().unwrap();
        let store =
            TableStore::<Table>::open(dir.path(), "wiki_tables", true).unwrap();
        fs::write(store.path(), b"not json").unwrap();

        let err = store.list_keys().unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { .. }));
    }
}
