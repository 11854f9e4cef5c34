use std::fs;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::storage;
use crate::core::storage::StorageError;

const TEMP_EXTENSION: &str = "tmp";

/// The file layer of the persistence, responsible for storing and retrieving documents
/// within a base directory.
///
/// The `Storage` struct holds no file handles and can be safely shared across multiple threads.
#[derive(Debug, Clone)]
pub struct Storage {
    base_path: PathBuf,
}

impl Storage {
    /// Returns the base directory of this storage.
    pub fn base_path(&self) -> &Path {
        self.base_path.as_path()
    }

    /// Creates a new [StorageOptions] for the base path of this storage.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use timespan_core::core::storage::Storage;
    ///
    /// let storage = Storage::from("/path/to/storage");
    /// let data: Vec<u64> = storage.options()
    ///     .serializer("data.json")
    ///     .read()
    ///     .expect("expected the data to have been read");
    /// ```
    pub fn options(&self) -> StorageOptions {
        StorageOptions::new(self.base_path.clone())
    }
}

impl From<&str> for Storage {
    fn from(value: &str) -> Self {
        Self {
            base_path: PathBuf::from(value),
        }
    }
}

impl From<&Path> for Storage {
    fn from(value: &Path) -> Self {
        Self {
            base_path: value.to_path_buf(),
        }
    }
}

/// Options for configuring storage behavior.
#[derive(Debug)]
pub struct StorageOptions {
    path: PathBuf,
    make_dirs: bool,
}

impl StorageOptions {
    fn new<P: AsRef<Path>>(initial_path: P) -> Self {
        Self {
            path: PathBuf::from(initial_path.as_ref()),
            make_dirs: false,
        }
    }

    /// Sets whether the parent directories of the file should be created on write.
    pub fn make_dirs(mut self, make_dirs: bool) -> Self {
        self.make_dirs = make_dirs;
        self
    }

    /// Creates a [SerializerStorage] for the given filename.
    pub fn serializer<F: AsRef<str>>(self, filename: F) -> SerializerStorage {
        SerializerStorage {
            path: self.path.join(filename.as_ref()),
            make_dirs: self.make_dirs,
        }
    }
}

/// Storage for serializing and deserializing a single json document.
#[derive(Debug)]
pub struct SerializerStorage {
    path: PathBuf,
    make_dirs: bool,
}

impl SerializerStorage {
    /// Checks if the storage file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the stored document from the storage file.
    ///
    /// It returns [StorageError::NotFound] when the file doesn't exist,
    /// [StorageError::IO] when the file couldn't be read,
    /// or [StorageError::ReadingFailed] when the contents couldn't be parsed into `T`.
    pub fn read<T>(&self) -> storage::Result<T>
    where
        T: DeserializeOwned,
    {
        let mut file = self.read_open()?;
        let absolute_path = self.absolute_path();

        let mut data = String::new();
        file.read_to_string(&mut data)
            .map_err(|e| StorageError::IO(absolute_path.clone(), e.to_string()))?;

        match serde_json::from_str::<T>(data.as_str()) {
            Ok(e) => {
                debug!("File {} has been loaded", absolute_path);
                Ok(e)
            }
            Err(e) => {
                debug!("File {} is invalid, {}", absolute_path, &e);
                Err(StorageError::ReadingFailed(absolute_path, e.to_string()))
            }
        }
    }

    /// Writes the given value to the storage file, replacing any previous contents.
    ///
    /// The document is written to a temporary file first which then replaces the storage file,
    /// an interrupted write leaves the previous document intact.
    ///
    /// It returns the path of the storage file, else the [StorageError].
    pub fn write<T>(&self, value: &T) -> storage::Result<PathBuf>
    where
        T: Serialize,
    {
        let absolute_path = self.absolute_path();

        trace!("Serializing storage data to {}", absolute_path);
        let data = serde_json::to_string(value)
            .map_err(|e| StorageError::WritingFailed(absolute_path.clone(), e.to_string()))?;

        let temp_path = self.temp_path();
        let mut file = self.write_open(temp_path.as_path())?;
        trace!("Writing to storage {}, {}", absolute_path, data);
        file.write_all(data.as_bytes())
            .and_then(|_| file.sync_data())
            .and_then(|_| fs::rename(temp_path.as_path(), self.path.as_path()))
            .map_err(|e| {
                let _ = fs::remove_file(temp_path.as_path());
                StorageError::WritingFailed(absolute_path.clone(), e.to_string())
            })?;

        debug!("Storage file {} has been saved", absolute_path);
        Ok(self.path.clone())
    }

    /// Move the storage file out of the way by renaming it with the given extension appended,
    /// e.g. `scope.json` becomes `scope.json.corrupt`.
    ///
    /// It returns the new path of the moved file.
    pub fn move_aside(&self, extension: &str) -> storage::Result<PathBuf> {
        let target = Self::append_extension(self.path.as_path(), extension);
        let absolute_path = self.absolute_path();

        fs::rename(self.path.as_path(), target.as_path())
            .map_err(|e| StorageError::IO(absolute_path.clone(), e.to_string()))?;
        warn!("Storage file {} has been moved to {:?}", absolute_path, target);
        Ok(target)
    }

    /// Removes the storage file when it exists.
    pub fn delete(&self) -> storage::Result<()> {
        if !self.exists() {
            trace!("Storage file {} doesn't exist, nothing to delete", self.absolute_path());
            return Ok(());
        }

        let absolute_path = self.absolute_path();
        debug!("Deleting storage file {}", absolute_path);
        fs::remove_file(self.path.as_path())
            .map_err(|e| StorageError::IO(absolute_path, e.to_string()))
    }

    fn absolute_path(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    fn read_open(&self) -> storage::Result<File> {
        trace!("Opening storage file {}", self.absolute_path());
        OpenOptions::new()
            .read(true)
            .open(self.path.as_path())
            .map_err(|e| {
                let absolute_path = self.absolute_path();
                trace!("File {} couldn't be opened, {}", absolute_path, e);

                if e.kind() == ErrorKind::NotFound {
                    StorageError::NotFound(absolute_path)
                } else {
                    StorageError::IO(absolute_path, e.to_string())
                }
            })
    }

    fn write_open(&self, path: &Path) -> storage::Result<File> {
        self.create_parent_directories_if_needed()?;

        trace!("Opening storage file {:?}", path);
        OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                let absolute_path = self.absolute_path();
                trace!("File {:?} couldn't be opened, {}", path, e);
                StorageError::WritingFailed(absolute_path, e.to_string())
            })
    }

    fn temp_path(&self) -> PathBuf {
        Self::append_extension(self.path.as_path(), TEMP_EXTENSION)
    }

    fn append_extension(path: &Path, extension: &str) -> PathBuf {
        let mut filename = path.as_os_str().to_os_string();
        filename.push(".");
        filename.push(extension);
        PathBuf::from(filename)
    }

    fn create_parent_directories_if_needed(&self) -> storage::Result<()> {
        if !self.make_dirs {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            let parent_absolute_path = parent.to_string_lossy().to_string();
            trace!("Creating parent directories {}", parent_absolute_path);
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create parent directories, {}", e);
                return Err(StorageError::IO(parent_absolute_path, e.to_string()));
            }
        }

        Ok(())
    }
}
