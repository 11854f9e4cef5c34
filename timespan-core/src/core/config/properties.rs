use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use derive_more::Display;
use log::{debug, trace, warn};
use serde::Deserialize;

use crate::core::config::{ConfigError, Result};
use crate::core::storage::{
    FilePersistence, InMemoryPersistence, Persistence, TimespanStorageEngine,
    DEFAULT_SCOPE_PREFIX,
};
use crate::core::timespan::TimeUnit;

const DEFAULT_DIRECTORY: fn() -> String = || ".timespan".to_string();
const DEFAULT_SCOPE_PREFIX_FN: fn() -> String = || DEFAULT_SCOPE_PREFIX.to_string();
const DEFAULT_UNIT: fn() -> TimeUnit = || TimeUnit::Millisecond;

const DEFAULT_CONFIG_FILENAME: &str = "timespan";
const CONFIG_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// The kind of persistence backing the storage engine.
#[derive(Debug, Display, Default, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Entries are only kept in memory and lost on exit.
    #[display(fmt = "memory")]
    Memory,
    /// Entries are stored as json documents within the data directory.
    #[default]
    #[display(fmt = "file")]
    File,
}

#[derive(Debug, Display, Clone, Deserialize, PartialEq)]
#[display(fmt = "kind: {}, directory: {}, scope_prefix: {}", kind, directory, scope_prefix)]
pub struct StorageProperties {
    #[serde(default)]
    kind: StorageKind,
    #[serde(default = "DEFAULT_DIRECTORY")]
    directory: String,
    #[serde(alias = "scope-prefix")]
    #[serde(alias = "scopePrefix")]
    #[serde(default = "DEFAULT_SCOPE_PREFIX_FN")]
    scope_prefix: String,
}

impl StorageProperties {
    pub fn new(kind: StorageKind, directory: String, scope_prefix: String) -> Self {
        Self {
            kind,
            directory,
            scope_prefix,
        }
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    /// Retrieve the data directory in which the scope documents are stored.
    pub fn directory(&self) -> &str {
        self.directory.as_str()
    }

    pub fn scope_prefix(&self) -> &str {
        self.scope_prefix.as_str()
    }
}

impl Default for StorageProperties {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            directory: DEFAULT_DIRECTORY(),
            scope_prefix: DEFAULT_SCOPE_PREFIX_FN(),
        }
    }
}

/// The static properties of the timespan storage.
#[derive(Debug, Display, Clone, Deserialize, PartialEq)]
#[display(fmt = "storage: {}, default_unit: {}", storage, default_unit)]
pub struct TimespanProperties {
    #[serde(default)]
    storage: StorageProperties,
    #[serde(alias = "default-unit")]
    #[serde(alias = "defaultUnit")]
    #[serde(default = "DEFAULT_UNIT")]
    default_unit: TimeUnit,
}

impl TimespanProperties {
    pub fn new(storage: StorageProperties, default_unit: TimeUnit) -> Self {
        Self {
            storage,
            default_unit,
        }
    }

    /// Create new [TimespanProperties] which will look for the [DEFAULT_CONFIG_FILENAME] config file
    /// within the working directory.
    /// It will parse the config file if found, else uses the defaults instead.
    pub fn new_auto() -> Self {
        Self::from_filename(DEFAULT_CONFIG_FILENAME)
    }

    /// Search for the config file with the given name, without extension, in the working directory.
    pub fn from_filename(filename: &str) -> Self {
        debug!("Searching for config file with name \"{}\"", filename);
        match Self::find_existing_file(filename) {
            Some(path) => Self::from_path(&path).unwrap_or_else(|e| {
                warn!("Failed to load config, {}, using defaults instead", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Load the properties from the given config file.
    ///
    /// It returns an error when the file doesn't exist or can't be read.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let filepath = path.to_string_lossy().to_string();

        match fs::read_to_string(path) {
            Ok(data) => {
                debug!("Loading config file {}", filepath);
                Ok(Self::from_str(data.as_str()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ConfigError::NotFound(filepath)),
            Err(e) => Err(ConfigError::Io(filepath, e.to_string())),
        }
    }

    /// Parse the given yaml config data.
    /// Missing fields are completed with their defaults, invalid data results in the defaults.
    pub fn from_str(config_data_value: &str) -> Self {
        trace!("Parsing config data {}", config_data_value);
        if config_data_value.trim().is_empty() {
            return Self::default();
        }

        let data = match serde_yaml::from_str::<TimespanProperties>(config_data_value) {
            Ok(properties) => properties,
            Err(err) => {
                warn!("Failed to parse config, {}, using defaults instead", err);
                Self::default()
            }
        };

        debug!("Parsed config data {:?}", &data);
        data
    }

    pub fn storage(&self) -> &StorageProperties {
        &self.storage
    }

    /// Retrieve the unit to use when no unit has been given for a metric.
    pub fn default_unit(&self) -> TimeUnit {
        self.default_unit
    }

    /// Override the data directory of the storage.
    pub fn with_directory<S: Into<String>>(mut self, directory: S) -> Self {
        self.storage.directory = directory.into();
        self
    }

    /// Create the persistence described by these properties.
    pub fn create_persistence(&self) -> Arc<dyn Persistence> {
        match self.storage.kind {
            StorageKind::Memory => Arc::new(InMemoryPersistence::new()),
            StorageKind::File => Arc::new(FilePersistence::new(self.storage.directory.as_str())),
        }
    }

    /// Create a new storage engine described by these properties.
    pub fn create_engine(&self) -> TimespanStorageEngine {
        debug!("Creating storage engine with {}", self.storage);
        TimespanStorageEngine::builder()
            .persistence(self.create_persistence())
            .scope_prefix(self.storage.scope_prefix.as_str())
            .build()
    }

    fn find_existing_file(filename: &str) -> Option<PathBuf> {
        let directory = match env::current_dir() {
            Ok(e) => e,
            Err(e) => {
                warn!("Unable to resolve the working directory, {}", e);
                return None;
            }
        };

        for extension in CONFIG_EXTENSIONS {
            let path = directory.join(format!("{}.{}", filename, extension));
            if path.exists() {
                debug!("Found config file {:?}", path);
                return Some(path);
            }
            trace!("Config file location {:?} doesn't exist", path);
        }

        None
    }
}

impl Default for TimespanProperties {
    fn default() -> Self {
        Self {
            storage: StorageProperties::default(),
            default_unit: DEFAULT_UNIT(),
        }
    }
}

#[cfg(test)]
mod test {
    use tempfile::tempdir;

    use crate::core::metrics::{CommonMetricData, Lifetime};
    use crate::init_logger;
    use crate::testing::write_tmp_dir_file;

    use super::*;

    #[test]
    fn test_from_filename_when_not_found_should_return_defaults() {
        init_logger!();
        let expected_result = TimespanProperties::new(
            StorageProperties::new(
                StorageKind::File,
                ".timespan".to_string(),
                "timespan".to_string(),
            ),
            TimeUnit::Millisecond,
        );

        let result = TimespanProperties::from_filename("non-existing-timespan-config");

        assert_eq!(expected_result, result)
    }

    #[test]
    fn test_from_str_should_return_parsed_data() {
        init_logger!();
        let config_value = "
storage:
  kind: memory
  directory: /tmp/lorem
  scope-prefix: ipsum
default-unit: second";
        let expected_result = TimespanProperties::new(
            StorageProperties::new(
                StorageKind::Memory,
                "/tmp/lorem".to_string(),
                "ipsum".to_string(),
            ),
            TimeUnit::Second,
        );

        let result = TimespanProperties::from_str(config_value);

        assert_eq!(expected_result, result)
    }

    #[test]
    fn test_from_str_when_partial_fields_are_present_should_complete_with_defaults() {
        init_logger!();
        let config_value = "
storage:
  directory: data";

        let result = TimespanProperties::from_str(config_value);

        assert_eq!(StorageKind::File, result.storage().kind());
        assert_eq!("data", result.storage().directory());
        assert_eq!("timespan", result.storage().scope_prefix());
        assert_eq!(TimeUnit::Millisecond, result.default_unit());
    }

    #[test]
    fn test_from_str_invalid_data_should_return_defaults() {
        init_logger!();
        let config_value = "
storage:
  kind: cloud";

        let result = TimespanProperties::from_str(config_value);

        assert_eq!(TimespanProperties::default(), result)
    }

    #[test]
    fn test_from_path() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let path = write_tmp_dir_file(&temp_dir, "timespan.yml", "default-unit: minute");

        let result = TimespanProperties::from_path(&path).unwrap();

        assert_eq!(TimeUnit::Minute, result.default_unit());
    }

    #[test]
    fn test_from_path_not_found() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("timespan.yml");

        let result = TimespanProperties::from_path(&path);

        assert_eq!(
            Err(ConfigError::NotFound(path.to_string_lossy().to_string())),
            result
        );
    }

    #[test]
    fn test_with_directory() {
        let result = TimespanProperties::default().with_directory("/var/lib/timespan");

        assert_eq!("/var/lib/timespan", result.storage().directory());
    }

    #[test]
    fn test_create_engine() {
        init_logger!();
        let temp_dir = tempdir().unwrap();
        let properties = TimespanProperties::from_str("storage:\n  scope-prefix: lorem")
            .with_directory(temp_dir.path().to_string_lossy());
        let metric = CommonMetricData {
            name: "elapsed".to_string(),
            send_in_pings: vec!["store1".to_string()],
            lifetime: Lifetime::User,
            ..Default::default()
        };

        let engine = properties.create_engine();
        engine
            .accumulate(&metric, TimeUnit::Nanosecond, 20)
            .unwrap();

        assert_eq!("lorem.user", engine.scope_name(Lifetime::User));
        assert!(temp_dir.path().join("lorem.user.json").exists());
    }
}
