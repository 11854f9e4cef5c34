use crate::{Error, Result};
use log::{debug, LevelFilter};
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::{Config, Handle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

const LOG_FORMAT_CONSOLE: &str = "\x1B[37m{d(%Y-%m-%d %H:%M:%S%.3f)}\x1B[0m {h({l:>5.5})} \x1B[37m---\x1B[0m \x1B[37m[{T:>15.15}]\x1B[0m \x1B[36m{t:<40.40}\x1B[0m \x1B[37m:\x1B[0m {m}{n}";
const LOG_FORMAT_FILE: &str =
    "{d(%Y-%m-%d %H:%M:%S%.3f)} {l:>5.5} {I:>6.6} --- [{T:>15.15}] {t:<40.40} : {m}{n}";
const CONSOLE_APPENDER: &str = "stderr";
const FILE_APPENDER: &str = "file";
const LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;
const LOG_FILE_WINDOW: u32 = 3;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// The process wide logger of the timespan tooling.
///
/// Console output is written to stderr, leaving stdout for the command output.
#[derive(Debug)]
pub struct TimespanLogger {
    handle: Handle,
}

impl TimespanLogger {
    /// Returns a builder instance for the logger.
    pub fn builder() -> TimespanLoggerBuilder {
        TimespanLoggerBuilder::default()
    }

    /// Create a new logging instance.
    ///
    /// Only one instance can be created per process, any subsequent attempt results in [Error::AlreadyInitialized].
    /// A failed attempt doesn't count as an instance.
    pub fn new(
        root_level: LevelFilter,
        config_path: Option<impl AsRef<Path>>,
        log_path: Option<impl AsRef<Path>>,
        loggers: Vec<(String, LevelFilter)>,
    ) -> Result<Self> {
        let handle = Self::initialize_once(&INITIALIZED, || {
            let config = match config_path {
                Some(path) => Self::load_from_config(path)?,
                None => Self::create_config(root_level, log_path, loggers)?,
            };

            log4rs::init_config(config).map_err(|e| Error::InvalidConfig(e.to_string()))
        })?;
        debug!("Timespan logger has been initialized");
        Ok(Self { handle })
    }

    /// Returns the root logging level of the logger.
    pub fn root_log_level(&self) -> LevelFilter {
        self.handle.max_log_level()
    }

    /// Run the initialization when the flag hasn't been claimed yet.
    /// The flag is released again when the initialization fails.
    fn initialize_once<T, F>(flag: &AtomicBool, initialize: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyInitialized);
        }

        initialize().map_err(|e| {
            flag.store(false, Ordering::Release);
            e
        })
    }

    fn load_from_config(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.to_string_lossy().to_string()));
        }

        log4rs::config::load_config_file(path, Default::default())
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    fn create_config(
        root_level: LevelFilter,
        log_path: Option<impl AsRef<Path>>,
        loggers: Vec<(String, LevelFilter)>,
    ) -> Result<Config> {
        let mut root = Root::builder().appender(CONSOLE_APPENDER);
        let mut config_builder = Config::builder().appender(
            Appender::builder().build(
                CONSOLE_APPENDER,
                Box::new(
                    ConsoleAppender::builder()
                        .target(Target::Stderr)
                        .encoder(Box::new(PatternEncoder::new(LOG_FORMAT_CONSOLE)))
                        .build(),
                ),
            ),
        );

        if let Some(path) = log_path {
            config_builder = config_builder.appender(Self::create_file_appender(path)?);
            root = root.appender(FILE_APPENDER);
        }

        for (logger, level) in loggers.into_iter() {
            config_builder = config_builder.logger(Logger::builder().build(logger, level));
        }

        config_builder
            .build(root.build(root_level))
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Create a size based rolling file appender, the rolled files are named `<log_path>.<index>`.
    fn create_file_appender(path: impl AsRef<Path>) -> Result<Appender> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let roller_pattern = format!("{}.{{}}", path.to_string_lossy());
        let roller = FixedWindowRoller::builder()
            .base(1)
            .build(roller_pattern.as_str(), LOG_FILE_WINDOW)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let policy = CompoundPolicy::new(
            Box::new(SizeTrigger::new(LOG_FILE_SIZE)),
            Box::new(roller),
        );

        Ok(Appender::builder().build(
            FILE_APPENDER,
            Box::new(
                RollingFileAppender::builder()
                    .encoder(Box::new(PatternEncoder::new(LOG_FORMAT_FILE)))
                    .append(true)
                    .build(path, Box::new(policy))
                    .map_err(|e| Error::InvalidConfig(e.to_string()))?,
            ),
        ))
    }
}

#[derive(Debug, Default)]
pub struct TimespanLoggerBuilder {
    root_level: Option<LevelFilter>,
    config_path: Option<PathBuf>,
    log_path: Option<PathBuf>,
    loggers: HashMap<String, LevelFilter>,
}

impl TimespanLoggerBuilder {
    /// Set the root level of the logger.
    pub fn root_level(&mut self, level: LevelFilter) -> &mut Self {
        self.root_level = Some(level);
        self
    }

    /// Set the path of a log4rs config file to load.
    /// When set, all other options of the builder are ignored.
    pub fn config_path(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the log file path of the logger.
    pub fn log_path(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.log_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Add a log level filter for the given package.
    pub fn logger<S: AsRef<str>>(&mut self, package: S, level: LevelFilter) -> &mut Self {
        self.loggers.insert(package.as_ref().to_string(), level);
        self
    }

    /// Consumes the builder options and creates a new logging instance.
    pub fn build(&mut self) -> Result<TimespanLogger> {
        let root_level = self.root_level.take().unwrap_or(LevelFilter::Warn);
        let config_path = self.config_path.take();
        let log_path = self.log_path.take();
        let loggers = self.loggers.drain().collect::<Vec<_>>();

        TimespanLogger::new(root_level, config_path, log_path, loggers)
    }
}
