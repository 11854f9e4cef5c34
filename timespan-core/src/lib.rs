/// The current version of the timespan storage engine.
pub const VERSION: &str = "0.3.0";

pub mod core;

#[cfg(feature = "testing")]
pub mod testing {
    use std::fs;
    use std::fs::OpenOptions;
    use std::io::Read;
    use std::path::PathBuf;
    use std::sync::Once;

    use log::{debug, trace, LevelFilter};
    use log4rs::append::console::ConsoleAppender;
    use log4rs::config::{Appender, Root};
    use log4rs::encode::pattern::PatternEncoder;
    use log4rs::Config;
    use tempfile::TempDir;

    static INIT: Once = Once::new();

    /// Initializes the logger with the specified log level.
    #[macro_export]
    macro_rules! init_logger {
        ($level:expr) => {
            timespan_core::testing::init_logger_level($level)
        };
        () => {
            timespan_core::testing::init_logger_level(log::LevelFilter::Trace)
        };
    }

    /// Initializes the logger with the specified log level.
    pub fn init_logger_level(level: LevelFilter) {
        INIT.call_once(|| {
            log4rs::init_config(Config::builder()
                .appender(Appender::builder().build("stdout", Box::new(ConsoleAppender::builder()
                    .encoder(Box::new(PatternEncoder::new("\x1B[37m{d(%Y-%m-%d %H:%M:%S%.3f)}\x1B[0m {h({l:>5.5})} \x1B[35m{I:>6.6}\x1B[0m \x1B[37m---\x1B[0m \x1B[37m[{T:>15.15}]\x1B[0m \x1B[36m{t:<60.60}\x1B[0m \x1B[37m:\x1B[0m {m}{n}")))
                    .build())))
                .build(Root::builder().appender("stdout").build(level))
                .unwrap())
                .unwrap();
        })
    }

    /// Read a file from the temp directory.
    pub fn read_temp_dir_file_as_string(temp_dir: &TempDir, filename: &str) -> String {
        let path = temp_dir.path().join(filename);

        trace!("Reading temp filepath {:?}", path);
        if path.exists() {
            let mut content = String::new();
            match OpenOptions::new()
                .read(true)
                .open(&path)
                .unwrap()
                .read_to_string(&mut content)
            {
                Ok(e) => {
                    debug!("Read temp file {:?} with size {}", path, e);
                    content
                }
                Err(e) => panic!("Failed to read temp file, {}", e),
            }
        } else {
            panic!("Temp filepath {:?} does not exist", path)
        }
    }

    /// Write the given contents to a file within the temp directory.
    pub fn write_tmp_dir_file(
        temp_dir: &TempDir,
        filename: &str,
        contents: impl AsRef<[u8]>,
    ) -> PathBuf {
        let path = temp_dir.path().join(filename);
        trace!("Writing test file {:?}", path);
        fs::write(&path, contents).unwrap();
        path
    }
}
