use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use derive_more::Display;
use log::LevelFilter;

/// The options of the timespan command line tool.
#[derive(Debug, Clone, Display, Parser)]
#[command(name = "timespan", version, about = "Record and report timespan metrics")]
#[display(fmt = "config: {:?}, data_dir: {:?}, command: {}", config, data_dir, command)]
pub struct TimespanArgs {
    /// The config file to load, defaults to `timespan.yml` within the working directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Override the data directory in which the metric values are persisted.
    #[arg(long, global = true)]
    pub data_dir: Option<String>,
    /// The root log level.
    #[arg(long, global = true, default_value_t = LevelFilter::Warn)]
    pub log_level: LevelFilter,
    /// Also write the log output to the given file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
    /// A log4rs config file which replaces the default logging setup.
    #[arg(long, global = true)]
    pub log_config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Display, Subcommand)]
pub enum Command {
    /// Run a command and add its duration to the metric.
    #[display(fmt = "measure {}", metric)]
    Measure {
        #[command(flatten)]
        metric: MetricArgs,
        /// The program and its arguments to measure.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Add an explicit duration to the metric.
    #[display(fmt = "record {} {}ns", metric, nanos)]
    Record {
        #[command(flatten)]
        metric: MetricArgs,
        /// The elapsed time in nanoseconds.
        #[arg(long)]
        nanos: u64,
    },
    /// Print the snapshot of a store as json.
    #[display(fmt = "snapshot {}", store)]
    Snapshot {
        /// The store to snapshot.
        #[arg(long)]
        store: String,
        /// Remove the reported values from the store.
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
    /// Remove every stored value of all stores.
    #[display(fmt = "reset")]
    Reset,
}

/// The declaration of the metric to record into.
#[derive(Debug, Clone, Display, Args)]
#[display(fmt = "{}.{} ({})", category, name, lifetime)]
pub struct MetricArgs {
    /// The category of the metric.
    #[arg(long, default_value = "")]
    pub category: String,
    /// The name of the metric.
    #[arg(long)]
    pub name: String,
    /// The store(s) in which the metric is reported, can be repeated.
    #[arg(long = "store", required = true)]
    pub stores: Vec<String>,
    /// The lifetime of the metric value, `ping`, `application` or `user`.
    #[arg(long, default_value = "ping")]
    pub lifetime: String,
    /// The unit of the metric, defaults to the configured default unit.
    #[arg(long)]
    pub unit: Option<String>,
}
