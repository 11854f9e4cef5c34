use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{debug, error};

use timespan_core::core::clock::Clock;
use timespan_core::core::config::TimespanProperties;
use timespan_logging::TimespanLogger;

use crate::args::TimespanArgs;
use crate::error::Result;
use crate::runner::{CommandRunner, Outcome};

mod args;
mod error;
mod runner;

/// The main entry of the timespan command line tool.
///
/// The json output of a command is written to stdout, all logging to stderr.
#[tokio::main]
async fn main() -> ExitCode {
    let args = TimespanArgs::parse();

    let _logger = match init_logger(&args) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(outcome) => {
            if let Some(output) = outcome.output {
                println!("{}", output);
            }
            ExitCode::from(u8::try_from(outcome.exit_code).unwrap_or(1))
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logger(args: &TimespanArgs) -> Result<TimespanLogger> {
    let mut builder = TimespanLogger::builder();
    builder.root_level(args.log_level);

    if let Some(path) = args.log_config.as_ref() {
        builder.config_path(path);
    }
    if let Some(path) = args.log_file.as_ref() {
        builder.log_path(path);
    }

    Ok(builder.build()?)
}

async fn run(args: TimespanArgs) -> Result<Outcome> {
    let properties = load_properties(&args)?;
    debug!("Using timespan properties {}", properties);

    let engine = Arc::new(properties.create_engine());
    let runner = CommandRunner::new(engine, Arc::new(Clock::default()), properties.default_unit());

    runner.execute(&args.command).await
}

fn load_properties(args: &TimespanArgs) -> Result<TimespanProperties> {
    let properties = match args.config.as_ref() {
        Some(path) => TimespanProperties::from_path(path)?,
        None => TimespanProperties::new_auto(),
    };

    Ok(match args.data_dir.as_ref() {
        Some(directory) => properties.with_directory(directory.as_str()),
        None => properties,
    })
}
