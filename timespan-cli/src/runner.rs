use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::process::Command as Process;

use timespan_core::core::clock::Clock;
use timespan_core::core::metrics::{parse_declaration, CommonMetricData, ErrorType, TimespanMetric};
use timespan_core::core::storage::TimespanStorageEngine;
use timespan_core::core::timespan::TimeUnit;

use crate::args::{Command, MetricArgs};
use crate::error::{CliError, Result};

/// The outcome of an executed command.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// The json document to print on stdout, if any.
    pub output: Option<Value>,
    /// The exit code of the tool.
    pub exit_code: i32,
}

impl Outcome {
    fn success() -> Self {
        Self {
            output: None,
            exit_code: 0,
        }
    }
}

/// Executes the commands of the tool against a storage engine.
#[derive(Debug)]
pub struct CommandRunner {
    engine: Arc<TimespanStorageEngine>,
    clock: Arc<Clock>,
    default_unit: TimeUnit,
}

impl CommandRunner {
    pub fn new(engine: Arc<TimespanStorageEngine>, clock: Arc<Clock>, default_unit: TimeUnit) -> Self {
        Self {
            engine,
            clock,
            default_unit,
        }
    }

    /// Execute the given command.
    pub async fn execute(&self, command: &Command) -> Result<Outcome> {
        debug!("Executing {}", command);
        match command {
            Command::Measure { metric, command } => self.measure(metric, command).await,
            Command::Record { metric, nanos } => self.record(metric, *nanos),
            Command::Snapshot { store, clear } => Ok(Outcome {
                output: Some(self.engine.snapshot_as_json(store, *clear)),
                exit_code: 0,
            }),
            Command::Reset => {
                self.engine.clear_all_stores()?;
                info!("All stores have been cleared");
                Ok(Outcome::success())
            }
        }
    }

    async fn measure(&self, args: &MetricArgs, command: &[String]) -> Result<Outcome> {
        let metric = self.metric(args)?;
        let (program, arguments) = command
            .split_first()
            .ok_or_else(|| CliError::ExecuteFailed(String::new(), "no program given".to_string()))?;

        metric.start();
        let status = match Process::new(program).args(arguments).status().await {
            Ok(status) => status,
            Err(e) => {
                metric.cancel();
                return Err(CliError::ExecuteFailed(command.join(" "), e.to_string()));
            }
        };
        metric.stop();

        Self::verify_recorded(&metric)?;
        let exit_code = status.code().unwrap_or(1);
        debug!("Process {} exited with {}", program, status);
        Ok(Outcome {
            output: None,
            exit_code,
        })
    }

    fn record(&self, args: &MetricArgs, nanos: u64) -> Result<Outcome> {
        let metric = self.metric(args)?;
        metric.set_raw(Duration::from_nanos(nanos));
        Self::verify_recorded(&metric)?;
        Ok(Outcome::success())
    }

    fn metric(&self, args: &MetricArgs) -> Result<TimespanMetric> {
        let unit = args
            .unit
            .clone()
            .unwrap_or_else(|| self.default_unit.to_string());
        let (lifetime, time_unit) = parse_declaration(args.lifetime.as_str(), unit.as_str())?;

        Ok(TimespanMetric::new(
            CommonMetricData {
                category: args.category.clone(),
                name: args.name.clone(),
                send_in_pings: args.stores.clone(),
                lifetime,
                disabled: false,
            },
            time_unit,
            self.engine.clone(),
            self.clock.clone(),
        ))
    }

    /// Verify that the metric recorded its value without errors.
    fn verify_recorded(metric: &TimespanMetric) -> Result<()> {
        let mut total = 0;
        for error_type in [ErrorType::InvalidState, ErrorType::InvalidValue] {
            let count = metric.error_count(error_type);
            if count > 0 {
                warn!(
                    "Metric {} recorded {} {:?} error(s)",
                    metric.meta().identifier(),
                    count,
                    error_type
                );
                total += count;
            }
        }

        if total > 0 {
            return Err(CliError::RecordingFailed(metric.meta().identifier(), total));
        }
        Ok(())
    }
}
