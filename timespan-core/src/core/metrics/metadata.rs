use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::core::metrics::MetricError;

/// The separator between the category and name of a metric identifier.
pub const IDENTIFIER_SEPARATOR: char = '.';

/// The lifetime of a metric value, which determines in which persistence scope it lives.
#[derive(Debug, Display, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// The value is retained until it has been reported within its stores.
    #[default]
    #[display(fmt = "ping")]
    Ping,
    /// The value is retained for the lifetime of the application.
    #[display(fmt = "application")]
    Application,
    /// The value is retained for the lifetime of the user profile.
    #[display(fmt = "user")]
    User,
}

impl Lifetime {
    /// All known lifetimes, in the order in which their scopes are locked.
    pub const ALL: [Lifetime; 3] = [Lifetime::Ping, Lifetime::Application, Lifetime::User];
}

impl FromStr for Lifetime {
    type Err = MetricError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "ping" => Ok(Lifetime::Ping),
            "application" => Ok(Lifetime::Application),
            "user" => Ok(Lifetime::User),
            _ => Err(MetricError::UnknownLifetime(value.to_string())),
        }
    }
}

/// The metadata shared by every metric type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommonMetricData {
    /// The category of the metric, might be empty.
    pub category: String,
    /// The name of the metric within its category.
    pub name: String,
    /// The stores in which the metric value should be reported.
    pub send_in_pings: Vec<String>,
    /// The lifetime of the metric value.
    pub lifetime: Lifetime,
    /// Disabled metrics don't record any values.
    pub disabled: bool,
}

impl CommonMetricData {
    /// Returns the identifier of the metric, e.g. `telemetry.single_elapsed_test`.
    ///
    /// The category is omitted when it's empty.
    pub fn identifier(&self) -> String {
        if self.category.is_empty() {
            self.name.clone()
        } else {
            format!("{}{}{}", self.category, IDENTIFIER_SEPARATOR, self.name)
        }
    }

    /// Returns the stores in which the metric value should be reported.
    pub fn stores(&self) -> &[String] {
        &self.send_in_pings
    }

    /// Verify if the metric should record values.
    pub fn should_record(&self) -> bool {
        !self.disabled && !self.send_in_pings.is_empty()
    }
}
