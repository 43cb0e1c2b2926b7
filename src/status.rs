//! The health-status filter the map is colored by.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::MapError;

/// The health status whose case counts are shown on the map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every case regardless of status.
    All,
    /// Cases that are still active.
    #[default]
    Active,
    /// Recovered cases.
    Recovered,
    /// Active cases without symptoms.
    Asymptomatic,
    /// Active cases with mild symptoms.
    Mild,
    /// Active cases with severe symptoms.
    Severe,
    /// Active cases in critical condition.
    Critical,
    /// Deaths.
    Died,
}

impl HealthStatus {
    /// All statuses in the order a filter control lists them.
    pub const ALL: [HealthStatus; 8] = [
        HealthStatus::All,
        HealthStatus::Active,
        HealthStatus::Recovered,
        HealthStatus::Asymptomatic,
        HealthStatus::Mild,
        HealthStatus::Severe,
        HealthStatus::Critical,
        HealthStatus::Died,
    ];

    /// The token used in URLs and query parameters.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::All => "all",
            HealthStatus::Active => "active",
            HealthStatus::Recovered => "recovered",
            HealthStatus::Asymptomatic => "asymptomatic",
            HealthStatus::Mild => "mild",
            HealthStatus::Severe => "severe",
            HealthStatus::Critical => "critical",
            HealthStatus::Died => "died",
        }
    }

    /// A human readable label for filter controls.
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::All => "All",
            HealthStatus::Active => "Active",
            HealthStatus::Recovered => "Recovered",
            HealthStatus::Asymptomatic => "Asymptomatic",
            HealthStatus::Mild => "Mild",
            HealthStatus::Severe => "Severe",
            HealthStatus::Critical => "Critical",
            HealthStatus::Died => "Deaths",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HealthStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| MapError::UnknownHealthStatus(s.to_string()))
    }
}
