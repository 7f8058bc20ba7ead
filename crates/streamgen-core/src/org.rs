//! Organization identity and the stream layout derived from it

use crate::error::CoreError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Size class of an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgSize {
    #[default]
    Tiny,
    Small,
    Medium,
    Large,
}

impl OrgSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgSize::Tiny => "tiny",
            OrgSize::Small => "small",
            OrgSize::Medium => "medium",
            OrgSize::Large => "large",
        }
    }

    /// Number of simulated devices for this size.
    pub fn device_count(&self) -> usize {
        match self {
            OrgSize::Tiny => 10,
            OrgSize::Small => 7_500,
            OrgSize::Medium => 75_000,
            OrgSize::Large => 1_000_000,
        }
    }

    /// Number of shards to provision for the org's stream.
    pub fn shard_count(&self) -> u32 {
        match self {
            OrgSize::Tiny | OrgSize::Small => 1,
            OrgSize::Medium => 2,
            OrgSize::Large => 13,
        }
    }

    /// Draws a size: large 1%, tiny 9%, medium 10%, small 80%.
    pub fn guess<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let guess: f64 = rng.gen();
        if guess <= 0.01 {
            OrgSize::Large
        } else if guess < 0.1 {
            OrgSize::Tiny
        } else if guess < 0.2 {
            OrgSize::Medium
        } else {
            OrgSize::Small
        }
    }
}

impl fmt::Display for OrgSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrgSize {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(OrgSize::Tiny),
            "small" => Ok(OrgSize::Small),
            "medium" => Ok(OrgSize::Medium),
            "large" => Ok(OrgSize::Large),
            _ => Err(CoreError::UnknownOrgSize(s.to_string())),
        }
    }
}

/// Which workload model an organization runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseId {
    HeartbeatMessage,
    StructuredErrorMessage,
    TemperatureReading,
    BrokenTemperatureReading,
    DataChange,
}

impl CaseId {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseId::HeartbeatMessage => "heartbeat_message",
            CaseId::StructuredErrorMessage => "structured_error_message",
            CaseId::TemperatureReading => "temperature_reading",
            CaseId::BrokenTemperatureReading => "broken_temperature_reading",
            CaseId::DataChange => "data_change",
        }
    }

    /// Returns all cases.
    pub fn all() -> &'static [CaseId] {
        &[
            CaseId::HeartbeatMessage,
            CaseId::StructuredErrorMessage,
            CaseId::TemperatureReading,
            CaseId::BrokenTemperatureReading,
            CaseId::DataChange,
        ]
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CaseId::all()
            .iter()
            .copied()
            .find(|case| case.as_str() == s)
            .ok_or_else(|| CoreError::UnknownCase(s.to_string()))
    }
}

/// Builds the stream name for an organization.
pub fn stream_name(global_prefix: &str, case: CaseId, org_id: &str) -> String {
    format!("{}_{}_{}", global_prefix, case.as_str(), org_id)
}

/// Label tuple identifying an organization in metrics and logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrgLabels {
    pub org_id: String,
    pub case: CaseId,
    pub size: OrgSize,
}

impl OrgLabels {
    pub fn new(org_id: impl Into<String>, case: CaseId, size: OrgSize) -> Self {
        Self {
            org_id: org_id.into(),
            case,
            size,
        }
    }

    /// Stream name for this org under the given prefix.
    pub fn stream_name(&self, global_prefix: &str) -> String {
        stream_name(global_prefix, self.case, &self.org_id)
    }

    /// Shard count for this org's stream.
    pub fn shard_count(&self) -> u32 {
        self.size.shard_count()
    }
}

impl fmt::Display for OrgLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.org_id, self.case, self.size)
    }
}
