//! Conventional drone status vocabulary.
//!
//! Status strings are stored as given; this vocabulary is what the fleet
//! normally reports and is used to flag unusual values in the logs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status given to newly registered drones.
pub const DEFAULT_STATUS: &str = "idle";

/// The statuses drones conventionally report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneStatus {
    /// On the ground, waiting.
    Idle,
    /// Flying a mission.
    Active,
    /// Heading back to base.
    Returning,
    /// Reporting a fault.
    Error,
    /// Not reachable.
    Offline,
}

impl DroneStatus {
    /// Every conventional status.
    pub const ALL: [Self; 5] = [
        Self::Idle,
        Self::Active,
        Self::Returning,
        Self::Error,
        Self::Offline,
    ];

    /// The stored string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Returning => "returning",
            Self::Error => "error",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for DroneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is outside the conventional vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown drone status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for DroneStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// True if `status` is one of the conventional values (exact match).
#[must_use]
pub fn is_conventional(status: &str) -> bool {
    status.parse::<DroneStatus>().is_ok()
}
