//! Core record types for dronehub.
//!
//! This module defines the drone and telemetry records exchanged with the
//! storage layer and the HTTP API, plus the pagination window used by the
//! list operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::DEFAULT_STATUS;

/// Battery level given to a drone registered without one.
pub const DEFAULT_BATTERY: f64 = 100.0;

/// Signal strength recorded when a reading omits it.
pub const DEFAULT_SIGNAL_STRENGTH: f64 = 100.0;

/// A tracked drone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    /// Identifier assigned by the storage layer.
    pub id: i64,
    /// Unique name.
    pub name: String,
    /// Last known status (conventionally one of [`crate::status::DroneStatus`]).
    pub status: String,
    /// Battery percentage in `[0, 100]`.
    pub battery: f64,
    /// When the drone was registered.
    pub created_at: DateTime<Utc>,
    /// When the drone was last mutated.
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when registering a drone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDrone {
    /// Unique name of the drone.
    pub name: String,
    /// Initial status.
    #[serde(default = "default_status")]
    pub status: String,
    /// Initial battery percentage.
    #[serde(default = "default_battery")]
    pub battery: f64,
}

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

fn default_battery() -> f64 {
    DEFAULT_BATTERY
}

fn default_signal_strength() -> f64 {
    DEFAULT_SIGNAL_STRENGTH
}

impl NewDrone {
    /// A registration with the default status and a full battery.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: default_status(),
            battery: DEFAULT_BATTERY,
        }
    }

    /// Set the initial status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Set the initial battery level.
    #[must_use]
    pub fn with_battery(mut self, battery: f64) -> Self {
        self.battery = battery;
        self
    }
}

/// A merge patch for a drone: only the fields that are `Some` are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DronePatch {
    /// New name.
    pub name: Option<String>,
    /// New status.
    pub status: Option<String>,
    /// New battery percentage.
    pub battery: Option<f64>,
}

impl DronePatch {
    /// True when the patch touches no field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.status.is_none() && self.battery.is_none()
    }
}

/// One stored telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Identifier assigned by the storage layer.
    pub id: i64,
    /// Owning drone.
    pub drone_id: i64,
    /// X coordinate.
    pub position_x: f64,
    /// Y coordinate.
    pub position_y: f64,
    /// Z coordinate (altitude).
    pub position_z: f64,
    /// Speed, never negative.
    pub velocity: f64,
    /// Direction in degrees, `[0, 360)`.
    pub heading: f64,
    /// Battery percentage in `[0, 100]`.
    pub battery: f64,
    /// Signal strength percentage in `[0, 100]`.
    pub signal_strength: f64,
    /// Status reported by the drone.
    pub status: String,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

/// Fields accepted when appending a telemetry reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    /// Drone the reading belongs to.
    pub drone_id: i64,
    /// X coordinate.
    pub position_x: f64,
    /// Y coordinate.
    pub position_y: f64,
    /// Z coordinate, 0 when omitted.
    #[serde(default)]
    pub position_z: f64,
    /// Speed, 0 when omitted.
    #[serde(default)]
    pub velocity: f64,
    /// Heading in degrees, 0 when omitted.
    #[serde(default)]
    pub heading: f64,
    /// Battery percentage.
    pub battery: f64,
    /// Signal strength, 100 when omitted.
    #[serde(default = "default_signal_strength")]
    pub signal_strength: f64,
    /// Status reported by the drone.
    pub status: String,
    /// Sample time; ingestion time when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewReading {
    /// A reading at ground level, standing still, with full signal.
    #[must_use]
    pub fn new(
        drone_id: i64,
        position_x: f64,
        position_y: f64,
        battery: f64,
        status: impl Into<String>,
    ) -> Self {
        Self {
            drone_id,
            position_x,
            position_y,
            position_z: 0.0,
            velocity: 0.0,
            heading: 0.0,
            battery,
            signal_strength: DEFAULT_SIGNAL_STRENGTH,
            status: status.into(),
            timestamp: None,
        }
    }

    /// Set the altitude.
    #[must_use]
    pub fn with_altitude(mut self, position_z: f64) -> Self {
        self.position_z = position_z;
        self
    }

    /// Set velocity and heading.
    #[must_use]
    pub fn with_motion(mut self, velocity: f64, heading: f64) -> Self {
        self.velocity = velocity;
        self.heading = heading;
        self
    }

    /// Set the signal strength.
    #[must_use]
    pub fn with_signal_strength(mut self, signal_strength: f64) -> Self {
        self.signal_strength = signal_strength;
        self
    }

    /// Pin the sample time instead of using ingestion time.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// An offset/limit window over a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Rows to skip.
    pub offset: u64,
    /// Maximum rows to return.
    pub limit: u64,
}

impl PageRequest {
    /// A window starting at `offset` holding at most `limit` rows.
    #[must_use]
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Build a window from caller-supplied values, clamping silently:
    /// negative values become 0 and `limit` is capped at `max_limit`.
    #[must_use]
    pub fn clamped(offset: i64, limit: i64, max_limit: u64) -> Self {
        let offset = u64::try_from(offset).unwrap_or(0);
        let limit = u64::try_from(limit).unwrap_or(0).min(max_limit);
        Self { offset, limit }
    }

    pub(crate) fn sql_offset(self) -> i64 {
        i64::try_from(self.offset).unwrap_or(i64::MAX)
    }

    pub(crate) fn sql_limit(self) -> i64 {
        i64::try_from(self.limit).unwrap_or(i64::MAX)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 100)
    }
}

/// One page of a list together with the unpaginated total.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Number of rows matching the query, ignoring the window.
    pub total: u64,
    /// Rows inside the window.
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// True when the window holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of rows inside the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_drone_defaults() {
        let drone = NewDrone::new("hawk-1");
        assert_eq!(drone.name, "hawk-1");
        assert_eq!(drone.status, "idle");
        assert!((drone.battery - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_new_drone_deserialize_defaults() {
        let drone: NewDrone = serde_json::from_str(r#"{"name": "hawk-2"}"#).unwrap();
        assert_eq!(drone, NewDrone::new("hawk-2"));
    }

    #[test]
    fn test_patch_deserialize_partial() {
        let patch: DronePatch = serde_json::from_str(r#"{"battery": 42}"#).unwrap();
        assert_eq!(patch.battery, Some(42.0));
        assert!(patch.name.is_none());
        assert!(patch.status.is_none());
        assert!(!patch.is_empty());
        assert!(DronePatch::default().is_empty());
    }

    #[test]
    fn test_new_reading_deserialize_defaults() {
        let json = r#"{"drone_id": 1, "position_x": 1.5, "position_y": -2.0,
                       "battery": 80, "status": "active"}"#;
        let reading: NewReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading, NewReading::new(1, 1.5, -2.0, 80.0, "active"));
        assert!(reading.timestamp.is_none());
    }

    #[test]
    fn test_new_reading_builders() {
        let ts = Utc::now();
        let reading = NewReading::new(4, 0.0, 0.0, 50.0, "returning")
            .with_altitude(120.0)
            .with_motion(12.5, 270.0)
            .with_signal_strength(64.0)
            .at(ts);
        assert!((reading.position_z - 120.0).abs() < f64::EPSILON);
        assert!((reading.velocity - 12.5).abs() < f64::EPSILON);
        assert!((reading.heading - 270.0).abs() < f64::EPSILON);
        assert!((reading.signal_strength - 64.0).abs() < f64::EPSILON);
        assert_eq!(reading.timestamp, Some(ts));
    }

    #[test]
    fn test_page_request_clamped() {
        assert_eq!(PageRequest::clamped(-5, 10, 100), PageRequest::new(0, 10));
        assert_eq!(PageRequest::clamped(3, -1, 100), PageRequest::new(3, 0));
        assert_eq!(PageRequest::clamped(0, 5000, 1000), PageRequest::new(0, 1000));
    }

    #[test]
    fn test_page_request_sql_bounds() {
        let page = PageRequest::new(u64::MAX, u64::MAX);
        assert_eq!(page.sql_offset(), i64::MAX);
        assert_eq!(page.sql_limit(), i64::MAX);
    }

    #[test]
    fn test_drone_serialization_field_names() {
        let drone = Drone {
            id: 1,
            name: "hawk-1".to_string(),
            status: "idle".to_string(),
            battery: 99.5,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&drone).unwrap();
        for field in ["id", "name", "status", "battery", "created_at", "updated_at"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }
}
