//! Field rules shared by the drone registry and the telemetry log.
//!
//! Every check fails with [`Error::InvalidArgument`] naming the field.

use chrono::{DateTime, Datelike, Utc};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::{DronePatch, NewDrone, NewReading};
use crate::status;

/// Lower bound for percentage fields.
pub const PERCENT_MIN: f64 = 0.0;
/// Upper bound (inclusive) for percentage fields.
pub const PERCENT_MAX: f64 = 100.0;
/// Upper bound (exclusive) for headings.
pub const HEADING_MAX: f64 = 360.0;
/// Years that fit the stored four-digit timestamp format.
pub const TIMESTAMP_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

fn finite(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::invalid(field, format!("must be a finite number, got {value}")))
    }
}

/// A percentage in `[0, 100]` (battery, signal strength).
///
/// # Errors
///
/// Returns `InvalidArgument` if the value is outside the range or not finite.
pub fn percentage(field: &'static str, value: f64) -> Result<f64> {
    let value = finite(field, value)?;
    if (PERCENT_MIN..=PERCENT_MAX).contains(&value) {
        Ok(value)
    } else {
        Err(Error::invalid(
            field,
            format!("must be within [{PERCENT_MIN}, {PERCENT_MAX}], got {value}"),
        ))
    }
}

/// A non-negative velocity.
///
/// # Errors
///
/// Returns `InvalidArgument` if the value is negative or not finite.
pub fn velocity(value: f64) -> Result<f64> {
    let value = finite("velocity", value)?;
    if value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::invalid("velocity", format!("must be >= 0, got {value}")))
    }
}

/// A heading in `[0, 360)`.
///
/// # Errors
///
/// Returns `InvalidArgument` if the value is outside the range or not finite.
pub fn heading(value: f64) -> Result<f64> {
    let value = finite("heading", value)?;
    if (0.0..HEADING_MAX).contains(&value) {
        Ok(value)
    } else {
        Err(Error::invalid(
            "heading",
            format!("must be within [0, {HEADING_MAX}), got {value}"),
        ))
    }
}

/// A timestamp the store can write and read back in sortable form.
///
/// # Errors
///
/// Returns `InvalidArgument` if the year needs more than four digits or a sign.
pub fn timestamp(value: &DateTime<Utc>) -> Result<()> {
    if TIMESTAMP_YEARS.contains(&value.year()) {
        Ok(())
    } else {
        Err(Error::invalid(
            "timestamp",
            format!("year must be within 0000..=9999, got {}", value.year()),
        ))
    }
}

/// A drone name: anything but blank.
///
/// # Errors
///
/// Returns `InvalidArgument` if the name is empty or whitespace only.
pub fn name(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::invalid("name", "must not be blank"))
    } else {
        Ok(())
    }
}

/// Status strings are accepted as-is; unconventional ones are only logged.
fn note_status(value: &str) {
    if !status::is_conventional(value) {
        warn!("Accepting non-conventional drone status '{}'", value);
    }
}

/// Validate a registration.
///
/// # Errors
///
/// Returns `InvalidArgument` for a blank name or an out-of-range battery.
pub fn new_drone(drone: &NewDrone) -> Result<()> {
    name(&drone.name)?;
    percentage("battery", drone.battery)?;
    note_status(&drone.status);
    Ok(())
}

/// Validate only the fields a patch touches.
///
/// # Errors
///
/// Returns `InvalidArgument` for a blank name or an out-of-range battery.
pub fn drone_patch(patch: &DronePatch) -> Result<()> {
    if let Some(value) = &patch.name {
        name(value)?;
    }
    if let Some(value) = patch.battery {
        percentage("battery", value)?;
    }
    if let Some(value) = &patch.status {
        note_status(value);
    }
    Ok(())
}

/// Validate a telemetry reading before it is appended.
///
/// # Errors
///
/// Returns `InvalidArgument` naming the first field that breaks its range.
pub fn new_reading(reading: &NewReading) -> Result<()> {
    finite("position_x", reading.position_x)?;
    finite("position_y", reading.position_y)?;
    finite("position_z", reading.position_z)?;
    velocity(reading.velocity)?;
    heading(reading.heading)?;
    percentage("battery", reading.battery)?;
    percentage("signal_strength", reading.signal_strength)?;
    if let Some(value) = &reading.timestamp {
        timestamp(value)?;
    }
    note_status(&reading.status);
    Ok(())
}
