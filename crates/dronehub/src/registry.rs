//! Drone registry.
//!
//! Owns the set of drones and their name uniqueness. Each operation takes a
//! scoped session on the injected [`Storage`]; mutations run inside a single
//! transaction.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{ffi, params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{is_constraint, Error, Result};
use crate::model::{Drone, DronePatch, NewDrone, Page, PageRequest};
use crate::storage::{self, decode_timestamp, encode_timestamp, Storage};
use crate::validate;

const DRONE_COLUMNS: &str = "id, name, status, battery, created_at, updated_at";

/// CRUD access to drones.
#[derive(Debug, Clone)]
pub struct DroneRegistry {
    storage: Arc<Storage>,
}

impl DroneRegistry {
    /// Create a registry over the given store.
    #[must_use]
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Register a new drone.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the name is taken, `InvalidArgument` if a field is
    /// out of range, or a storage error.
    pub fn register(&self, new: &NewDrone) -> Result<Drone> {
        validate::new_drone(new)?;

        let mut session = self.storage.session()?;
        let tx = session.transaction()?;

        if find_id_by_name(&tx, &new.name)?.is_some() {
            return Err(Error::duplicate_name(&new.name));
        }

        let now = storage::now();
        let stamp = encode_timestamp(&now);
        tx.execute(
            r"
            INSERT INTO drones (name, status, battery, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ",
            params![new.name, new.status, new.battery, stamp],
        )
        .map_err(|e| unique_name_violation(e, &new.name))?;

        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!("Registered drone {} '{}'", id, new.name);
        Ok(Drone {
            id,
            name: new.name.clone(),
            status: new.status.clone(),
            battery: new.battery,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a drone by its ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no drone has this ID, or a storage error.
    pub fn get(&self, id: i64) -> Result<Drone> {
        let session = self.storage.session()?;
        fetch(&session, id)?.ok_or_else(|| Error::drone_not_found(id))
    }

    /// List drones in registration order.
    ///
    /// A window past the end yields an empty page; `total` is unaffected.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list(&self, page: PageRequest) -> Result<Page<Drone>> {
        let session = self.storage.session()?;

        let total: i64 = session.query_row("SELECT COUNT(*) FROM drones", [], |row| row.get(0))?;

        let mut stmt = session.prepare(&format!(
            "SELECT {DRONE_COLUMNS} FROM drones ORDER BY id ASC LIMIT ?1 OFFSET ?2"
        ))?;
        let items = stmt
            .query_map(params![page.sql_limit(), page.sql_offset()], row_to_drone)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Page {
            total: u64::try_from(total).unwrap_or(0),
            items,
        })
    }

    /// Apply a merge patch: only the fields present in `patch` change.
    ///
    /// An empty patch returns the drone untouched.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the drone is absent, `Conflict` if a new name is
    /// taken, `InvalidArgument` if a touched field is out of range, or a
    /// storage error.
    pub fn update(&self, id: i64, patch: &DronePatch) -> Result<Drone> {
        validate::drone_patch(patch)?;

        let mut session = self.storage.session()?;
        let tx = session.transaction()?;

        let current = fetch(&tx, id)?.ok_or_else(|| Error::drone_not_found(id))?;
        if patch.is_empty() {
            return Ok(current);
        }

        if let Some(name) = &patch.name {
            if find_id_by_name(&tx, name)?.is_some_and(|owner| owner != id) {
                return Err(Error::duplicate_name(name));
            }
        }

        let updated = Drone {
            name: patch.name.clone().unwrap_or(current.name),
            status: patch.status.clone().unwrap_or(current.status),
            battery: patch.battery.unwrap_or(current.battery),
            updated_at: next_updated_at(current.updated_at),
            ..current
        };

        tx.execute(
            "UPDATE drones SET name = ?1, status = ?2, battery = ?3, updated_at = ?4 WHERE id = ?5",
            params![
                updated.name,
                updated.status,
                updated.battery,
                encode_timestamp(&updated.updated_at),
                id
            ],
        )
        .map_err(|e| unique_name_violation(e, &updated.name))?;
        tx.commit()?;

        debug!("Updated drone {}", id);
        Ok(updated)
    }

    /// Delete a drone together with all of its telemetry.
    ///
    /// Returns the number of readings removed along with the drone.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the drone is absent, or a storage error. Nothing
    /// is removed when an error is returned.
    pub fn delete(&self, id: i64) -> Result<usize> {
        let mut session = self.storage.session()?;
        let tx = session.transaction()?;

        let readings = tx.execute("DELETE FROM telemetry WHERE drone_id = ?1", [id])?;
        let affected = tx.execute("DELETE FROM drones WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(Error::drone_not_found(id));
        }
        tx.commit()?;

        info!("Deleted drone {} and {} telemetry readings", id, readings);
        Ok(readings)
    }
}

/// Load a drone inside an existing session or transaction.
pub(crate) fn fetch(conn: &Connection, id: i64) -> Result<Option<Drone>> {
    let drone = conn
        .query_row(
            &format!("SELECT {DRONE_COLUMNS} FROM drones WHERE id = ?1"),
            [id],
            row_to_drone,
        )
        .optional()?;
    Ok(drone)
}

/// Check whether a drone exists.
pub(crate) fn exists(conn: &Connection, id: i64) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM drones WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Mirror a reading's battery and status onto its drone.
///
/// Must run in the same transaction as the reading insert.
pub(crate) fn apply_reading(conn: &Connection, id: i64, battery: f64, status: &str) -> Result<()> {
    let previous: Option<String> = conn
        .query_row("SELECT updated_at FROM drones WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;
    let previous = previous.ok_or_else(|| Error::drone_not_found(id))?;
    let updated_at = next_updated_at(decode_timestamp(0, &previous)?);

    conn.execute(
        "UPDATE drones SET battery = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
        params![battery, status, encode_timestamp(&updated_at), id],
    )?;
    Ok(())
}

fn find_id_by_name(conn: &Connection, name: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM drones WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id)
}

/// `updated_at` only ever moves forward, even within one clock tick.
fn next_updated_at(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = storage::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// The store's UNIQUE constraint settles registrations that raced past the
/// name check.
fn unique_name_violation(err: rusqlite::Error, name: &str) -> Error {
    if is_constraint(&err, ffi::SQLITE_CONSTRAINT_UNIQUE) {
        Error::duplicate_name(name)
    } else {
        err.into()
    }
}

fn row_to_drone(row: &rusqlite::Row) -> rusqlite::Result<Drone> {
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    Ok(Drone {
        id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        battery: row.get(3)?,
        created_at: decode_timestamp(4, &created_at)?,
        updated_at: decode_timestamp(5, &updated_at)?,
    })
}
