//! Telemetry log.
//!
//! Append-only history of readings, each owned by one drone. Appending a
//! reading also mirrors its battery and status onto the drone, in the same
//! transaction as the insert.

use std::sync::Arc;

use chrono::{Duration, SubsecRound};
use rusqlite::{ffi, params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{is_constraint, Error, Result};
use crate::model::{NewReading, Page, PageRequest, Reading};
use crate::registry;
use crate::storage::{self, decode_timestamp, encode_timestamp, Storage};
use crate::validate;

const READING_COLUMNS: &str = "id, drone_id, position_x, position_y, position_z, velocity, \
     heading, battery, signal_strength, status, timestamp";

/// Append and query access to telemetry readings.
#[derive(Debug, Clone)]
pub struct TelemetryLog {
    storage: Arc<Storage>,
}

impl TelemetryLog {
    /// Create a log over the given store.
    #[must_use]
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Append a reading and mirror its battery and status onto the drone.
    ///
    /// Both effects commit together or not at all.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the drone does not exist, `InvalidArgument` if a
    /// field is out of range, or a storage error.
    pub fn append(&self, new: &NewReading) -> Result<Reading> {
        validate::new_reading(new)?;

        let timestamp = new
            .timestamp
            .map_or_else(storage::now, |ts| ts.trunc_subsecs(6));

        let mut session = self.storage.session()?;
        let tx = session.transaction()?;

        registry::apply_reading(&tx, new.drone_id, new.battery, &new.status)?;

        tx.execute(
            r"
            INSERT INTO telemetry (drone_id, position_x, position_y, position_z, velocity,
                                   heading, battery, signal_strength, status, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                new.drone_id,
                new.position_x,
                new.position_y,
                new.position_z,
                new.velocity,
                new.heading,
                new.battery,
                new.signal_strength,
                new.status,
                encode_timestamp(&timestamp),
            ],
        )
        .map_err(|e| {
            if is_constraint(&e, ffi::SQLITE_CONSTRAINT_FOREIGNKEY) {
                Error::drone_not_found(new.drone_id)
            } else {
                e.into()
            }
        })?;

        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!("Appended reading {} for drone {}", id, new.drone_id);
        Ok(Reading {
            id,
            drone_id: new.drone_id,
            position_x: new.position_x,
            position_y: new.position_y,
            position_z: new.position_z,
            velocity: new.velocity,
            heading: new.heading,
            battery: new.battery,
            signal_strength: new.signal_strength,
            status: new.status.clone(),
            timestamp,
        })
    }

    /// List readings newest first, optionally only those of one drone.
    ///
    /// Filtering by a drone that does not exist yields an empty page.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list(&self, drone_id: Option<i64>, page: PageRequest) -> Result<Page<Reading>> {
        let session = self.storage.session()?;
        query_page(&session, drone_id, page)
    }

    /// List one drone's readings newest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the drone does not exist, or a storage error.
    pub fn list_for_drone(&self, drone_id: i64, page: PageRequest) -> Result<Page<Reading>> {
        let session = self.storage.session()?;
        if !registry::exists(&session, drone_id)? {
            return Err(Error::drone_not_found(drone_id));
        }
        query_page(&session, Some(drone_id), page)
    }

    /// The most recent reading of a drone. Equal timestamps resolve to the
    /// reading inserted last.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the drone does not exist, `NoData` if it has no
    /// readings, or a storage error.
    pub fn latest(&self, drone_id: i64) -> Result<Reading> {
        let session = self.storage.session()?;
        if !registry::exists(&session, drone_id)? {
            return Err(Error::drone_not_found(drone_id));
        }

        session
            .query_row(
                &format!(
                    "SELECT {READING_COLUMNS} FROM telemetry WHERE drone_id = ?1
                     ORDER BY timestamp DESC, id DESC LIMIT 1"
                ),
                [drone_id],
                row_to_reading,
            )
            .optional()?
            .ok_or(Error::NoData { drone_id })
    }

    /// Delete one reading. The owning drone keeps its current battery and
    /// status.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the reading does not exist, or a storage error.
    pub fn delete(&self, id: i64) -> Result<()> {
        let session = self.storage.session()?;
        let affected = session.execute("DELETE FROM telemetry WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(Error::reading_not_found(id));
        }
        debug!("Deleted reading {}", id);
        Ok(())
    }

    /// Remove readings older than `max_age`.
    ///
    /// Returns the number of readings deleted. Drones are left untouched.
    /// An age reaching past the earliest representable time prunes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_older_than(&self, max_age: Duration) -> Result<usize> {
        let Some(cutoff) = storage::now().checked_sub_signed(max_age) else {
            debug!("Prune cutoff precedes the earliest timestamp, nothing to do");
            return Ok(0);
        };
        let cutoff = encode_timestamp(&cutoff);

        let session = self.storage.session()?;
        let affected = session.execute("DELETE FROM telemetry WHERE timestamp < ?1", [cutoff])?;

        if affected > 0 {
            info!("Pruned {} old telemetry readings", affected);
        }
        Ok(affected)
    }
}

fn query_page(conn: &Connection, drone_id: Option<i64>, page: PageRequest) -> Result<Page<Reading>> {
    let (total, items) = if let Some(drone_id) = drone_id {
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM telemetry WHERE drone_id = ?1",
            [drone_id],
            |row| row.get(0),
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {READING_COLUMNS} FROM telemetry WHERE drone_id = ?1
             ORDER BY timestamp DESC, id DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let items = stmt
            .query_map(
                params![drone_id, page.sql_limit(), page.sql_offset()],
                row_to_reading,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        (total, items)
    } else {
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM telemetry", [], |row| row.get(0))?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {READING_COLUMNS} FROM telemetry
             ORDER BY timestamp DESC, id DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let items = stmt
            .query_map(params![page.sql_limit(), page.sql_offset()], row_to_reading)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        (total, items)
    };

    Ok(Page {
        total: u64::try_from(total).unwrap_or(0),
        items,
    })
}

fn row_to_reading(row: &rusqlite::Row) -> rusqlite::Result<Reading> {
    let timestamp: String = row.get(10)?;

    Ok(Reading {
        id: row.get(0)?,
        drone_id: row.get(1)?,
        position_x: row.get(2)?,
        position_y: row.get(3)?,
        position_z: row.get(4)?,
        velocity: row.get(5)?,
        heading: row.get(6)?,
        battery: row.get(7)?,
        signal_strength: row.get(8)?,
        status: row.get(9)?,
        timestamp: decode_timestamp(10, &timestamp)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::error::ErrorKind;
    use crate::model::NewDrone;
    use crate::registry::DroneRegistry;

    struct Fixture {
        registry: DroneRegistry,
        log: TelemetryLog,
    }

    fn create_fixture() -> Fixture {
        let storage = Arc::new(Storage::open_in_memory().expect("failed to create test storage"));
        Fixture {
            registry: DroneRegistry::new(Arc::clone(&storage)),
            log: TelemetryLog::new(storage),
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    fn reading(drone_id: i64, battery: f64, status: &str) -> NewReading {
        NewReading::new(drone_id, 1.0, 2.0, battery, status)
    }

    #[test]
    fn test_append_updates_drone() {
        let fx = create_fixture();
        let drone = fx.registry.register(&NewDrone::new("hawk-1")).unwrap();

        let stored = fx.log.append(&reading(drone.id, 73.5, "active")).unwrap();
        assert_eq!(stored.drone_id, drone.id);
        assert!((stored.position_z).abs() < f64::EPSILON);
        assert!((stored.signal_strength - 100.0).abs() < f64::EPSILON);

        let updated = fx.registry.get(drone.id).unwrap();
        assert!((updated.battery - 73.5).abs() < f64::EPSILON);
        assert_eq!(updated.status, "active");
        assert!(updated.updated_at > drone.updated_at);
        assert_eq!(updated.name, drone.name);
    }

    #[test]
    fn test_append_defaults_timestamp_to_now() {
        let fx = create_fixture();
        let drone = fx.registry.register(&NewDrone::new("hawk-1")).unwrap();

        let before = storage::now();
        let stored = fx.log.append(&reading(drone.id, 50.0, "active")).unwrap();
        assert!(stored.timestamp >= before);
        assert!(stored.timestamp <= storage::now());
    }

    #[test]
    fn test_append_unknown_drone_persists_nothing() {
        let fx = create_fixture();
        let err = fx.log.append(&reading(42, 50.0, "active")).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("42"));

        assert_eq!(fx.log.list(None, PageRequest::default()).unwrap().total, 0);
    }

    #[test]
    fn test_append_invalid_reading_changes_nothing() {
        let fx = create_fixture();
        let drone = fx.registry.register(&NewDrone::new("hawk-1")).unwrap();

        let bad = reading(drone.id, 10.0, "error").with_motion(-3.0, 0.0);
        let err = fx.log.append(&bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert_eq!(fx.registry.get(drone.id).unwrap(), drone);
        assert_eq!(fx.log.list(None, PageRequest::default()).unwrap().total, 0);
    }

    #[test]
    fn test_list_newest_first_and_filter() {
        let fx = create_fixture();
        let a = fx.registry.register(&NewDrone::new("a")).unwrap();
        let b = fx.registry.register(&NewDrone::new("b")).unwrap();

        for minute in [1, 3, 2] {
            fx.log
                .append(&reading(a.id, 90.0, "active").at(at(minute)))
                .unwrap();
        }
        fx.log.append(&reading(b.id, 80.0, "idle").at(at(5))).unwrap();

        let all = fx.log.list(None, PageRequest::default()).unwrap();
        assert_eq!(all.total, 4);
        assert_eq!(all.items[0].drone_id, b.id);

        let only_a = fx.log.list(Some(a.id), PageRequest::default()).unwrap();
        assert_eq!(only_a.total, 3);
        let times: Vec<_> = only_a.items.iter().map(|r| r.timestamp).collect();
        assert_eq!(times, [at(3), at(2), at(1)]);
    }

    #[test]
    fn test_list_unknown_drone_filter_is_empty() {
        let fx = create_fixture();
        let page = fx.log.list(Some(999), PageRequest::default()).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.is_empty());
    }

    #[test]
    fn test_list_window_past_end() {
        let fx = create_fixture();
        let drone = fx.registry.register(&NewDrone::new("a")).unwrap();
        for _ in 0..3 {
            fx.log.append(&reading(drone.id, 50.0, "active")).unwrap();
        }

        let page = fx.log.list(None, PageRequest::new(3, 10)).unwrap();
        assert_eq!(page.total, 3);
        assert!(page.is_empty());

        let page = fx.log.list_for_drone(drone.id, PageRequest::new(1, 1)).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn test_list_for_drone_distinguishes_missing_drone() {
        let fx = create_fixture();
        let drone = fx.registry.register(&NewDrone::new("a")).unwrap();

        let page = fx.log.list_for_drone(drone.id, PageRequest::default()).unwrap();
        assert_eq!(page.total, 0);

        let err = fx
            .log
            .list_for_drone(drone.id + 1, PageRequest::default())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_latest() {
        let fx = create_fixture();
        let drone = fx.registry.register(&NewDrone::new("a")).unwrap();

        let err = fx.log.latest(drone.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoData);

        let err = fx.log.latest(drone.id + 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        fx.log
            .append(&reading(drone.id, 90.0, "active").at(at(10)))
            .unwrap();
        let newest = fx
            .log
            .append(&reading(drone.id, 80.0, "returning").at(at(20)))
            .unwrap();
        fx.log
            .append(&reading(drone.id, 70.0, "active").at(at(15)))
            .unwrap();

        assert_eq!(fx.log.latest(drone.id).unwrap(), newest);
    }

    #[test]
    fn test_latest_tie_prefers_last_inserted() {
        let fx = create_fixture();
        let drone = fx.registry.register(&NewDrone::new("a")).unwrap();

        fx.log
            .append(&reading(drone.id, 90.0, "active").at(at(1)))
            .unwrap();
        let second = fx
            .log
            .append(&reading(drone.id, 85.0, "active").at(at(1)))
            .unwrap();

        assert_eq!(fx.log.latest(drone.id).unwrap().id, second.id);
    }

    #[test]
    fn test_delete_reading_keeps_drone_state() {
        let fx = create_fixture();
        let drone = fx.registry.register(&NewDrone::new("a")).unwrap();
        fx.log.append(&reading(drone.id, 60.0, "active")).unwrap();
        let last = fx.log.append(&reading(drone.id, 30.0, "returning")).unwrap();
        let before = fx.registry.get(drone.id).unwrap();

        fx.log.delete(last.id).unwrap();

        assert_eq!(fx.registry.get(drone.id).unwrap(), before);
        assert_eq!(fx.log.list(None, PageRequest::default()).unwrap().total, 1);
        assert!(fx.log.delete(last.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_drone_cascades_readings() {
        let fx = create_fixture();
        let keep = fx.registry.register(&NewDrone::new("keep")).unwrap();
        let gone = fx.registry.register(&NewDrone::new("gone")).unwrap();
        for _ in 0..4 {
            fx.log.append(&reading(gone.id, 50.0, "active")).unwrap();
        }
        fx.log.append(&reading(keep.id, 50.0, "active")).unwrap();

        assert_eq!(fx.registry.delete(gone.id).unwrap(), 4);

        let err = fx
            .log
            .list_for_drone(gone.id, PageRequest::default())
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fx.log.list(Some(gone.id), PageRequest::default()).unwrap().total, 0);
        assert_eq!(fx.log.list(None, PageRequest::default()).unwrap().total, 1);
    }

    #[test]
    fn test_foreign_key_cascade_in_store() {
        let fx = create_fixture();
        let drone = fx.registry.register(&NewDrone::new("a")).unwrap();
        fx.log.append(&reading(drone.id, 50.0, "active")).unwrap();

        let session = fx.log.storage.session().unwrap();
        session
            .execute("DELETE FROM drones WHERE id = ?1", [drone.id])
            .unwrap();
        let orphans: i64 = session
            .query_row("SELECT COUNT(*) FROM telemetry", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_prune_older_than() {
        let fx = create_fixture();
        let drone = fx.registry.register(&NewDrone::new("a")).unwrap();
        fx.log
            .append(&reading(drone.id, 50.0, "active").at(at(0)))
            .unwrap();
        fx.log.append(&reading(drone.id, 40.0, "active")).unwrap();
        let before = fx.registry.get(drone.id).unwrap();

        assert_eq!(fx.log.prune_older_than(Duration::days(1)).unwrap(), 1);
        assert_eq!(fx.log.list(None, PageRequest::default()).unwrap().total, 1);
        assert_eq!(fx.registry.get(drone.id).unwrap(), before);
    }

    #[test]
    fn test_prune_with_huge_age_removes_nothing() {
        let fx = create_fixture();
        let drone = fx.registry.register(&NewDrone::new("a")).unwrap();
        fx.log
            .append(&reading(drone.id, 50.0, "active").at(at(0)))
            .unwrap();

        let removed = fx
            .log
            .prune_older_than(Duration::days(i64::from(u32::MAX)))
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(fx.log.list(None, PageRequest::default()).unwrap().total, 1);
    }

    #[test]
    fn test_append_rejects_unencodable_timestamp() {
        let fx = create_fixture();
        let drone = fx.registry.register(&NewDrone::new("a")).unwrap();
        let far_future = Utc.with_ymd_and_hms(10_000, 1, 1, 0, 0, 0).unwrap();

        let err = fx
            .log
            .append(&reading(drone.id, 10.0, "active").at(far_future))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert!(fx.log.list(None, PageRequest::default()).unwrap().is_empty());
        assert!(matches!(
            fx.log.latest(drone.id),
            Err(Error::NoData { .. })
        ));
        let unchanged = fx.registry.get(drone.id).unwrap();
        assert!((unchanged.battery - drone.battery).abs() < f64::EPSILON);
    }

    #[test]
    fn test_end_to_end_lifecycle() {
        let fx = create_fixture();
        let a = fx.registry.register(&NewDrone::new("A")).unwrap();

        let mut appended = Vec::new();
        for minute in [1, 2, 3] {
            appended.push(
                fx.log
                    .append(&reading(a.id, 90.0 - f64::from(minute), "active").at(at(minute)))
                    .unwrap(),
            );
        }

        let page = fx.log.list(Some(a.id), PageRequest::default()).unwrap();
        let ids: Vec<_> = page.items.iter().map(|r| r.id).collect();
        assert_eq!(ids, [appended[2].id, appended[1].id, appended[0].id]);
        assert_eq!(fx.log.latest(a.id).unwrap(), appended[2]);

        fx.registry.delete(a.id).unwrap();
        assert!(fx.registry.get(a.id).unwrap_err().is_not_found());
    }
}
