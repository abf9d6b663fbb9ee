//! `SQLite` schema definitions for dronehub.
//!
//! Range checks and referential rules live in the schema as well as in
//! [`crate::validate`]; the store has the final word when callers race.

/// SQL statement to create the drones table.
pub const CREATE_DRONES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS drones (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'idle',
    battery REAL NOT NULL DEFAULT 100.0 CHECK (battery >= 0 AND battery <= 100),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// SQL statement to create the telemetry table.
///
/// Readings are owned by their drone and go away with it.
pub const CREATE_TELEMETRY_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS telemetry (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    drone_id INTEGER NOT NULL REFERENCES drones(id) ON DELETE CASCADE,
    position_x REAL NOT NULL,
    position_y REAL NOT NULL,
    position_z REAL NOT NULL DEFAULT 0.0,
    velocity REAL NOT NULL DEFAULT 0.0 CHECK (velocity >= 0),
    heading REAL NOT NULL DEFAULT 0.0 CHECK (heading >= 0 AND heading < 360),
    battery REAL NOT NULL CHECK (battery >= 0 AND battery <= 100),
    signal_strength REAL NOT NULL DEFAULT 100.0
        CHECK (signal_strength >= 0 AND signal_strength <= 100),
    status TEXT NOT NULL,
    timestamp TEXT NOT NULL
)
";

/// SQL statement to create an index on timestamp for newest-first listing.
pub const CREATE_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_telemetry_timestamp ON telemetry(timestamp DESC)
";

/// SQL statement to create an index for per-drone listing and cascades.
pub const CREATE_DRONE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_telemetry_drone ON telemetry(drone_id, timestamp DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_DRONES_TABLE,
    CREATE_TELEMETRY_TABLE,
    CREATE_TIMESTAMP_INDEX,
    CREATE_DRONE_INDEX,
    CREATE_METADATA_TABLE,
];
