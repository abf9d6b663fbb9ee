//! `dronehub` - A drone registry with a time-ordered telemetry log
//!
//! This library provides the data layer (drone CRUD, telemetry append and
//! queries over SQLite) and the JSON HTTP API built on top of it.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod registry;
pub mod routes;
pub mod server;
pub mod status;
pub mod storage;
pub mod telemetry;
pub mod validate;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use logging::init_logging;
pub use model::{Drone, DronePatch, NewDrone, NewReading, Page, PageRequest, Reading};
pub use registry::DroneRegistry;
pub use server::AppState;
pub use status::DroneStatus;
pub use storage::{Storage, StorageStats};
pub use telemetry::TelemetryLog;
