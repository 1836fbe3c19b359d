//! Rollup triggers, backfill, and HTTP range API for picotherm.
//!
//! This crate provides a service that:
//! - Rolls up the hot store into day, month, and year blobs as each UTC day
//!   closes
//! - Runs ad-hoc and backfill rollups over every registered device
//! - Exposes a REST API for range reads by device or location
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/devices` - Registered devices
//! - `GET /api/devices/{id}/range` - Measurements in `[start, end)`
//! - `GET /api/locations/{location}/range` - Same, by location
//! - `POST /api/rollup` - Run a rollup trigger
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/picotherm/picotherm.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! hot_path = "~/.local/share/picotherm/hot.db"
//! cold_path = "~/.local/share/picotherm/cold"
//!
//! [planner]
//! max_day_count = 5
//! max_month_count = 5
//!
//! [rollup]
//! concurrency = 4
//! schedule = true
//!
//! [[devices]]
//! id = "picotherm/1"
//! location = "Bedroom"
//! ```

pub mod api;
pub mod backfill;
pub mod config;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod trigger;

pub use backfill::backfill;
pub use config::{
    Config, ConfigError, DeviceConfig, RollupConfig, ServerConfig, StorageConfig, ValidationError,
};
pub use registry::{DeviceEntry, DeviceRegistry};
pub use scheduler::Scheduler;
pub use state::AppState;
pub use trigger::{DeviceOutcome, Trigger, TriggerRequest, TriggerSummary};
