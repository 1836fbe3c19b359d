//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A device known to the hot store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDevice {
    /// Device identifier.
    pub id: String,
    /// Human-readable location, e.g. "Bedroom".
    pub location: Option<String>,
    /// First time a reading was stored for this device.
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    /// Last time a reading was stored for this device.
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}
