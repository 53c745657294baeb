//! The resource record every other module reads.
//!
//! A [`Resource`] describes one pollable source: a web camera, a radar map
//! loop or a weather station.  Resources are created and edited elsewhere;
//! this crate only reads them, either from the settings file at startup or
//! from a control command at runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable key of a resource for the lifetime of its schedule entry.
pub type ResourceNumber = i32;

/// What sort of source a resource is.  Selects the alert threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    WeatherCamera,
    WeatherMapLoop,
    WeatherStation,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Declared payload format of a resource.
///
/// Only the image variants, `text` and `comma_separated_values` have a fetch
/// policy.  Everything else is accepted in configuration but never fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Jpeg,
    Gif,
    Png,
    Image,
    Text,
    CommaSeparatedValues,
    Mp4,
    Html,
    #[serde(other)]
    Unknown,
}

impl DataFormat {
    pub fn is_image(self) -> bool {
        matches!(self, Self::Jpeg | Self::Gif | Self::Png | Self::Image)
    }
}

/// When, during a local day, a resource is worth polling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "span", rename_all = "snake_case")]
pub enum CollectionSpan {
    /// Any time of day.
    #[default]
    FullTime,
    /// Between two whole local hours.  `end_hour == 0` means midnight at the
    /// end of the day.
    SpecifiedTimes { start_hour: u32, end_hour: u32 },
    /// From around sunrise to around sunset at the resource's location.
    DaylightHours,
}

/// Where a resource is, used for local time and daylight computations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Degrees, north positive.
    pub latitude: f64,
    /// Degrees, east positive.
    pub longitude: f64,
    /// Fixed offset of local time from UTC, in minutes.
    pub utc_offset_minutes: i32,
}

/// Largest UTC offset a [`Location`] may carry, in minutes either way.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 24 * 60 - 1;

impl Location {
    /// Offset lies strictly within one day of UTC.
    pub fn has_valid_offset(&self) -> bool {
        self.utc_offset_minutes.unsigned_abs() <= MAX_UTC_OFFSET_MINUTES.unsigned_abs()
    }
}

/// Configuration record for one externally pollable source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub number: ResourceNumber,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Seconds between the end of one poll and the start of the next.
    pub frequency_secs: u64,
    pub format: DataFormat,
    pub url: String,
    #[serde(default)]
    pub kind: ResourceKind,
    #[serde(default)]
    pub collection: CollectionSpan,
    #[serde(default)]
    pub location: Location,
}

fn default_active() -> bool {
    true
}

impl Resource {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.frequency_secs)
    }
}
