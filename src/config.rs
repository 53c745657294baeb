//! Service settings.
//!
//! Read from an optional TOML file and then from `WX_RETRIEVAL_*`
//! environment variables, later sources winning.  Nested keys use a double
//! underscore: `WX_RETRIEVAL_ALERT_THRESHOLDS__CAMERA=3`.
//!
//! ```toml
//! core_pool_size = 4
//! control_addr = "0.0.0.0:8091"
//! storage_root = "/var/lib/wx-retrieval"
//!
//! [alert_thresholds]
//! camera = 5
//!
//! [[resources]]
//! number = 7
//! name = "Roof camera"
//! frequency_secs = 60
//! format = "jpeg"
//! kind = "weather_camera"
//! url = "http://cam.example/roof.jpg"
//! collection = { span = "daylight_hours" }
//! location = { latitude = 41.0, longitude = -76.45, utc_offset_minutes = -300 }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::alert::AlertThresholds;
use crate::resource::{Resource, ResourceNumber};

pub const ENV_PREFIX: &str = "WX_RETRIEVAL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Threads that run ticks.
    pub core_pool_size: usize,
    pub control_addr: String,
    /// Control connections handled at once.
    pub control_workers: usize,
    /// Bounds HTTP connect/read and control reads.
    pub read_timeout_secs: u64,
    pub storage_root: PathBuf,
    pub daylight_offset_minutes: u32,
    /// Alerts are POSTed here when set; otherwise only logged.
    pub alert_webhook: Option<String>,
    pub alert_thresholds: AlertThresholds,
    /// Resources known at startup.
    pub resources: Vec<Resource>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            core_pool_size: 4,
            control_addr: "127.0.0.1:8091".into(),
            control_workers: 16,
            read_timeout_secs: 30,
            storage_root: PathBuf::from("./storage"),
            daylight_offset_minutes: 60,
            alert_webhook: None,
            alert_thresholds: AlertThresholds::default(),
            resources: Vec::new(),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }

    pub fn resource(&self, number: ResourceNumber) -> Option<&Resource> {
        self.resources.iter().find(|r| r.number == number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::resource::{CollectionSpan, DataFormat, ResourceKind};

    const SAMPLE: &str = r#"
core_pool_size = 8
storage_root = "/srv/wx"

[alert_thresholds]
camera = 3

[[resources]]
number = 7
name = "Roof camera"
frequency_secs = 60
format = "jpeg"
kind = "weather_camera"
url = "http://cam.example/roof.jpg"
collection = { span = "daylight_hours" }
location = { latitude = 41.0, longitude = -76.45, utc_offset_minutes = -300 }

[[resources]]
number = 12
name = "Station"
active = false
frequency_secs = 300
format = "comma_separated_values"
kind = "weather_station"
url = "https://www.wunderground.com/weatherstation/WXDailyHistory.asp?ID=X"
collection = { span = "specified_times", start_hour = 6, end_hour = 0 }
"#;

    fn write_sample() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_a_file() {
        let s = Settings::load(None).unwrap();
        assert_eq!(s.daylight_offset_minutes, 60);
        assert_eq!(s.alert_thresholds, AlertThresholds::default());
        assert!(s.resources.is_empty());
    }

    #[test]
    fn loads_resources_from_toml() {
        let file = write_sample();
        let s = Settings::load(Some(file.path())).unwrap();

        assert_eq!(s.core_pool_size, 8);
        assert_eq!(s.storage_root, PathBuf::from("/srv/wx"));
        assert_eq!(s.alert_thresholds.camera, 3);
        assert_eq!(s.alert_thresholds.map_loop, AlertThresholds::default().map_loop);

        let cam = s.resource(7).unwrap();
        assert_eq!(cam.format, DataFormat::Jpeg);
        assert_eq!(cam.kind, ResourceKind::WeatherCamera);
        assert_eq!(cam.collection, CollectionSpan::DaylightHours);
        assert_eq!(cam.location.utc_offset_minutes, -300);
        assert!(cam.active);

        let station = s.resource(12).unwrap();
        assert!(!station.active);
        assert_eq!(
            station.collection,
            CollectionSpan::SpecifiedTimes {
                start_hour: 6,
                end_hour: 0
            }
        );
        assert!(s.resource(99).is_none());
    }

    #[test]
    fn environment_overrides_file() {
        std::env::set_var("WX_RETRIEVAL_READ_TIMEOUT_SECS", "7");
        let file = write_sample();
        let s = Settings::load(Some(file.path())).unwrap();
        std::env::remove_var("WX_RETRIEVAL_READ_TIMEOUT_SECS");

        assert_eq!(s.read_timeout(), Duration::from_secs(7));
    }
}
