//! Directory-tree storage sink.
//!
//! Layout: `<root>/<resource-number>/<YYYYMMDD-HHMMSS>.<ext>`, one file per
//! instance, timestamps in UTC.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, error};

use super::{InstanceRequest, StorageSink};
use crate::fetch::{ImageKind, InstancePayload, ResourceInstance, WeatherTable};
use crate::resource::ResourceNumber;

const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) a storage tree at `root`.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resource_dir(&self, number: ResourceNumber) -> PathBuf {
        self.root.join(number.to_string())
    }

    /// Write `instance` and return the file it was written to.
    pub fn write(&self, instance: &ResourceInstance) -> io::Result<PathBuf> {
        let dir = self.resource_dir(instance.resource_number);
        fs::create_dir_all(&dir)?;
        let name = format!(
            "{}.{}",
            instance.captured_at.format(STAMP_FORMAT),
            instance.extension()
        );
        let path = dir.join(name);
        fs::write(&path, instance.to_bytes())?;
        Ok(path)
    }

    /// Newest stored file at or before `request.at`.
    fn find(&self, request: &InstanceRequest) -> io::Result<Option<(DateTime<Utc>, PathBuf)>> {
        let dir = self.resource_dir(request.resource_number);
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut best: Option<(DateTime<Utc>, PathBuf)> = None;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(stamp) = path.file_stem().and_then(|s| s.to_str()).and_then(parse_stamp) else {
                continue;
            };
            if stamp > request.at {
                continue;
            }
            if best.as_ref().map_or(true, |(t, _)| stamp > *t) {
                best = Some((stamp, path));
            }
        }
        Ok(best)
    }
}

impl StorageSink for FileStorage {
    fn place(&self, instance: &ResourceInstance) -> bool {
        match self.write(instance) {
            Ok(path) => {
                debug!(resource = instance.resource_number, path = %path.display(), "stored instance");
                true
            }
            Err(e) => {
                error!(resource = instance.resource_number, "could not write instance: {e}");
                false
            }
        }
    }

    fn fetch_existing(&self, request: &InstanceRequest) -> Option<ResourceInstance> {
        let (captured_at, path) = match self.find(request) {
            Ok(found) => found?,
            Err(e) => {
                error!(resource = request.resource_number, "could not scan storage: {e}");
                return None;
            }
        };

        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                error!(path = %path.display(), "could not read instance: {e}");
                return None;
            }
        };

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let payload = decode(ext, bytes)?;
        Some(ResourceInstance {
            resource_number: request.resource_number,
            captured_at,
            payload,
        })
    }
}

fn parse_stamp(stem: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(stem, STAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn decode(ext: &str, bytes: Vec<u8>) -> Option<InstancePayload> {
    match ext {
        "jpg" | "png" | "gif" => {
            let kind = ImageKind::sniff(&bytes)?;
            Some(InstancePayload::Image { kind, bytes })
        }
        "txt" => String::from_utf8(bytes).ok().map(InstancePayload::Text),
        "csv" => {
            let text = String::from_utf8(bytes).ok()?;
            let mut lines = text.lines();
            let header = lines.next()?;
            let split = |l: &str| l.split(',').map(str::to_string).collect::<Vec<_>>();
            Some(InstancePayload::Csv(WeatherTable {
                headers: split(header),
                rows: lines.filter(|l| !l.is_empty()).map(split).collect(),
                has_solar: header.contains("SolarRadiation"),
            }))
        }
        _ => None,
    }
}
