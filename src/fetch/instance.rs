//! The typed result of one successful fetch.
//!
//! Every fetch policy produces a [`ResourceInstance`]: the capture time and
//! resource number plus one of a closed set of payloads.  Storage and
//! logging never need to know which policy produced it.

use chrono::{DateTime, Utc};

use crate::resource::ResourceNumber;

/// One capture of a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInstance {
    pub resource_number: ResourceNumber,
    pub captured_at: DateTime<Utc>,
    pub payload: InstancePayload,
}

/// Payload variants, one per fetch policy.
#[derive(Debug, Clone, PartialEq)]
pub enum InstancePayload {
    /// A still image from a camera or a map loop frame.
    Image { kind: ImageKind, bytes: Vec<u8> },
    /// A plain-text weather station report.
    Text(String),
    /// A Weather Underground daily observation table.
    Csv(WeatherTable),
}

/// Image encodings recognised by their file signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
}

impl ImageKind {
    /// Identify an image by its leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
        }
    }
}

/// Parsed observation rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeatherTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Whether the station reports a `SolarRadiation` column.
    pub has_solar: bool,
}

impl WeatherTable {
    /// Render back to comma-separated text, header first.
    pub fn to_csv(&self) -> String {
        let mut out = self.headers.join(",");
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }
}

impl ResourceInstance {
    pub fn new(resource_number: ResourceNumber, payload: InstancePayload) -> Self {
        Self {
            resource_number,
            captured_at: Utc::now(),
            payload,
        }
    }

    /// File extension used when the instance is written out.
    pub fn extension(&self) -> &'static str {
        match &self.payload {
            InstancePayload::Image { kind, .. } => kind.extension(),
            InstancePayload::Text(_) => "txt",
            InstancePayload::Csv(_) => "csv",
        }
    }

    /// Serialized body as written by the storage sink.
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.payload {
            InstancePayload::Image { bytes, .. } => bytes.clone(),
            InstancePayload::Text(body) => body.clone().into_bytes(),
            InstancePayload::Csv(table) => table.to_csv().into_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        match &self.payload {
            InstancePayload::Image { bytes, .. } => bytes.len(),
            InstancePayload::Text(body) => body.len(),
            InstancePayload::Csv(table) => table.rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
