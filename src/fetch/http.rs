//! HTTP fetch policy.
//!
//! One blocking GET per call, dispatched on the resource's declared format:
//!
//! | format | payload |
//! |---|---|
//! | `jpeg`, `gif`, `png`, `image` | [`InstancePayload::Image`] |
//! | `text` | [`InstancePayload::Text`] |
//! | `comma_separated_values` from Weather Underground | [`InstancePayload::Csv`] |
//! | anything else | no instance |
//!
//! Parsing is kept in free functions with no I/O so it can be tested
//! without a network.

use std::time::Duration;

use super::{Fetch, FetchError, ImageKind, InstancePayload, ResourceInstance, WeatherTable};
use crate::resource::{DataFormat, Resource};

const WEATHER_UNDERGROUND_HOST: &str = "www.wunderground.com";

/// Fetch policy backed by a shared blocking [`reqwest`] client.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Build a fetcher whose connect and read are both bounded by `timeout`.
    ///
    /// Must be called outside of an async context; the blocking client owns
    /// its own runtime.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("wx-retrieval/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let body = self.client.get(url).send()?.error_for_status()?.bytes()?;
        Ok(body.to_vec())
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, resource: &Resource) -> Result<Option<ResourceInstance>, FetchError> {
        let payload = match resource.format {
            f if f.is_image() => parse_image(f, self.get(&resource.url)?)?,
            DataFormat::Text => InstancePayload::Text(parse_text(self.get(&resource.url)?)?),
            DataFormat::CommaSeparatedValues if is_weather_underground(resource) => {
                let body = parse_text(self.get(&resource.url)?)?;
                InstancePayload::Csv(parse_weather_underground(&body)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(ResourceInstance::new(resource.number, payload)))
    }
}

/// Only Weather Underground CSV exports have a known layout.
pub fn is_weather_underground(resource: &Resource) -> bool {
    resource.url.contains(WEATHER_UNDERGROUND_HOST)
}

fn parse_image(declared: DataFormat, bytes: Vec<u8>) -> Result<InstancePayload, FetchError> {
    let kind = ImageKind::sniff(&bytes)
        .ok_or_else(|| FetchError::domain(format!("not an image ({} bytes)", bytes.len())))?;

    let matches = match declared {
        DataFormat::Jpeg => kind == ImageKind::Jpeg,
        DataFormat::Png => kind == ImageKind::Png,
        DataFormat::Gif => kind == ImageKind::Gif,
        _ => true,
    };
    if !matches {
        return Err(FetchError::domain(format!(
            "declared {declared:?} but received {kind:?}"
        )));
    }

    Ok(InstancePayload::Image { kind, bytes })
}

fn parse_text(bytes: Vec<u8>) -> Result<String, FetchError> {
    let body = String::from_utf8(bytes).map_err(|e| FetchError::domain(e.to_string()))?;
    if body.trim().is_empty() {
        return Err(FetchError::domain("empty report"));
    }
    Ok(body)
}

/// Parse a Weather Underground daily export.
///
/// The export is CSV wrapped in HTML noise: `<!-- -->` comments and a
/// `<br>` after every row.  Lines before the `Time...` header are skipped
/// and rows whose width differs from the header are dropped.
pub fn parse_weather_underground(body: &str) -> Result<WeatherTable, FetchError> {
    let cleaned = strip_html_comments(body).replace("<br>", "");
    let mut lines = cleaned.lines().map(str::trim).filter(|l| !l.is_empty());

    let header = lines
        .by_ref()
        .find(|l| l.starts_with("Time"))
        .ok_or_else(|| FetchError::domain("no header line in observation table"))?;

    let headers = split_row(header);
    let rows = lines
        .map(split_row)
        .filter(|row| row.len() == headers.len())
        .collect();

    Ok(WeatherTable {
        has_solar: header.contains("SolarRadiation"),
        headers,
        rows,
    })
}

fn strip_html_comments(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        match rest[start..].find("-->") {
            Some(end) => rest = &rest[start + end + 3..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

// Rows end with a trailing comma.
fn split_row(line: &str) -> Vec<String> {
    line.trim_end_matches(',')
        .split(',')
        .map(|cell| cell.trim().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
