//! Administrator alerts for resources that keep failing.
//!
//! The retrieval task decides *when* to alert; a [`Notifier`] decides *how*.
//! Delivery failures are reported back as errors and only ever logged by
//! the caller.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::resource::ResourceKind;

/// Side channel used to tell an administrator about a problem.
pub trait Notifier: Send + Sync {
    fn notify_admin(&self, subject: &str, message: &str) -> Result<()>;
}

/// Consecutive-failure counts at which a resource alerts, per kind.
///
/// Zero disables alerting for that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub camera: u32,
    pub map_loop: u32,
    pub weather_station: u32,
    pub unknown: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            camera: 5,
            map_loop: 5,
            weather_station: 10,
            unknown: 10,
        }
    }
}

impl AlertThresholds {
    pub fn for_kind(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::WeatherCamera => self.camera,
            ResourceKind::WeatherMapLoop => self.map_loop,
            ResourceKind::WeatherStation => self.weather_station,
            ResourceKind::Unknown => self.unknown,
        }
    }
}

/// Writes alerts to the error log.  Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_admin(&self, subject: &str, message: &str) -> Result<()> {
        error!(alert = subject, "{message}");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    subject: &'a str,
    message: &'a str,
}

/// Posts alerts as JSON to an HTTP endpoint (chat hook, mail relay, ...).
pub struct WebhookNotifier {
    url: String,
    client: reqwest::blocking::Client,
}

impl WebhookNotifier {
    /// Must be called outside of an async context.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("building webhook client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify_admin(&self, subject: &str, message: &str) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&WebhookBody { subject, message })
            .send()
            .with_context(|| format!("posting alert to {}", self.url))?
            .error_for_status()
            .context("alert webhook rejected the request")?;
        Ok(())
    }
}
