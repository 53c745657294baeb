//! Per-resource poll-and-store cycle.
//!
//! A [`RetrievalTask`] is created once when a resource is scheduled and is
//! reused by every tick of that resource.  The scheduler runs its ticks one
//! after another, never concurrently, so the consecutive-failure counter is
//! plain owned state.
//!
//! ## One tick
//!
//! 1. Outside the resource's collection window: nothing happens.
//! 2. Fetch via the shared [`Fetch`] policy.
//! 3. Success resets the counter and hands the instance to storage.  A
//!    storage failure is logged; it is not a fetch failure and is not
//!    retried.
//! 4. Failure increments the counter.  When the counter *reaches* the
//!    threshold for the resource's kind, one alert is sent.  Further
//!    failures stay silent until a success resets the counter.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::alert::{AlertThresholds, Notifier};
use crate::collection;
use crate::fetch::{Fetch, FetchError};
use crate::resource::Resource;
use crate::storage::StorageSink;

/// Collaborators shared by every resource's task.
#[derive(Clone)]
pub struct RetrievalContext {
    pub fetcher: Arc<dyn Fetch>,
    pub storage: Arc<dyn StorageSink>,
    pub notifier: Arc<dyn Notifier>,
    pub thresholds: AlertThresholds,
    pub daylight_offset_minutes: u32,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Fetched and stored.
    Stored,
    /// Fetched, but the storage sink refused it.
    StorageFailed,
    /// Outside the collection window; nothing fetched.
    OutOfWindow,
    /// The resource's format has no fetch policy.
    UnsupportedFormat,
    /// The fetch failed.
    FetchFailed {
        /// The source answered with an invalid payload rather than an I/O
        /// error.
        domain: bool,
        /// Counter value after this failure.
        consecutive: u32,
        /// This failure crossed the alert threshold.
        alerted: bool,
    },
}

pub struct RetrievalTask {
    resource: Resource,
    ctx: RetrievalContext,
    threshold: u32,
    consecutive_failures: u32,
}

impl RetrievalTask {
    pub fn new(resource: Resource, ctx: RetrievalContext) -> Self {
        let threshold = ctx.thresholds.for_kind(resource.kind);
        Self {
            resource,
            ctx,
            threshold,
            consecutive_failures: 0,
        }
    }

    /// Resume a resource whose previous task was lost mid-tick, keeping
    /// its run of failures.
    pub fn with_failures(resource: Resource, ctx: RetrievalContext, consecutive_failures: u32) -> Self {
        Self {
            consecutive_failures,
            ..Self::new(resource, ctx)
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one tick against the current time.
    pub fn tick(&mut self) -> TickOutcome {
        self.tick_at(Utc::now())
    }

    /// Run one tick as if the time were `now`.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let number = self.resource.number;

        if !collection::is_collection_time(&self.resource, now, self.ctx.daylight_offset_minutes) {
            debug!(resource = number, "outside collection window");
            return TickOutcome::OutOfWindow;
        }

        debug!(resource = number, url = %self.resource.url, "fetching");
        match self.ctx.fetcher.fetch(&self.resource) {
            Ok(None) => {
                self.consecutive_failures = 0;
                debug!(resource = number, format = ?self.resource.format, "no fetch policy for format");
                TickOutcome::UnsupportedFormat
            }
            Ok(Some(instance)) => {
                self.consecutive_failures = 0;
                if self.ctx.storage.place(&instance) {
                    debug!(resource = number, bytes = instance.len(), "stored");
                    TickOutcome::Stored
                } else {
                    error!(resource = number, name = %self.resource.name, "error storing instance");
                    TickOutcome::StorageFailed
                }
            }
            Err(e) => self.record_failure(e),
        }
    }

    fn record_failure(&mut self, err: FetchError) -> TickOutcome {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let consecutive = self.consecutive_failures;
        error!(
            resource = self.resource.number,
            url = %self.resource.url,
            consecutive,
            "could not obtain {}: {err}",
            self.resource.name
        );

        let alerted = self.threshold != 0 && consecutive == self.threshold;
        if alerted {
            self.send_alert();
        }

        TickOutcome::FetchFailed {
            domain: err.is_domain(),
            consecutive,
            alerted,
        }
    }

    fn send_alert(&self) {
        let name = &self.resource.name;
        let subject = format!("Resource {name} is currently unavailable.");
        let message = format!(
            "Resource {name} (#{}) is currently unavailable. {} consecutive attempts have failed to retrieve data.",
            self.resource.number, self.consecutive_failures
        );
        if let Err(e) = self.ctx.notifier.notify_admin(&subject, &message) {
            warn!(resource = self.resource.number, "unable to notify administrators: {e:#}");
        }
    }
}
