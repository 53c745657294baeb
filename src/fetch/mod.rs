//! Fetch policy abstraction.
//!
//! This module defines the [`Fetch`] trait, the [`ResourceInstance`] type it
//! produces and the [`FetchError`] it fails with.  The production policy,
//! [`HttpFetcher`], lives in the `http` submodule.
//!
//! A fetch policy performs exactly one network read per call and holds no
//! mutable state, so one instance is shared by every resource's task.

mod http;
mod instance;

pub use http::{is_weather_underground, parse_weather_underground, HttpFetcher};
pub use instance::{ImageKind, InstancePayload, ResourceInstance, WeatherTable};

use thiserror::Error;

use crate::resource::Resource;

/// Why a fetch produced nothing.
///
/// Every variant counts as a failed attempt for the consecutive-failure
/// counter.  `Io` and `Http` are transport failures; `Domain` means the
/// source answered with something that is not a valid instance.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid payload: {0}")]
    Domain(String),
}

impl FetchError {
    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain(_))
    }
}

/// Trait that every fetch policy implements.
///
/// Called from the blocking worker pool, so implementations may block, but
/// must bound every network read with a timeout.
pub trait Fetch: Send + Sync {
    /// Perform one retrieval attempt.
    ///
    /// `Ok(None)` means the resource's format has no fetch policy; that is
    /// not a failure.
    fn fetch(&self, resource: &Resource) -> Result<Option<ResourceInstance>, FetchError>;
}
