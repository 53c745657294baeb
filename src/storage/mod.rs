//! Storage sink abstraction.
//!
//! The retrieval engine persists instances through [`StorageSink`] only; the
//! backend is chosen by the caller and passed in.  [`FileStorage`] is the
//! backend the service binary uses.

mod file;

pub use file::FileStorage;

use chrono::{DateTime, Utc};

use crate::fetch::ResourceInstance;
use crate::resource::ResourceNumber;

/// Lookup key for a previously stored instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceRequest {
    pub resource_number: ResourceNumber,
    /// Newest instance captured at or before this time.
    pub at: DateTime<Utc>,
}

/// Persistence backend for fetched instances.
///
/// Both calls may block on I/O and are made from the blocking worker pool.
pub trait StorageSink: Send + Sync {
    /// Persist `instance`; `false` when it could not be stored.
    fn place(&self, instance: &ResourceInstance) -> bool;

    /// Read back a stored instance, if any matches.
    fn fetch_existing(&self, request: &InstanceRequest) -> Option<ResourceInstance>;
}
