//! wx-retrieval: scheduled retrieval of weather cameras, map loops and
//! station tables.
//!
//! ## Architecture overview
//!
//! ```text
//!  START / STOP    ┌────────────┐ start_or_update ┌─────────────┐
//! ───────────────► │  control   │ ──────────────► │  scheduler  │
//!   (TCP, JSON)    │ (endpoint) │      stop       │ (job map)   │
//!                  └────────────┘                 └──────┬──────┘
//!                                                        │ tick (blocking pool)
//!                                                        ▼
//!  ┌────────────┐  is_collection_time  ┌─────────────────────────┐
//!  │ collection │ ◄─────────────────── │       retrieval         │
//!  └────────────┘                      │ (counter, alert edge)   │
//!                                      └───┬─────────┬────────┬──┘
//!                                    fetch │   place │  alert │
//!                                          ▼         ▼        ▼
//!                                     ┌───────┐ ┌─────────┐ ┌───────┐
//!                                     │ fetch │ │ storage │ │ alert │
//!                                     └───────┘ └─────────┘ └───────┘
//! ```
//!
//! * **`resource`**: the resource record and its enums.
//! * **`collection`**: whether "now" is inside a resource's collection
//!   window (all day, fixed hours, or daylight).
//! * **`fetch`**: the [`fetch::Fetch`] trait and the HTTP policy for
//!   images, text and station CSV.
//! * **`storage`**: the [`storage::StorageSink`] trait and a file-tree sink.
//! * **`alert`**: administrator notification and per-kind thresholds.
//! * **`retrieval`**: one resource's tick: fetch, store, count failures.
//! * **`scheduler`**: one fixed-delay job per resource.
//! * **`control`**: the TCP command endpoint and its client.
//! * **`config`**: settings from TOML and the environment.

pub mod alert;
pub mod collection;
pub mod config;
pub mod control;
pub mod fetch;
pub mod resource;
pub mod retrieval;
pub mod scheduler;
pub mod storage;
