//! `dtmirror-datatracker`: the IETF Datatracker as a
//! [`RecordSource`](dtmirror_core::source::RecordSource) and
//! [`AssetFetcher`](dtmirror_core::asset::AssetFetcher).
//!
//! Listings come from the Tastypie REST API under `/api/v1/`. Related
//! objects arrive as resource URIs and are resolved to ids here, so nothing
//! downstream ever sees a URI other than asset locations.

mod cache;
mod client;
mod wire;

pub mod error;

pub use cache::DiskCache;
pub use client::{ClientConfig, DatatrackerClient};
pub use error::{Error, Result};
