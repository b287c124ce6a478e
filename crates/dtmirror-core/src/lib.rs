//! Core types and trait definitions for the Datatracker mirror.
//!
//! This crate holds the domain model, the [`source::RecordSource`] and
//! [`store::MirrorStore`] abstractions, and the sync loop that ties them
//! together. It has no HTTP or database dependencies of its own.

// Trait methods spell out `impl Future + Send`; impls may still use `async fn`.
#![allow(async_fn_in_trait)]

pub mod asset;
pub mod document;
pub mod error;
pub mod fs;
pub mod person;
pub mod source;
pub mod store;
pub mod sync;

pub use error::{BoxError, Error, FetchError, Malformed, RecordKey, Result};
