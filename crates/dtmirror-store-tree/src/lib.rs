//! `dtmirror-store-tree`: a [`MirrorStore`](dtmirror_core::store::MirrorStore)
//! that keeps one JSON document per record in a directory tree, next to the
//! photos downloaded for each person.
//!
//! ```text
//! <root>/people/<id>/metadata.json
//! <root>/people/<id>/media/photo/<file>
//! <root>/documents/<name>/metadata.json
//! ```

mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::TreeStore;
