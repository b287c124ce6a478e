//! Documents (Internet-Drafts, RFCs, charters, ...) in the remote catalog.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::person::PersonId;

/// Integer key of a working group or other group.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// A document with its references already resolved to identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub id:        i64,
  /// Natural key, e.g. `draft-ietf-quic-transport`.
  pub name:      String,
  pub title:     String,
  #[serde(rename = "abstract")]
  pub abstract_: Option<String>,
  pub rev:       String,
  pub pages:     Option<i64>,
  pub time:      DateTime<Utc>,
  pub expires:   Option<DateTime<Utc>>,
  /// Responsible area director.
  pub ad:        Option<PersonId>,
  /// Email address of the document shepherd.
  pub shepherd:  Option<String>,
  pub group:     Option<GroupId>,
}
