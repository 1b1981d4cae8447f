//! Audit records: one entry per send attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The engine-owned status vocabulary. Tunnels map their provider's native
/// codes onto it; provider strings never reach a stored record.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
pub enum Status {
  Queued,
  Delivered,
  Undelivered,
  /// The provider did not accept the message.
  Failed,
  /// Our own failure while composing or transporting the message.
  Error,
}

impl Status {
  /// Whether the provider took the message (it may still be in flight).
  pub fn is_accepted(self) -> bool { matches!(self, Self::Queued | Self::Delivered) }
}

/// One delivery-attempt outcome for a poke. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
  /// Store-assigned; empty until the record has been persisted.
  #[serde(default)]
  pub id:         String,
  /// Id of the poke the attempt was made for. A lookup key, not ownership.
  pub message_id: String,
  pub status:     Status,
  pub timestamp:  DateTime<Utc>,
}

impl Record {
  pub fn new(message_id: impl Into<String>, status: Status, timestamp: DateTime<Utc>) -> Self {
    Self {
      id: String::new(),
      message_id: message_id.into(),
      status,
      timestamp,
    }
  }

  pub fn is_persisted(&self) -> bool { !self.id.is_empty() }
}
