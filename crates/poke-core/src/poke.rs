//! Pokes — scheduled notifications — and their archived form.
//!
//! A poke lives in the active queue until it is archived. Archival is an
//! id-preserving move: the [`ArchivedPoke`] keeps the id of the poke it
//! replaced.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

// ─── Tunnel type ─────────────────────────────────────────────────────────────

/// Selects which tunnel variant delivers a poke.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TunnelType {
  Sms,
  Email,
  /// Reserved; no provider is wired up yet.
  Voice,
}

// ─── Claim ───────────────────────────────────────────────────────────────────

/// A time-bounded reservation of a poke by one dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
  pub claimed_by:    String,
  pub claimed_until: DateTime<Utc>,
}

impl Claim {
  /// `None` when `now + lease` is not a representable instant.
  pub fn new(
    claimed_by: impl Into<String>,
    now: DateTime<Utc>,
    lease: TimeDelta,
  ) -> Option<Self> {
    let claimed_until = now.checked_add_signed(lease)?;
    Some(Self { claimed_by: claimed_by.into(), claimed_until })
  }

  /// Whether the lease still holds at `now`.
  pub fn is_live(&self, now: DateTime<Utc>) -> bool { now < self.claimed_until }
}

// ─── Poke ────────────────────────────────────────────────────────────────────

/// A scheduled notification in the active queue.
///
/// `date_to_send` and `expiry` are independent; a poke may expire before it
/// is ever due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poke {
  /// Store-assigned; never changes.
  pub id:           String,
  pub tunnel:       TunnelType,
  pub to:           String,
  /// Ignored by tunnels without a subject line (SMS).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subject:      Option<String>,
  pub body:         String,
  pub date_to_send: DateTime<Utc>,
  pub expiry:       DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub claim:        Option<Claim>,
}

impl Poke {
  /// Due means the send time is strictly in the past.
  pub fn is_due(&self, now: DateTime<Utc>) -> bool { self.date_to_send < now }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool { now > self.expiry }

  /// Whether `claimant` may take (or renew) the claim at `now`.
  pub fn is_claimable_by(&self, claimant: &str, now: DateTime<Utc>) -> bool {
    match &self.claim {
      None => true,
      Some(c) => c.claimed_by == claimant || !c.is_live(now),
    }
  }
}

// ─── NewPoke ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::PokeStore::create`]. The id is always assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct NewPoke {
  pub tunnel:       TunnelType,
  pub to:           String,
  pub subject:      Option<String>,
  pub body:         String,
  pub date_to_send: DateTime<Utc>,
  pub expiry:       DateTime<Utc>,
}

impl NewPoke {
  pub fn new(
    tunnel: TunnelType,
    to: impl Into<String>,
    body: impl Into<String>,
    date_to_send: DateTime<Utc>,
    expiry: DateTime<Utc>,
  ) -> Self {
    Self {
      tunnel,
      to: to.into(),
      subject: None,
      body: body.into(),
      date_to_send,
      expiry,
    }
  }

  pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
    self.subject = Some(subject.into());
    self
  }

  pub fn into_poke(self, id: String) -> Poke {
    Poke {
      id,
      tunnel: self.tunnel,
      to: self.to,
      subject: self.subject.filter(|s| !s.is_empty()),
      body: self.body,
      date_to_send: self.date_to_send,
      expiry: self.expiry,
      claim: None,
    }
  }
}

// ─── ArchivedPoke ────────────────────────────────────────────────────────────

/// The terminal record left behind once a poke leaves the active queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedPoke {
  /// Same id as the poke it was archived from.
  pub id:          String,
  pub tunnel:      TunnelType,
  pub to:          String,
  /// Whether the poke was past its expiry at `archived_at`.
  pub expired:     bool,
  pub archived_at: DateTime<Utc>,
}

impl ArchivedPoke {
  /// Build the archived form of `poke`. The expiry flag is decided against
  /// `archived_at`, never against the time the poke was selected.
  pub fn from_poke(poke: &Poke, archived_at: DateTime<Utc>) -> Self {
    Self {
      id: poke.id.clone(),
      tunnel: poke.tunnel,
      to: poke.to.clone(),
      expired: poke.is_expired(archived_at),
      archived_at,
    }
  }
}
