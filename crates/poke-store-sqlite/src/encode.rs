//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 strings, tags are their lowercase (or
//! PascalCase, for statuses) names. Only years 0000 through 9999 have a
//! fixed-width form, so anything outside them is refused before it is written.

use std::str::FromStr;

use chrono::{DateTime, Datelike as _, SecondsFormat, Utc};
use poke_core::{ArchivedPoke, Claim, Poke, Record, Status, TunnelType};
use rusqlite::{Row, ToSql};

use crate::ErrorKind;

type Result<T> = std::result::Result<T, ErrorKind>;

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> Result<String> {
  if !(0..=9999).contains(&dt.year()) {
    return Err(ErrorKind::OutOfRange(dt.to_rfc3339_opts(SecondsFormat::Secs, true)));
  }
  Ok(dt.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| ErrorKind::DateParse(format!("{s:?}: {e}")))
}

// ─── Tags ────────────────────────────────────────────────────────────────────

pub fn decode_tunnel(s: &str) -> Result<TunnelType> {
  TunnelType::from_str(s).map_err(|_| ErrorKind::UnknownTag {
    field: "tunnel",
    value: s.to_owned(),
  })
}

pub fn decode_status(s: &str) -> Result<Status> {
  Status::from_str(s).map_err(|_| ErrorKind::UnknownTag {
    field: "status",
    value: s.to_owned(),
  })
}

// ─── Pokes ───────────────────────────────────────────────────────────────────

pub const POKE_COLUMNS: &str = "poke_id, tunnel, \"to\", subject, body, \
                                date_to_send, expiry, claimed_by, claimed_until";

/// Raw strings of one `pokes` row, in [`POKE_COLUMNS`] order.
pub struct RawPoke {
  pub poke_id:       String,
  pub tunnel:        String,
  pub to:            String,
  pub subject:       Option<String>,
  pub body:          String,
  pub date_to_send:  String,
  pub expiry:        String,
  pub claimed_by:    Option<String>,
  pub claimed_until: Option<String>,
}

impl RawPoke {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      poke_id:       row.get(0)?,
      tunnel:        row.get(1)?,
      to:            row.get(2)?,
      subject:       row.get(3)?,
      body:          row.get(4)?,
      date_to_send:  row.get(5)?,
      expiry:        row.get(6)?,
      claimed_by:    row.get(7)?,
      claimed_until: row.get(8)?,
    })
  }

  pub fn from_poke(p: &Poke) -> Result<Self> {
    let claimed_until = match &p.claim {
      Some(c) => Some(encode_dt(c.claimed_until)?),
      None => None,
    };
    Ok(Self {
      poke_id:       p.id.clone(),
      tunnel:        p.tunnel.to_string(),
      to:            p.to.clone(),
      subject:       p.subject.clone().filter(|s| !s.is_empty()),
      body:          p.body.clone(),
      date_to_send:  encode_dt(p.date_to_send)?,
      expiry:        encode_dt(p.expiry)?,
      claimed_by:    p.claim.as_ref().map(|c| c.claimed_by.clone()),
      claimed_until,
    })
  }

  /// Bind parameters in [`POKE_COLUMNS`] order.
  pub fn params(&self) -> [&dyn ToSql; 9] {
    [
      &self.poke_id,
      &self.tunnel,
      &self.to,
      &self.subject,
      &self.body,
      &self.date_to_send,
      &self.expiry,
      &self.claimed_by,
      &self.claimed_until,
    ]
  }

  pub fn into_poke(self) -> Result<Poke> {
    let claim = match (self.claimed_by, self.claimed_until) {
      (Some(claimed_by), Some(until)) => Some(Claim {
        claimed_by,
        claimed_until: decode_dt(&until)?,
      }),
      _ => None,
    };

    Ok(Poke {
      tunnel: decode_tunnel(&self.tunnel)?,
      date_to_send: decode_dt(&self.date_to_send)?,
      expiry: decode_dt(&self.expiry)?,
      id: self.poke_id,
      to: self.to,
      subject: self.subject,
      body: self.body,
      claim,
    })
  }
}

// ─── Archived pokes ──────────────────────────────────────────────────────────

pub const ARCHIVED_COLUMNS: &str = "poke_id, tunnel, \"to\", expired, archived_at";

pub struct RawArchived {
  pub poke_id:     String,
  pub tunnel:      String,
  pub to:          String,
  pub expired:     bool,
  pub archived_at: String,
}

impl RawArchived {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      poke_id:     row.get(0)?,
      tunnel:      row.get(1)?,
      to:          row.get(2)?,
      expired:     row.get(3)?,
      archived_at: row.get(4)?,
    })
  }

  pub fn from_archived(a: &ArchivedPoke) -> Result<Self> {
    Ok(Self {
      poke_id:     a.id.clone(),
      tunnel:      a.tunnel.to_string(),
      to:          a.to.clone(),
      expired:     a.expired,
      archived_at: encode_dt(a.archived_at)?,
    })
  }

  pub fn params(&self) -> [&dyn ToSql; 5] {
    [&self.poke_id, &self.tunnel, &self.to, &self.expired, &self.archived_at]
  }

  pub fn into_archived(self) -> Result<ArchivedPoke> {
    Ok(ArchivedPoke {
      tunnel:      decode_tunnel(&self.tunnel)?,
      archived_at: decode_dt(&self.archived_at)?,
      id:          self.poke_id,
      to:          self.to,
      expired:     self.expired,
    })
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

pub struct RawRecord {
  pub record_id:  String,
  pub message_id: String,
  pub status:     String,
  pub timestamp:  String,
}

impl RawRecord {
  pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:  row.get(0)?,
      message_id: row.get(1)?,
      status:     row.get(2)?,
      timestamp:  row.get(3)?,
    })
  }

  pub fn from_record(r: &Record) -> Result<Self> {
    Ok(Self {
      record_id:  r.id.clone(),
      message_id: r.message_id.clone(),
      status:     r.status.to_string(),
      timestamp:  encode_dt(r.timestamp)?,
    })
  }

  pub fn into_record(self) -> Result<Record> {
    Ok(Record {
      status:     decode_status(&self.status)?,
      timestamp:  decode_dt(&self.timestamp)?,
      id:         self.record_id,
      message_id: self.message_id,
    })
  }
}
