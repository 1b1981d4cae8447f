//! Error type for `poke-store-sqlite`.
//!
//! Every error names the operation that failed and the ids it was working
//! on, and keeps the underlying cause as its source.

use poke_core::StoreError;
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("sqlite poke store {op} [{ids}]: {kind}")]
pub struct Error {
  pub op:   &'static str,
  pub ids:  String,
  #[source]
  pub kind: ErrorKind,
}

#[derive(Debug, Error)]
pub enum ErrorKind {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("timestamp {0} is outside years 0000-9999")]
  OutOfRange(String),

  #[error("unknown {field} value: {value:?}")]
  UnknownTag {
    field: &'static str,
    value: String,
  },
}

impl Error {
  pub(crate) fn new(op: &'static str, id: &str, kind: impl Into<ErrorKind>) -> Self {
    Self { op, ids: id.to_owned(), kind: kind.into() }
  }

  pub(crate) fn many(op: &'static str, ids: &[String], kind: impl Into<ErrorKind>) -> Self {
    Self { op, ids: ids.join(","), kind: kind.into() }
  }
}

impl StoreError for Error {
  fn is_not_found(&self) -> bool { matches!(self.kind, ErrorKind::NotFound(_)) }

  fn is_contention(&self) -> bool {
    match &self.kind {
      ErrorKind::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqliteFailure(e, _),
      )) => matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked),
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
