//! [`SqliteStore`] — the SQLite implementation of [`PokeStore`].

use std::{collections::HashSet, path::Path, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tracing::debug;
use uuid::Uuid;

use poke_core::{ArchivedPoke, Claim, LIST_LIMIT, NewPoke, Poke, PokeStore, Record};

use crate::{
  encode::{
    ARCHIVED_COLUMNS, POKE_COLUMNS, RawArchived, RawPoke, RawRecord, encode_dt,
  },
  schema::SCHEMA,
  Error, ErrorKind, Result,
};

/// How long a writer waits on a locked database before reporting contention.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

enum ClaimAttempt {
  Missing,
  Held,
  Claimed(RawPoke),
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A poke store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path)
      .await
      .map_err(|e| Error::new("open", "", e))?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory()
      .await
      .map_err(|e| Error::new("open", ":memory:", e))?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await
      .map_err(|e| Error::new("init_schema", "", e))
  }

  #[cfg(test)]
  pub(crate) fn connection(&self) -> &tokio_rusqlite::Connection { &self.conn }

  // ── Clocked operations ────────────────────────────────────────────────────

  /// [`PokeStore::list_to_send`] evaluated against `now`.
  pub async fn list_to_send_at(&self, now: DateTime<Utc>) -> Result<Vec<Poke>> {
    self.select_before("list_to_send", "date_to_send", now).await
  }

  /// [`PokeStore::list_expired`] evaluated against `now`.
  pub async fn list_expired_at(&self, now: DateTime<Utc>) -> Result<Vec<Poke>> {
    self.select_before("list_expired", "expiry", now).await
  }

  /// [`PokeStore::archive`] with the expiry flag decided against `now`.
  pub async fn archive_at(&self, id: &str, now: DateTime<Utc>) -> Result<ArchivedPoke> {
    let poke_id = id.to_owned();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let raw = tx
          .query_row(
            &format!("SELECT {POKE_COLUMNS} FROM pokes WHERE poke_id = ?1"),
            [&poke_id],
            RawPoke::read,
          )
          .optional()?;
        let Some(raw) = raw else {
          return Ok(Err(ErrorKind::NotFound(poke_id)));
        };
        let poke = match raw.into_poke() {
          Ok(p) => p,
          Err(kind) => return Ok(Err(kind)),
        };

        let archived = ArchivedPoke::from_poke(&poke, now);
        let row = match RawArchived::from_archived(&archived) {
          Ok(row) => row,
          Err(kind) => return Ok(Err(kind)),
        };
        tx.execute(
          &format!("INSERT INTO archived_pokes ({ARCHIVED_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
          &row.params()[..],
        )?;
        tx.execute("DELETE FROM pokes WHERE poke_id = ?1", [&poke_id])?;
        tx.commit()?;

        Ok(Ok(archived))
      })
      .await
      .map_err(|e| Error::new("archive", id, e))?;

    let archived = outcome.map_err(|kind| Error::new("archive", id, kind))?;
    debug!(poke_id = %id, expired = archived.expired, "poke archived");
    Ok(archived)
  }

  /// [`PokeStore::claim`] with the lease measured from `now`.
  pub async fn claim_at(
    &self,
    id: &str,
    claimant: &str,
    lease: TimeDelta,
    now: DateTime<Utc>,
  ) -> Result<Option<Poke>> {
    let claim = Claim::new(claimant, now, lease).ok_or_else(|| {
      Error::new("claim", id, ErrorKind::OutOfRange(format!("{now} + {lease}")))
    })?;
    let now_str = encode_dt(now).map_err(|kind| Error::new("claim", id, kind))?;
    let until_str =
      encode_dt(claim.claimed_until).map_err(|kind| Error::new("claim", id, kind))?;
    let poke_id = id.to_owned();
    let claimed_by = claim.claimed_by;

    let attempt = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // A lease is live while now < claimed_until.
        let changed = tx.execute(
          "UPDATE pokes SET claimed_by = ?2, claimed_until = ?3
           WHERE poke_id = ?1
             AND (claimed_by IS NULL OR claimed_by = ?2 OR claimed_until <= ?4)",
          rusqlite::params![poke_id, claimed_by, until_str, now_str],
        )?;

        let raw = tx
          .query_row(
            &format!("SELECT {POKE_COLUMNS} FROM pokes WHERE poke_id = ?1"),
            [&poke_id],
            RawPoke::read,
          )
          .optional()?;
        tx.commit()?;

        Ok(match (changed, raw) {
          (_, None) => ClaimAttempt::Missing,
          (0, Some(_)) => ClaimAttempt::Held,
          (_, Some(raw)) => ClaimAttempt::Claimed(raw),
        })
      })
      .await
      .map_err(|e| Error::new("claim", id, e))?;

    match attempt {
      ClaimAttempt::Missing => {
        Err(Error::new("claim", id, ErrorKind::NotFound(id.to_owned())))
      }
      ClaimAttempt::Held => {
        debug!(poke_id = %id, claimant, "poke held by another claimant");
        Ok(None)
      }
      ClaimAttempt::Claimed(raw) => {
        let poke = raw.into_poke().map_err(|kind| Error::new("claim", id, kind))?;
        Ok(Some(poke))
      }
    }
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  /// Pokes whose `column` timestamp is strictly before `now`.
  async fn select_before(
    &self,
    op: &'static str,
    column: &'static str,
    now: DateTime<Utc>,
  ) -> Result<Vec<Poke>> {
    let now_str = encode_dt(now).map_err(|kind| Error::new(op, "", kind))?;

    let raws: Vec<RawPoke> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {POKE_COLUMNS} FROM pokes
           WHERE {column} < ?1
           ORDER BY {column}
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![now_str, LIST_LIMIT as i64], RawPoke::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(|e| Error::new(op, "", e))?;

    raws
      .into_iter()
      .map(|raw| {
        let id = raw.poke_id.clone();
        raw.into_poke().map_err(|kind| Error::new(op, &id, kind))
      })
      .collect()
  }

  /// Delete rows keyed by `poke_id` from `table`, all or nothing.
  async fn delete_all(
    &self,
    op: &'static str,
    table: &'static str,
    ids: &[String],
  ) -> Result<()> {
    let owned = ids.to_vec();

    let missing = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
          let mut stmt =
            tx.prepare(&format!("DELETE FROM {table} WHERE poke_id = ?1"))?;
          let mut seen = HashSet::new();
          for id in owned.iter().filter(|id| seen.insert(id.as_str())) {
            if stmt.execute([id])? == 0 {
              // Dropping `tx` rolls back everything deleted so far.
              return Ok(Some(id.clone()));
            }
          }
        }
        tx.commit()?;
        Ok(None)
      })
      .await
      .map_err(|e| Error::many(op, ids, e))?;

    if let Some(id) = missing {
      return Err(Error::many(op, ids, ErrorKind::NotFound(id)));
    }
    debug!(table, count = ids.len(), "rows deleted");
    Ok(())
  }

  /// Read rows keyed by `poke_id` from one consistent snapshot. Any missing
  /// id fails the whole lookup.
  async fn select_each<R, F>(
    &self,
    op: &'static str,
    sql: String,
    ids: &[String],
    read: F,
  ) -> Result<Vec<R>>
  where
    R: Send + 'static,
    F: Fn(&rusqlite::Row<'_>) -> rusqlite::Result<R> + Send + 'static,
  {
    let owned = ids.to_vec();

    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut out = Vec::with_capacity(owned.len());
        {
          let mut stmt = tx.prepare(&sql)?;
          for id in owned {
            match stmt.query_row([&id], &read).optional()? {
              Some(raw) => out.push(raw),
              None => return Ok(Err(id)),
            }
          }
        }
        tx.commit()?;
        Ok(Ok(out))
      })
      .await
      .map_err(|e| Error::many(op, ids, e))?;

    found.map_err(|id| Error::many(op, ids, ErrorKind::NotFound(id)))
  }
}

// ─── PokeStore impl ──────────────────────────────────────────────────────────

impl PokeStore for SqliteStore {
  type Error = Error;

  // ── Pokes ─────────────────────────────────────────────────────────────────

  async fn create(&self, new: NewPoke) -> Result<Poke> {
    let poke = new.into_poke(Uuid::new_v4().to_string());
    let row = RawPoke::from_poke(&poke).map_err(|kind| Error::new("create", &poke.id, kind))?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO pokes ({POKE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
          ),
          &row.params()[..],
        )?;
        Ok(())
      })
      .await
      .map_err(|e| Error::new("create", &poke.id, e))?;

    debug!(poke_id = %poke.id, tunnel = %poke.tunnel, "poke created");
    Ok(poke)
  }

  async fn delete(&self, ids: &[String]) -> Result<()> {
    self.delete_all("delete", "pokes", ids).await
  }

  async fn update(&self, poke: Poke) -> Result<Poke> {
    let row = RawPoke::from_poke(&poke).map_err(|kind| Error::new("update", &poke.id, kind))?;

    let existed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM pokes WHERE poke_id = ?1",
            [&row.poke_id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !exists {
          return Ok(false);
        }

        tx.execute(
          "UPDATE pokes SET
             tunnel = ?2, \"to\" = ?3, subject = ?4, body = ?5,
             date_to_send = ?6, expiry = ?7, claimed_by = ?8, claimed_until = ?9
           WHERE poke_id = ?1",
          &row.params()[..],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await
      .map_err(|e| Error::new("update", &poke.id, e))?;

    if !existed {
      return Err(Error::new("update", &poke.id, ErrorKind::NotFound(poke.id.clone())));
    }
    Ok(poke)
  }

  async fn get(&self, ids: &[String]) -> Result<Vec<Poke>> {
    let raws = self
      .select_each(
        "get",
        format!("SELECT {POKE_COLUMNS} FROM pokes WHERE poke_id = ?1"),
        ids,
        RawPoke::read,
      )
      .await?;

    raws
      .into_iter()
      .map(|raw| {
        let id = raw.poke_id.clone();
        raw.into_poke().map_err(|kind| Error::new("get", &id, kind))
      })
      .collect()
  }

  // ── Selection ─────────────────────────────────────────────────────────────

  async fn list_to_send(&self) -> Result<Vec<Poke>> {
    self.list_to_send_at(Utc::now()).await
  }

  async fn list_expired(&self) -> Result<Vec<Poke>> {
    self.list_expired_at(Utc::now()).await
  }

  // ── Claims ────────────────────────────────────────────────────────────────

  async fn claim(
    &self,
    id: &str,
    claimant: &str,
    lease: TimeDelta,
  ) -> Result<Option<Poke>> {
    self.claim_at(id, claimant, lease, Utc::now()).await
  }

  // ── Archive ───────────────────────────────────────────────────────────────

  async fn archive(&self, id: &str) -> Result<ArchivedPoke> {
    self.archive_at(id, Utc::now()).await
  }

  async fn delete_archived(&self, ids: &[String]) -> Result<()> {
    self.delete_all("delete_archived", "archived_pokes", ids).await
  }

  async fn get_archived(&self, ids: &[String]) -> Result<Vec<ArchivedPoke>> {
    let raws = self
      .select_each(
        "get_archived",
        format!("SELECT {ARCHIVED_COLUMNS} FROM archived_pokes WHERE poke_id = ?1"),
        ids,
        RawArchived::read,
      )
      .await?;

    raws
      .into_iter()
      .map(|raw| {
        let id = raw.poke_id.clone();
        raw.into_archived().map_err(|kind| Error::new("get_archived", &id, kind))
      })
      .collect()
  }

  // ── Records ───────────────────────────────────────────────────────────────

  async fn create_record(&self, record: Record) -> Result<Record> {
    let record = Record { id: Uuid::new_v4().to_string(), ..record };
    let row = RawRecord::from_record(&record)
      .map_err(|kind| Error::new("create_record", &record.message_id, kind))?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO records (record_id, message_id, status, timestamp)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![row.record_id, row.message_id, row.status, row.timestamp],
        )?;
        Ok(())
      })
      .await
      .map_err(|e| Error::new("create_record", &record.message_id, e))?;

    Ok(record)
  }

  async fn get_records(&self, message_id: &str) -> Result<Vec<Record>> {
    let key = message_id.to_owned();

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT record_id, message_id, status, timestamp
           FROM records
           WHERE message_id = ?1
           ORDER BY timestamp, rowid",
        )?;
        let rows = stmt
          .query_map([&key], RawRecord::read)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(|e| Error::new("get_records", message_id, e))?;

    raws
      .into_iter()
      .map(|raw| {
        raw
          .into_record()
          .map_err(|kind| Error::new("get_records", message_id, kind))
      })
      .collect()
  }
}
