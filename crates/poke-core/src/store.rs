//! The `PokeStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `poke-store-sqlite`).
//! Tunnels and dispatchers depend on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use chrono::TimeDelta;

use crate::{
  poke::{ArchivedPoke, NewPoke, Poke},
  record::Record,
};

/// Upper bound on the number of pokes a single selection query returns.
pub const LIST_LIMIT: usize = 1000;

/// What generic callers need to know about a backend's failures.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// A referenced poke, archived poke or record does not exist.
  fn is_not_found(&self) -> bool;

  /// The backend gave up because of a concurrent writer; retrying the same
  /// operation may succeed.
  fn is_contention(&self) -> bool;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Durable, transactional storage for pokes, archived pokes and records.
///
/// Every multi-row write is atomic: it either fully applies or leaves the
/// store untouched. Dropping a returned future never leaves a half-applied
/// transaction behind.
pub trait PokeStore: Send + Sync {
  type Error: StoreError;

  // ── Pokes ─────────────────────────────────────────────────────────────

  /// Persist a new poke and return it with its store-assigned id.
  fn create(
    &self,
    poke: NewPoke,
  ) -> impl Future<Output = Result<Poke, Self::Error>> + Send + '_;

  /// Remove active pokes. Fails, removing nothing, if any id is missing.
  fn delete<'a>(
    &'a self,
    ids: &'a [String],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Replace an existing poke in full. Fails if the id does not exist.
  fn update(
    &self,
    poke: Poke,
  ) -> impl Future<Output = Result<Poke, Self::Error>> + Send + '_;

  /// Point lookups, in input order. Fails if any id is missing.
  fn get<'a>(
    &'a self,
    ids: &'a [String],
  ) -> impl Future<Output = Result<Vec<Poke>, Self::Error>> + Send + 'a;

  // ── Selection ─────────────────────────────────────────────────────────

  /// Pokes whose send time is strictly before now, expired ones included.
  /// At most [`LIST_LIMIT`] results.
  fn list_to_send(
    &self,
  ) -> impl Future<Output = Result<Vec<Poke>, Self::Error>> + Send + '_;

  /// Pokes whose expiry is strictly before now, regardless of send time.
  /// At most [`LIST_LIMIT`] results.
  fn list_expired(
    &self,
  ) -> impl Future<Output = Result<Vec<Poke>, Self::Error>> + Send + '_;

  // ── Claims ────────────────────────────────────────────────────────────

  /// Reserve a poke for `claimant` for `lease`.
  ///
  /// Succeeds when the poke is unclaimed, its lease has lapsed, or
  /// `claimant` already holds it. Returns `None` when another claimant holds
  /// a live lease.
  fn claim<'a>(
    &'a self,
    id: &'a str,
    claimant: &'a str,
    lease: TimeDelta,
  ) -> impl Future<Output = Result<Option<Poke>, Self::Error>> + Send + 'a;

  // ── Archive ───────────────────────────────────────────────────────────

  /// Atomically move a poke into the archive, deciding its expiry flag at
  /// archive time.
  fn archive<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<ArchivedPoke, Self::Error>> + Send + 'a;

  /// Remove archived pokes. Fails, removing nothing, if any id is missing.
  fn delete_archived<'a>(
    &'a self,
    ids: &'a [String],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Point lookups into the archive. Fails if any id is missing.
  fn get_archived<'a>(
    &'a self,
    ids: &'a [String],
  ) -> impl Future<Output = Result<Vec<ArchivedPoke>, Self::Error>> + Send + 'a;

  // ── Records ───────────────────────────────────────────────────────────

  /// Append a record and return it with its store-assigned id.
  fn create_record(
    &self,
    record: Record,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Every record logged for `message_id`, oldest first.
  fn get_records<'a>(
    &'a self,
    message_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + 'a;
}
