//! [`LogWrapper`] — a tunnel decorator that records every send attempt.
//!
//! The wrapped tunnel is called exactly once and outside any transaction.
//! Only the record write, which is pure data, is retried.

use std::time::Duration;

use poke_core::{Poke, PokeStore, Record, SendOutcome, StoreError as _, Tunnel, TunnelType};
use tracing::{debug, error, warn};

/// How often a contended record write is retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  /// Total attempts, including the first.
  pub attempts: u32,
  /// Multiplied by the attempt number before each retry.
  pub backoff:  Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self { Self { attempts: 3, backoff: Duration::from_millis(50) } }
}

/// Wraps a [`Tunnel`] so each send is followed by a durable [`Record`].
pub struct LogWrapper<T, S> {
  inner: T,
  store: S,
  retry: RetryPolicy,
}

impl<T: Tunnel, S: PokeStore> LogWrapper<T, S> {
  pub fn new(inner: T, store: S) -> Self {
    Self { inner, store, retry: RetryPolicy::default() }
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn inner(&self) -> &T { &self.inner }

  pub fn store(&self) -> &S { &self.store }

  async fn persist(&self, record: &Record) -> Result<Record, S::Error> {
    let mut attempt = 1;
    loop {
      match self.store.create_record(record.clone()).await {
        Ok(saved) => return Ok(saved),
        Err(e) if e.is_contention() && attempt < self.retry.attempts => {
          debug!(message_id = %record.message_id, attempt, error = %e, "record write contended, retrying");
          tokio::time::sleep(self.retry.backoff * attempt).await;
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }
}

impl<T: Tunnel, S: PokeStore> Tunnel for LogWrapper<T, S> {
  fn tunnel_type(&self) -> TunnelType { self.inner.tunnel_type() }

  fn identity(&self) -> &str { self.inner.identity() }

  fn describe(&self) -> String { self.inner.describe() }

  async fn send(&self, poke: &Poke) -> SendOutcome {
    let mut outcome = self.inner.send(poke).await;
    if let Some(e) = &outcome.error {
      warn!(tunnel = %self.describe(), poke_id = %poke.id, error = %e, "send failed");
    }

    // A lost record must not read as a lost message: the outcome is returned
    // as-is, with an unpersisted record.
    match self.persist(&outcome.record).await {
      Ok(saved) => outcome.record = saved,
      Err(e) => error!(
        tunnel = %self.describe(),
        poke_id = %poke.id,
        status = %outcome.record.status,
        error = %e,
        "delivery record not persisted"
      ),
    }
    outcome
  }
}
