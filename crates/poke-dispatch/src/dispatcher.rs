//! One dispatch pass: retire what expired, send what is due.

use std::collections::HashMap;

use chrono::{TimeDelta, Utc};
use poke_core::{DynTunnel, Poke, PokeStore, StoreError as _, Tunnel, TunnelType};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

// ─── Tunnel set ──────────────────────────────────────────────────────────────

/// At most one tunnel per [`TunnelType`], held behind [`DynTunnel`].
#[derive(Default)]
pub struct TunnelSet {
  tunnels: HashMap<TunnelType, Box<dyn DynTunnel>>,
}

impl TunnelSet {
  pub fn new() -> Self { Self::default() }

  /// Register `tunnel` under its own type.
  pub fn insert<T: Tunnel + 'static>(&mut self, tunnel: T) -> Result<()> {
    let tunnel_type = Tunnel::tunnel_type(&tunnel);
    if self.tunnels.contains_key(&tunnel_type) {
      return Err(Error::DuplicateTunnel(tunnel_type));
    }
    self.tunnels.insert(tunnel_type, Box::new(tunnel));
    Ok(())
  }

  pub fn with<T: Tunnel + 'static>(mut self, tunnel: T) -> Result<Self> {
    self.insert(tunnel)?;
    Ok(self)
  }

  pub fn get(&self, tunnel_type: TunnelType) -> Option<&dyn DynTunnel> {
    self.tunnels.get(&tunnel_type).map(|t| &**t)
  }

  pub fn len(&self) -> usize { self.tunnels.len() }

  pub fn is_empty(&self) -> bool { self.tunnels.is_empty() }

  /// Resource paths of every registered tunnel, sorted.
  pub fn describe(&self) -> Vec<String> {
    let mut paths: Vec<_> = self.tunnels.values().map(|t| t.describe()).collect();
    paths.sort();
    paths
  }
}

// ─── Dispatcher ──────────────────────────────────────────────────────────────

/// Who this dispatcher claims pokes as, and for how long.
#[derive(Debug, Clone)]
pub struct ClaimSettings {
  pub claimant: String,
  pub lease:    TimeDelta,
}

/// Counters for one [`Dispatcher::run_once`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
  /// Handed to a tunnel, which reported success.
  pub sent:    usize,
  /// Handed to a tunnel, which reported an error.
  pub failed:  usize,
  /// Archived unsent because their expiry had passed.
  pub expired: usize,
  /// Due but left alone: expired mid-pass, claimed elsewhere, or no tunnel.
  pub skipped: usize,
}

impl PassReport {
  pub fn is_idle(&self) -> bool { *self == Self::default() }
}

pub struct Dispatcher<S> {
  store:   S,
  tunnels: TunnelSet,
  claim:   Option<ClaimSettings>,
}

impl<S: PokeStore> Dispatcher<S> {
  pub fn new(store: S, tunnels: TunnelSet) -> Self {
    Self { store, tunnels, claim: None }
  }

  /// Claim each due poke before sending it, so cooperating dispatchers
  /// never send the same poke twice while a lease is live.
  pub fn with_claim(mut self, claim: ClaimSettings) -> Self {
    self.claim = Some(claim);
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn tunnels(&self) -> &TunnelSet { &self.tunnels }

  /// Run one pass. Only listing failures abort the pass; per-poke failures
  /// are logged and counted.
  pub async fn run_once(&self) -> Result<PassReport> {
    let mut report = PassReport::default();

    let expired = self
      .store
      .list_expired()
      .await
      .map_err(|e| Error::store("list_expired", e))?;
    for poke in expired {
      if self.retire(&poke.id).await {
        report.expired += 1;
      }
    }

    let due = self
      .store
      .list_to_send()
      .await
      .map_err(|e| Error::store("list_to_send", e))?;
    for poke in due {
      self.dispatch(poke, &mut report).await;
    }

    if !report.is_idle() {
      info!(
        sent = report.sent,
        failed = report.failed,
        expired = report.expired,
        skipped = report.skipped,
        "dispatch pass complete"
      );
    }
    Ok(report)
  }

  async fn dispatch(&self, poke: Poke, report: &mut PassReport) {
    // Left for the next expiry sweep.
    if poke.is_expired(Utc::now()) {
      debug!(poke_id = %poke.id, "poke expired after selection");
      report.skipped += 1;
      return;
    }

    let Some(tunnel) = self.tunnels.get(poke.tunnel) else {
      warn!(poke_id = %poke.id, tunnel = %poke.tunnel, "no tunnel configured, poke stays queued");
      report.skipped += 1;
      return;
    };

    let Some(poke) = self.acquire(poke).await else {
      report.skipped += 1;
      return;
    };

    let outcome = tunnel.send_boxed(&poke).await;
    if outcome.is_sent() {
      report.sent += 1;
    } else {
      report.failed += 1;
    }
    debug!(
      poke_id = %poke.id,
      tunnel = %tunnel.describe(),
      status = %outcome.status(),
      "poke dispatched"
    );

    // The delivery record carries the outcome; the poke itself is done.
    self.retire(&poke.id).await;
  }

  /// Claim `poke` when claiming is configured. `None` means another
  /// dispatcher holds it or already retired it.
  async fn acquire(&self, poke: Poke) -> Option<Poke> {
    let Some(claim) = &self.claim else {
      return Some(poke);
    };

    match self.store.claim(&poke.id, &claim.claimant, claim.lease).await {
      Ok(Some(claimed)) => Some(claimed),
      Ok(None) => {
        debug!(poke_id = %poke.id, "poke held by another dispatcher");
        None
      }
      Err(e) if e.is_not_found() => {
        debug!(poke_id = %poke.id, "poke retired before it could be claimed");
        None
      }
      Err(e) => {
        warn!(poke_id = %poke.id, error = %e, "claim failed");
        None
      }
    }
  }

  /// Archive `id`; `true` if this call moved it.
  async fn retire(&self, id: &str) -> bool {
    match self.store.archive(id).await {
      Ok(archived) => {
        debug!(poke_id = %id, expired = archived.expired, "poke archived");
        true
      }
      Err(e) if e.is_not_found() => {
        debug!(poke_id = %id, "poke already archived");
        false
      }
      Err(e) => {
        warn!(poke_id = %id, error = %e, "archive failed");
        false
      }
    }
  }
}
