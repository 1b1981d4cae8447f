//! The `Tunnel` trait: one delivery channel (SMS, email, voice).

use std::{future::Future, pin::Pin};

use chrono::Utc;

use crate::{
  error::TunnelError,
  poke::{Poke, TunnelType},
  record::{Record, Status},
};

/// Service segment of every tunnel resource path.
pub const SERVICE: &str = "notify";

/// The resource path of a tunnel instance, used for logging and addressing.
pub fn resource_path(tunnel: TunnelType, identity: &str) -> String {
  format!("service/{SERVICE}/tunnel/{tunnel}/id/{identity}")
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// The result of one send attempt.
///
/// A record is produced whether or not delivery worked; its `message_id` is
/// always the id of the poke that was sent.
#[derive(Debug)]
pub struct SendOutcome {
  pub record: Record,
  pub error:  Option<TunnelError>,
}

impl SendOutcome {
  pub fn sent(record: Record) -> Self { Self { record, error: None } }

  /// An attempt that ended in `error`, stamped now.
  pub fn failed(poke: &Poke, error: TunnelError) -> Self {
    Self {
      record: Record::new(&poke.id, error.status(), Utc::now()),
      error:  Some(error),
    }
  }

  pub fn is_sent(&self) -> bool { self.error.is_none() }

  pub fn status(&self) -> Status { self.record.status }

  pub fn into_result(self) -> Result<Record, TunnelError> {
    match self.error {
      None => Ok(self.record),
      Some(e) => Err(e),
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A delivery mechanism able to send a [`Poke`].
///
/// Tunnels hold only their own configuration and provider client; they never
/// persist anything.
pub trait Tunnel: Send + Sync {
  /// Stable tag of the variant.
  fn tunnel_type(&self) -> TunnelType;

  /// The sender-side address or number of this instance.
  fn identity(&self) -> &str;

  /// `service/notify/tunnel/<type>/id/<identity>`.
  fn describe(&self) -> String {
    resource_path(self.tunnel_type(), self.identity())
  }

  /// Attempt delivery of `poke` exactly once.
  fn send<'a>(
    &'a self,
    poke: &'a Poke,
  ) -> impl Future<Output = SendOutcome> + Send + 'a;
}

// ─── Object-safe form ────────────────────────────────────────────────────────

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe mirror of [`Tunnel`], for holding heterogeneous tunnels behind
/// `Box<dyn DynTunnel>`. Implemented for every [`Tunnel`].
pub trait DynTunnel: Send + Sync {
  fn tunnel_type(&self) -> TunnelType;
  fn identity(&self) -> &str;
  fn describe(&self) -> String;
  fn send_boxed<'a>(&'a self, poke: &'a Poke) -> BoxFuture<'a, SendOutcome>;
}

impl<T: Tunnel> DynTunnel for T {
  fn tunnel_type(&self) -> TunnelType { Tunnel::tunnel_type(self) }

  fn identity(&self) -> &str { Tunnel::identity(self) }

  fn describe(&self) -> String { Tunnel::describe(self) }

  fn send_boxed<'a>(&'a self, poke: &'a Poke) -> BoxFuture<'a, SendOutcome> {
    Box::pin(Tunnel::send(self, poke))
  }
}
