//! Error types shared by every tunnel implementation.

use thiserror::Error;

use crate::{poke::TunnelType, record::Status};

/// Boxed error used to carry provider-specific causes across crate borders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failed delivery attempt. Each variant maps onto exactly one [`Status`].
#[derive(Debug, Error)]
pub enum TunnelError {
  /// The message could not be built locally; the provider was never called.
  #[error("composing message: {0}")]
  Compose(String),

  /// The provider could not be reached or answered with garbage.
  #[error("provider transport error: {0}")]
  Transport(#[source] BoxError),

  /// The provider refused the message outright.
  #[error("provider rejected message: {0}")]
  Rejected(String),

  /// The provider accepted the call but could not deliver.
  #[error("message undelivered: {0}")]
  Undelivered(String),

  #[error("{0} tunnel is not implemented")]
  Unsupported(TunnelType),
}

impl TunnelError {
  /// The record status a send attempt ending in this error is logged with.
  pub fn status(&self) -> Status {
    match self {
      Self::Compose(_) | Self::Transport(_) | Self::Unsupported(_) => {
        Status::Error
      }
      Self::Rejected(_) => Status::Failed,
      Self::Undelivered(_) => Status::Undelivered,
    }
  }
}

/// A tunnel or provider client was constructed with unusable settings.
#[derive(Debug, Error)]
pub enum ConfigurationError {
  #[error("{0} tunnel requires a sender identity")]
  MissingIdentity(TunnelType),

  #[error("invalid sender identity {identity:?} for {tunnel} tunnel: {reason}")]
  InvalidIdentity {
    tunnel:   TunnelType,
    identity: String,
    reason:   String,
  },

  #[error("invalid credential: {0}")]
  Credential(String),

  #[error("building http client: {0}")]
  Client(#[source] BoxError),
}
