use std::path::PathBuf;

use poke_core::{BoxError, ConfigurationError, StoreError, TunnelType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error during {op}: {source}")]
  Store {
    op:     &'static str,
    #[source]
    source: BoxError,
  },

  #[error("tunnel configuration: {0}")]
  Configuration(#[from] ConfigurationError),

  #[error("reading credential {path:?}: {source}")]
  Credential {
    path:   PathBuf,
    #[source]
    source: BoxError,
  },

  #[error("invalid setting {key}: {reason}")]
  InvalidSetting {
    key:    &'static str,
    reason: String,
  },

  #[error("a {0} tunnel is already registered")]
  DuplicateTunnel(TunnelType),
}

impl Error {
  pub(crate) fn store<E: StoreError>(op: &'static str, e: E) -> Self {
    Self::Store { op, source: Box::new(e) }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
