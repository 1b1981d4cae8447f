//! [`VoiceTunnel`] — reserved. No voice provider is wired up yet, so every
//! send is logged as a local error.

use poke_core::{ConfigurationError, Poke, SendOutcome, Tunnel, TunnelError, TunnelType};

pub struct VoiceTunnel {
  number: String,
}

impl VoiceTunnel {
  pub fn new(number: impl Into<String>) -> Result<Self, ConfigurationError> {
    let number = number.into();
    if number.trim().is_empty() {
      return Err(ConfigurationError::MissingIdentity(TunnelType::Voice));
    }
    Ok(Self { number })
  }
}

impl Tunnel for VoiceTunnel {
  fn tunnel_type(&self) -> TunnelType { TunnelType::Voice }

  fn identity(&self) -> &str { &self.number }

  async fn send(&self, poke: &Poke) -> SendOutcome {
    SendOutcome::failed(poke, TunnelError::Unsupported(TunnelType::Voice))
  }
}
