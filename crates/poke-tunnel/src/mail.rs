//! [`MailTunnel`] — pokes delivered as plain-text email.

use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use chrono::Utc;
use lettre::{
  Message,
  message::{Mailbox, header::ContentType},
};
use poke_core::{
  ConfigurationError, Poke, Record, SendOutcome, Status, Tunnel, TunnelError,
  TunnelType,
};
use tracing::debug;

use crate::provider::MailProvider;

/// Sends pokes from one mailbox through a [`MailProvider`].
pub struct MailTunnel<M> {
  provider: M,
  email:    String,
  from:     Mailbox,
}

impl<M: MailProvider> MailTunnel<M> {
  pub fn new(email: impl Into<String>, provider: M) -> Result<Self, ConfigurationError> {
    let email = email.into();
    if email.trim().is_empty() {
      return Err(ConfigurationError::MissingIdentity(TunnelType::Email));
    }
    let from = email.parse::<Mailbox>().map_err(|e| {
      ConfigurationError::InvalidIdentity {
        tunnel:   TunnelType::Email,
        identity: email.clone(),
        reason:   e.to_string(),
      }
    })?;
    Ok(Self { provider, email, from })
  }

  pub fn provider(&self) -> &M { &self.provider }

  /// Build the RFC 5322 message for `poke`, base64url encoded.
  fn compose(&self, poke: &Poke) -> Result<String, TunnelError> {
    let to = poke
      .to
      .parse::<Mailbox>()
      .map_err(|e| TunnelError::Compose(format!("recipient {:?}: {e}", poke.to)))?;

    let message = Message::builder()
      .from(self.from.clone())
      .to(to)
      .subject(poke.subject.clone().unwrap_or_default())
      .header(ContentType::TEXT_PLAIN)
      .body(poke.body.clone())
      .map_err(|e| TunnelError::Compose(e.to_string()))?;

    Ok(URL_SAFE.encode(message.formatted()))
  }
}

impl<M: MailProvider> Tunnel for MailTunnel<M> {
  fn tunnel_type(&self) -> TunnelType { TunnelType::Email }

  fn identity(&self) -> &str { &self.email }

  async fn send(&self, poke: &Poke) -> SendOutcome {
    let raw = match self.compose(poke) {
      Ok(raw) => raw,
      Err(e) => return SendOutcome::failed(poke, e),
    };

    match self.provider.send_raw(&self.email, &raw).await {
      Ok(()) => {
        debug!(poke_id = %poke.id, from = %self.email, "mail sent");
        SendOutcome::sent(Record::new(&poke.id, Status::Delivered, Utc::now()))
      }
      Err(e) => SendOutcome::failed(poke, TunnelError::Undelivered(e.to_string())),
    }
  }
}
