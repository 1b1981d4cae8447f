//! [`SmsTunnel`] — pokes delivered as short messages.

use chrono::{DateTime, Utc};
use poke_core::{
  ConfigurationError, Poke, Record, SendOutcome, Status, Tunnel, TunnelError,
  TunnelType,
};
use tracing::{debug, warn};

use crate::provider::{SmsFailure, SmsProvider, SmsRequest};

/// Map a provider-native SMS status onto the engine's vocabulary.
///
/// Statuses the provider reports while a message is still in flight all
/// count as `Queued`. Anything unrecognised is treated as undelivered.
pub fn map_sms_status(native: &str) -> Status {
  match native.to_ascii_lowercase().as_str() {
    "accepted" | "scheduled" | "queued" | "sending" | "sent" => Status::Queued,
    "delivered" | "read" => Status::Delivered,
    "undelivered" | "canceled" => Status::Undelivered,
    "failed" => Status::Failed,
    other => {
      warn!(status = other, "unmapped sms provider status");
      Status::Undelivered
    }
  }
}

fn parse_provider_date(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc2822(s)
    .or_else(|_| DateTime::parse_from_rfc3339(s))
    .map(|dt| dt.with_timezone(&Utc))
    .ok()
}

/// Sends pokes from one number through an [`SmsProvider`].
pub struct SmsTunnel<P> {
  provider:     P,
  number:       String,
  callback_url: Option<String>,
}

impl<P: SmsProvider> SmsTunnel<P> {
  pub fn new(number: impl Into<String>, provider: P) -> Result<Self, ConfigurationError> {
    let number = number.into();
    if number.trim().is_empty() {
      return Err(ConfigurationError::MissingIdentity(TunnelType::Sms));
    }
    Ok(Self { provider, number, callback_url: None })
  }

  /// Ask the provider to post status updates to `url`.
  pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
    self.callback_url = Some(url.into());
    self
  }

  pub fn provider(&self) -> &P { &self.provider }
}

impl<P: SmsProvider> Tunnel for SmsTunnel<P> {
  fn tunnel_type(&self) -> TunnelType { TunnelType::Sms }

  fn identity(&self) -> &str { &self.number }

  async fn send(&self, poke: &Poke) -> SendOutcome {
    let request = SmsRequest {
      from:         &self.number,
      to:           &poke.to,
      body:         &poke.body,
      callback_url: self.callback_url.as_deref(),
      account:      self.provider.account(),
    };

    let response = match self.provider.send_sms(request).await {
      Ok(r) => r,
      Err(SmsFailure::Transport(e)) => {
        return SendOutcome::failed(poke, TunnelError::Transport(e));
      }
      Err(SmsFailure::Exception(ex)) => {
        return SendOutcome::failed(poke, TunnelError::Rejected(ex.to_string()));
      }
    };

    let status = map_sms_status(&response.status);
    let timestamp = response
      .date_updated
      .as_deref()
      .and_then(parse_provider_date)
      .unwrap_or_else(Utc::now);
    debug!(poke_id = %poke.id, sid = %response.sid, %status, "sms handed to provider");

    let record = Record::new(&poke.id, status, timestamp);
    let error = match status {
      Status::Failed => Some(TunnelError::Rejected(format!(
        "message {} reported {}",
        response.sid, response.status
      ))),
      Status::Undelivered => Some(TunnelError::Undelivered(format!(
        "message {} reported {}",
        response.sid, response.status
      ))),
      _ => None,
    };
    SendOutcome { record, error }
  }
}
