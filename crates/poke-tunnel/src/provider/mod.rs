//! Provider seams: the narrow contracts tunnels need from an SMS gateway or
//! a mail API, plus HTTP clients for Twilio and Gmail.

use std::future::Future;

use poke_core::BoxError;
use serde::Deserialize;
use thiserror::Error;

pub mod gmail;
pub mod twilio;

pub use gmail::{DelegatedCredential, GmailClient};
pub use twilio::{TwilioClient, TwilioConfig};

// ─── SMS ─────────────────────────────────────────────────────────────────────

/// One outbound short message.
#[derive(Debug, Clone, Copy)]
pub struct SmsRequest<'a> {
  pub from:         &'a str,
  pub to:           &'a str,
  pub body:         &'a str,
  /// Where the provider should post asynchronous status updates.
  pub callback_url: Option<&'a str>,
  pub account:      &'a str,
}

/// The provider's synchronous answer to a send.
#[derive(Debug, Clone, Deserialize)]
pub struct SmsResponse {
  pub sid:          String,
  /// Provider-native status, e.g. `queued`.
  pub status:       String,
  /// RFC 2822 date of the last status change, when the provider sends one.
  #[serde(default)]
  pub date_updated: Option<String>,
}

/// A structured refusal from the SMS provider.
#[derive(Debug, Clone, Deserialize, Error)]
#[error("code {code}: {message} ({more_info})")]
pub struct ProviderException {
  #[serde(default)]
  pub code:      i64,
  pub message:   String,
  #[serde(default)]
  pub more_info: String,
  #[serde(default)]
  pub status:    u16,
}

#[derive(Debug, Error)]
pub enum SmsFailure {
  #[error("sms transport error: {0}")]
  Transport(#[source] BoxError),

  #[error("sms provider exception: {0}")]
  Exception(#[from] ProviderException),
}

/// A short-message gateway.
pub trait SmsProvider: Send + Sync {
  /// The account messages are sent under.
  fn account(&self) -> &str;

  fn send_sms<'a>(
    &'a self,
    request: SmsRequest<'a>,
  ) -> impl Future<Output = Result<SmsResponse, SmsFailure>> + Send + 'a;
}

// ─── Mail ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MailFailure {
  #[error("mail authorization failed: {0}")]
  Auth(String),

  #[error("mail api error {code}: {message}")]
  Api { code: u16, message: String },

  #[error("mail transport error: {0}")]
  Transport(#[source] BoxError),
}

/// A mail-sending API that accepts pre-composed messages.
pub trait MailProvider: Send + Sync {
  /// Send `raw`, a base64url-encoded RFC 5322 message, as `user`.
  fn send_raw<'a>(
    &'a self,
    user: &'a str,
    raw: &'a str,
  ) -> impl Future<Output = Result<(), MailFailure>> + Send + 'a;
}
