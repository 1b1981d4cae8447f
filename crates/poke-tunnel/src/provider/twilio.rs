//! Twilio Programmable SMS over its REST API.

use std::time::Duration;

use poke_core::ConfigurationError;
use reqwest::Client;
use serde::Deserialize;

use super::{SmsFailure, SmsProvider, SmsRequest, SmsResponse, ProviderException};

pub const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

/// Account credentials for the Twilio REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
  pub account_sid: String,
  pub auth_token:  String,
  #[serde(default = "default_base_url")]
  pub base_url:    String,
}

fn default_base_url() -> String { DEFAULT_BASE_URL.to_owned() }

/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct TwilioClient {
  client: Client,
  config: TwilioConfig,
}

impl TwilioClient {
  pub fn new(config: TwilioConfig) -> Result<Self, ConfigurationError> {
    if config.account_sid.is_empty() || config.auth_token.is_empty() {
      return Err(ConfigurationError::Credential(
        "twilio account sid and auth token are required".into(),
      ));
    }
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| ConfigurationError::Client(Box::new(e)))?;
    Ok(Self { client, config })
  }

  fn messages_url(&self, account: &str) -> String {
    format!(
      "{}/2010-04-01/Accounts/{account}/Messages.json",
      self.config.base_url.trim_end_matches('/'),
    )
  }
}

fn transport(e: reqwest::Error) -> SmsFailure { SmsFailure::Transport(Box::new(e)) }

impl SmsProvider for TwilioClient {
  fn account(&self) -> &str { &self.config.account_sid }

  /// `POST /2010-04-01/Accounts/{sid}/Messages.json`
  async fn send_sms(&self, request: SmsRequest<'_>) -> Result<SmsResponse, SmsFailure> {
    let mut form = vec![
      ("From", request.from),
      ("To", request.to),
      ("Body", request.body),
    ];
    if let Some(url) = request.callback_url {
      form.push(("StatusCallback", url));
    }

    let resp = self
      .client
      .post(self.messages_url(request.account))
      .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
      .form(&form)
      .send()
      .await
      .map_err(transport)?;

    if resp.status().is_success() {
      return resp.json().await.map_err(transport);
    }

    let status = resp.status();
    let exception = resp
      .json::<ProviderException>()
      .await
      .unwrap_or_else(|_| ProviderException {
        code:      0,
        message:   format!("http {status}"),
        more_info: String::new(),
        status:    status.as_u16(),
      });
    Err(SmsFailure::Exception(exception))
  }
}
