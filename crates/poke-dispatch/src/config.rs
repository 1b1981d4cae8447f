//! Runtime configuration, deserialised from `config.toml` with `POKE_*`
//! environment overrides (`__` separates nested keys, e.g.
//! `POKE_SMS__TWILIO__AUTH_TOKEN`).

use std::{path::{Path, PathBuf}, time::Duration};

use chrono::{Datelike as _, TimeDelta, Utc};
use config::{ConfigError, Environment, File, Source};
use poke_core::PokeStore;
use poke_tunnel::{
  LogWrapper, MailTunnel, SmsTunnel, VoiceTunnel,
  provider::{DelegatedCredential, GmailClient, TwilioClient, TwilioConfig},
};
use serde::Deserialize;

use crate::{
  dispatcher::{ClaimSettings, TunnelSet},
  error::{Error, Result},
};

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
  pub store_path:    PathBuf,
  /// Seconds between dispatch passes.
  #[serde(default = "default_interval_secs")]
  pub interval_secs: u64,
  /// Claim pokes under this name before sending. Unset means plain
  /// at-least-once delivery.
  #[serde(default)]
  pub claimant:      Option<String>,
  #[serde(default = "default_lease_secs")]
  pub lease_secs:    i64,
  #[serde(default)]
  pub sms:           Option<SmsConfig>,
  #[serde(default)]
  pub email:         Option<EmailConfig>,
  #[serde(default)]
  pub voice:         Option<VoiceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsConfig {
  pub number:       String,
  #[serde(default)]
  pub callback_url: Option<String>,
  pub twilio:       TwilioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
  /// The mailbox pokes are sent from; the service account impersonates it.
  pub address:         String,
  /// Path to the service-account JSON key.
  pub credential_file: PathBuf,
  #[serde(default)]
  pub api_base:        Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
  pub number: String,
}

fn default_interval_secs() -> u64 { 30 }

fn default_lease_secs() -> i64 { 300 }

impl DispatchConfig {
  /// Load from `path` (optional) and the environment.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::from_source(File::from(path).required(false))
  }

  pub(crate) fn from_source<F>(file: F) -> Result<Self, ConfigError>
  where
    F: Source + Send + Sync + 'static,
  {
    config::Config::builder()
      .add_source(file)
      .add_source(
        Environment::with_prefix("POKE")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()?
      .try_deserialize()
  }

  pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs.max(1)) }

  /// `None` when no claimant is configured. A lease must end before the
  /// year 10000, which is as far as the store can record it.
  pub fn claim_settings(&self) -> Result<Option<ClaimSettings>> {
    let Some(claimant) = &self.claimant else {
      return Ok(None);
    };

    let lease = TimeDelta::try_seconds(self.lease_secs.max(1))
      .filter(|lease| {
        Utc::now()
          .checked_add_signed(*lease)
          .is_some_and(|until| until.year() <= 9999)
      })
      .ok_or_else(|| Error::InvalidSetting {
        key:    "lease_secs",
        reason: format!("{} seconds is too long", self.lease_secs),
      })?;

    Ok(Some(ClaimSettings { claimant: claimant.clone(), lease }))
  }

  /// Build every configured tunnel, each wrapped so its sends are recorded
  /// in `store`.
  pub fn tunnels<S>(&self, store: &S) -> Result<TunnelSet>
  where
    S: PokeStore + Clone + 'static,
  {
    let mut set = TunnelSet::new();

    if let Some(sms) = &self.sms {
      let mut tunnel = SmsTunnel::new(&sms.number, TwilioClient::new(sms.twilio.clone())?)?;
      if let Some(url) = &sms.callback_url {
        tunnel = tunnel.with_callback_url(url);
      }
      set.insert(LogWrapper::new(tunnel, store.clone()))?;
    }

    if let Some(email) = &self.email {
      let credential = read_credential(&email.credential_file)?;
      let mut client = GmailClient::delegated(&credential, &email.address)?;
      if let Some(base) = &email.api_base {
        client = client.with_api_base(base);
      }
      set.insert(LogWrapper::new(MailTunnel::new(&email.address, client)?, store.clone()))?;
    }

    if let Some(voice) = &self.voice {
      set.insert(LogWrapper::new(VoiceTunnel::new(&voice.number)?, store.clone()))?;
    }

    Ok(set)
  }
}

fn read_credential(path: &Path) -> Result<DelegatedCredential> {
  let credential_error = |source: poke_core::BoxError| Error::Credential {
    path: path.to_path_buf(),
    source,
  };
  let raw = std::fs::read_to_string(path).map_err(|e| credential_error(Box::new(e)))?;
  serde_json::from_str(&raw).map_err(|e| credential_error(Box::new(e)))
}
