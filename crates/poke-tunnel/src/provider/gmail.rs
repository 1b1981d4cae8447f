//! Gmail API client authorised through a domain-delegated service account.
//!
//! The service account signs an RS256 JWT assertion naming the mailbox it
//! impersonates (`sub`), exchanges it for an access token at the token URL,
//! and caches that token until shortly before it expires.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use poke_core::ConfigurationError;
use reqwest::Client;
use rsa::{
  RsaPrivateKey,
  pkcs1v15::SigningKey,
  pkcs8::DecodePrivateKey as _,
  signature::{SignatureEncoding as _, Signer as _},
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::Mutex;
use tracing::debug;

use super::{MailFailure, MailProvider};

pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME: TimeDelta = TimeDelta::hours(1);
/// Refresh tokens this long before the provider says they expire.
const EXPIRY_SLACK: TimeDelta = TimeDelta::seconds(60);

// ─── Credential ──────────────────────────────────────────────────────────────

/// Service-account key material plus the claims of the JWT it signs.
///
/// Deserialises straight from a Google service-account JSON key file.
#[derive(Clone, Deserialize)]
pub struct DelegatedCredential {
  #[serde(alias = "client_email")]
  pub email:          String,
  /// PKCS#8 PEM.
  pub private_key:    String,
  pub private_key_id: String,
  #[serde(default = "default_scopes")]
  pub scopes:         Vec<String>,
  #[serde(alias = "token_uri", default = "default_token_url")]
  pub token_url:      String,
  /// Defaults to `token_url`.
  #[serde(default)]
  pub audience:       Option<String>,
  /// The mailbox to impersonate.
  #[serde(default)]
  pub subject:        Option<String>,
}

fn default_scopes() -> Vec<String> { vec![GMAIL_SEND_SCOPE.to_owned()] }

fn default_token_url() -> String { DEFAULT_TOKEN_URL.to_owned() }

impl std::fmt::Debug for DelegatedCredential {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DelegatedCredential")
      .field("email", &self.email)
      .field("private_key", &"<redacted>")
      .field("private_key_id", &self.private_key_id)
      .field("scopes", &self.scopes)
      .field("token_url", &self.token_url)
      .field("audience", &self.audience)
      .field("subject", &self.subject)
      .finish()
  }
}

impl DelegatedCredential {
  /// A copy of this credential impersonating `subject`. The base credential
  /// is left untouched so it can be shared between senders.
  pub fn for_subject(&self, subject: impl Into<String>) -> Self {
    Self { subject: Some(subject.into()), ..self.clone() }
  }

  fn signing_key(&self) -> Result<SigningKey<Sha256>, ConfigurationError> {
    let key = RsaPrivateKey::from_pkcs8_pem(&self.private_key)
      .map_err(|e| ConfigurationError::Credential(format!("private key: {e}")))?;
    Ok(SigningKey::new(key))
  }
}

#[derive(Serialize)]
struct JwtHeader<'a> {
  alg: &'static str,
  typ: &'static str,
  kid: &'a str,
}

#[derive(Serialize)]
struct JwtClaims<'a> {
  iss:   &'a str,
  scope: String,
  aud:   &'a str,
  iat:   i64,
  exp:   i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  sub:   Option<&'a str>,
}

fn jwt_segment<T: Serialize>(value: &T) -> Result<String, MailFailure> {
  let bytes = serde_json::to_vec(value)
    .map_err(|e| MailFailure::Auth(format!("encoding jwt: {e}")))?;
  Ok(URL_SAFE_NO_PAD.encode(bytes))
}

// ─── Client ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default = "default_expires_in")]
  expires_in:   i64,
}

fn default_expires_in() -> i64 { 3600 }

#[derive(Deserialize)]
struct ApiErrorBody {
  error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
  code:    u16,
  message: String,
}

struct CachedToken {
  access_token: String,
  expires_at:   DateTime<Utc>,
}

/// Sends pre-composed messages through `users.messages.send`.
pub struct GmailClient {
  http:        Client,
  credential:  DelegatedCredential,
  signing_key: SigningKey<Sha256>,
  api_base:    String,
  token:       Mutex<Option<CachedToken>>,
}

impl GmailClient {
  /// Validates the key material up front so a broken credential is a
  /// construction error, not a send failure.
  pub fn new(credential: DelegatedCredential) -> Result<Self, ConfigurationError> {
    if credential.email.is_empty() {
      return Err(ConfigurationError::Credential("service account email is empty".into()));
    }
    let signing_key = credential.signing_key()?;
    let http = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| ConfigurationError::Client(Box::new(e)))?;

    Ok(Self {
      http,
      credential,
      signing_key,
      api_base: DEFAULT_API_BASE.to_owned(),
      token: Mutex::new(None),
    })
  }

  /// A client impersonating `subject`, built from a shared base credential.
  pub fn delegated(
    base: &DelegatedCredential,
    subject: &str,
  ) -> Result<Self, ConfigurationError> {
    Self::new(base.for_subject(subject))
  }

  pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
    self.api_base = api_base.into();
    self
  }

  fn assertion(&self, now: DateTime<Utc>) -> Result<String, MailFailure> {
    let cred = &self.credential;
    let header = JwtHeader { alg: "RS256", typ: "JWT", kid: &cred.private_key_id };
    let claims = JwtClaims {
      iss:   &cred.email,
      scope: cred.scopes.join(" "),
      aud:   cred.audience.as_deref().unwrap_or(&cred.token_url),
      iat:   now.timestamp(),
      exp:   (now + ASSERTION_LIFETIME).timestamp(),
      sub:   cred.subject.as_deref(),
    };

    let signing_input = format!("{}.{}", jwt_segment(&header)?, jwt_segment(&claims)?);
    let signature = self.signing_key.sign(signing_input.as_bytes());

    Ok(format!(
      "{signing_input}.{}",
      URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
  }

  async fn access_token(&self) -> Result<String, MailFailure> {
    let mut cached = self.token.lock().await;
    let now = Utc::now();
    if let Some(token) = cached.as_ref()
      && now + EXPIRY_SLACK < token.expires_at
    {
      return Ok(token.access_token.clone());
    }

    let assertion = self.assertion(now)?;
    let resp = self
      .http
      .post(&self.credential.token_url)
      .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
      .send()
      .await
      .map_err(|e| MailFailure::Transport(Box::new(e)))?;

    if !resp.status().is_success() {
      let status = resp.status();
      let body = resp.text().await.unwrap_or_default();
      return Err(MailFailure::Auth(format!("token endpoint {status}: {body}")));
    }

    let token: TokenResponse = resp
      .json()
      .await
      .map_err(|e| MailFailure::Transport(Box::new(e)))?;
    debug!(
      account = %self.credential.email,
      expires_in = token.expires_in,
      "gmail access token refreshed"
    );

    let expires_at = TimeDelta::try_seconds(token.expires_in)
      .and_then(|ttl| now.checked_add_signed(ttl))
      .ok_or_else(|| {
        MailFailure::Auth(format!("token endpoint returned expires_in {}", token.expires_in))
      })?;

    let access_token = token.access_token.clone();
    *cached = Some(CachedToken { access_token: token.access_token, expires_at });
    Ok(access_token)
  }
}

impl MailProvider for GmailClient {
  /// `POST /gmail/v1/users/{user}/messages/send`
  async fn send_raw(&self, user: &str, raw: &str) -> Result<(), MailFailure> {
    let token = self.access_token().await?;
    let url = format!(
      "{}/gmail/v1/users/{user}/messages/send",
      self.api_base.trim_end_matches('/'),
    );

    let resp = self
      .http
      .post(url)
      .bearer_auth(token)
      .json(&serde_json::json!({ "raw": raw }))
      .send()
      .await
      .map_err(|e| MailFailure::Transport(Box::new(e)))?;

    if resp.status().is_success() {
      return Ok(());
    }

    let status = resp.status();
    match resp.json::<ApiErrorBody>().await {
      Ok(body) => Err(MailFailure::Api { code: body.error.code, message: body.error.message }),
      Err(_) => Err(MailFailure::Api { code: status.as_u16(), message: status.to_string() }),
    }
  }
}
