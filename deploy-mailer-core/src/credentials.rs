//! # credentials: Gmail OAuth credential provider
//!
//! The persisted token file moves through four explicit states:
//!
//! | state                   | meaning                                   | next step               |
//! |-------------------------|-------------------------------------------|-------------------------|
//! | `Absent`                | no (readable) token file                  | consent flow            |
//! | `Valid`                 | access token not expired                  | use it                  |
//! | `ExpiredRefreshable`    | expired, has a refresh token              | refresh at `token_uri`  |
//! | `ExpiredUnrefreshable`  | expired, no refresh token                 | consent flow            |
//!
//! A successful refresh or consent always ends in `Valid` and rewrites the
//! token file. A failed refresh is an authentication error; it does not fall
//! back to consent.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::contract::{ApiRequest, ApiTransport, ConsentPrompt, HttpMethod, TokenSource};
use crate::error::{CoreError, Result};

pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// OAuth client registration, one section of `credentials.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<OAuthClient>,
    web: Option<OAuthClient>,
}

/// Reads the `installed` (preferred) or `web` client from `credentials.json`.
pub fn load_client_secrets(path: &Path) -> Result<OAuthClient> {
    let raw = fs::read_to_string(path).map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to read OAuth client secrets");
        CoreError::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    let file: ClientSecretsFile = serde_json::from_str(&raw)?;
    file.installed.or(file.web).ok_or_else(|| {
        CoreError::Config(format!(
            "{} has neither an \"installed\" nor a \"web\" client",
            path.display()
        ))
    })
}

/// The persisted token, field-compatible with Google's authorized-user JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now,
            None => false,
        }
    }
}

pub fn load_token(path: &Path) -> Option<StoredToken> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable token file");
            None
        }
    }
}

pub fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(token)?)?;
    debug!(path = %path.display(), "Token persisted");
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum CredentialState {
    Absent,
    Valid(StoredToken),
    ExpiredRefreshable(StoredToken),
    ExpiredUnrefreshable(StoredToken),
}

impl CredentialState {
    pub fn classify(token: Option<StoredToken>, now: DateTime<Utc>) -> Self {
        match token {
            None => CredentialState::Absent,
            Some(t) if !t.is_expired(now) => CredentialState::Valid(t),
            Some(t) if t.refresh_token.as_deref().is_some_and(|r| !r.is_empty()) => {
                CredentialState::ExpiredRefreshable(t)
            }
            Some(t) => CredentialState::ExpiredUnrefreshable(t),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CredentialState::Absent => "absent",
            CredentialState::Valid(_) => "valid",
            CredentialState::ExpiredRefreshable(_) => "expired-refreshable",
            CredentialState::ExpiredUnrefreshable(_) => "expired-unrefreshable",
        }
    }
}

/// PKCE challenge for OAuth 2.0 authorization
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    pub fn new() -> Self {
        let verifier = random_alphanumeric(64);
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());
        Self {
            verifier,
            challenge,
        }
    }
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Builds the consent-screen URL. `access_type=offline` asks for a refresh token.
pub fn build_authorize_url(
    client: &OAuthClient,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
    pkce: &PkceChallenge,
) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256&access_type=offline&prompt=consent",
        client.auth_uri,
        urlencoding::encode(&client.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes.join(" ")),
        urlencoding::encode(state),
        urlencoding::encode(&pkce.challenge),
    )
}

/// OAuth token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

pub struct CredentialProvider<T, P> {
    transport: T,
    prompt: P,
    credentials_path: PathBuf,
    token_path: PathBuf,
    scopes: Vec<String>,
}

impl<T: ApiTransport, P: ConsentPrompt> CredentialProvider<T, P> {
    pub fn new(
        transport: T,
        prompt: P,
        credentials_path: impl Into<PathBuf>,
        token_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            prompt,
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
            scopes: vec![GMAIL_SEND_SCOPE.to_string()],
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> CredentialState {
        CredentialState::classify(load_token(&self.token_path), now)
    }

    /// A usable access token, refreshing or running consent as the state requires.
    pub async fn access_token_at(&self, now: DateTime<Utc>) -> Result<String> {
        let state = self.state(now);
        info!(state = state.name(), "Resolving Gmail credentials");
        let token = match state {
            CredentialState::Valid(token) => return Ok(token.token),
            CredentialState::ExpiredRefreshable(token) => self.refresh(token, now).await?,
            CredentialState::Absent | CredentialState::ExpiredUnrefreshable(_) => {
                self.consent(now).await?
            }
        };
        save_token(&self.token_path, &token)?;
        Ok(token.token)
    }

    async fn refresh(&self, token: StoredToken, now: DateTime<Utc>) -> Result<StoredToken> {
        let refresh_token = token.refresh_token.clone().unwrap_or_default();
        let mut form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token),
            ("client_id".to_string(), token.client_id.clone()),
        ];
        if let Some(secret) = &token.client_secret {
            form.push(("client_secret".to_string(), secret.clone()));
        }

        let res = self
            .transport
            .send(ApiRequest::new(HttpMethod::Post, token.token_uri.clone()).form(form))
            .await?;
        if !res.is_success() {
            error!(status = res.status, "Token refresh rejected");
            return Err(CoreError::Auth(format!(
                "token refresh failed ({}): {}",
                res.status,
                res.body_text()
            )));
        }
        let granted: TokenResponse = serde_json::from_value(res.body)?;
        info!("Access token refreshed");
        Ok(apply_grant(token, granted, now))
    }

    async fn consent(&self, now: DateTime<Utc>) -> Result<StoredToken> {
        let client = load_client_secrets(&self.credentials_path)?;
        let pkce = PkceChallenge::new();
        let state = random_alphanumeric(32);
        let redirect_uri = self.prompt.redirect_uri();
        let url = build_authorize_url(&client, &redirect_uri, &self.scopes, &state, &pkce);

        info!(client_id = %client.client_id, "Starting OAuth consent flow");
        let code = self.prompt.obtain_code(&url, &state).await?;

        let mut form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code),
            ("redirect_uri".to_string(), redirect_uri),
            ("client_id".to_string(), client.client_id.clone()),
            ("code_verifier".to_string(), pkce.verifier),
        ];
        if let Some(secret) = &client.client_secret {
            form.push(("client_secret".to_string(), secret.clone()));
        }
        let res = self
            .transport
            .send(ApiRequest::new(HttpMethod::Post, client.token_uri.clone()).form(form))
            .await?;
        if !res.is_success() {
            error!(status = res.status, "Authorization code exchange rejected");
            return Err(CoreError::Auth(format!(
                "code exchange failed ({}): {}",
                res.status,
                res.body_text()
            )));
        }
        let granted: TokenResponse = serde_json::from_value(res.body)?;
        let seed = StoredToken {
            token: String::new(),
            refresh_token: None,
            token_uri: client.token_uri,
            client_id: client.client_id,
            client_secret: client.client_secret,
            scopes: self.scopes.clone(),
            expiry: None,
        };
        info!("OAuth consent completed");
        Ok(apply_grant(seed, granted, now))
    }
}

#[async_trait]
impl<T: ApiTransport, P: ConsentPrompt> TokenSource for CredentialProvider<T, P> {
    async fn access_token(&self) -> Result<String> {
        self.access_token_at(Utc::now()).await
    }
}

fn apply_grant(mut token: StoredToken, granted: TokenResponse, now: DateTime<Utc>) -> StoredToken {
    token.token = granted.access_token;
    if let Some(refresh) = granted.refresh_token {
        token.refresh_token = Some(refresh);
    }
    token.expiry = granted.expires_in.map(|secs| now + Duration::seconds(secs));
    if let Some(scope) = granted.scope {
        token.scopes = scope.split_whitespace().map(str::to_string).collect();
    }
    token
}
