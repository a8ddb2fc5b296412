//! Supabase Auth (GoTrue) client implementing [`SessionProvider`].
//!
//! Sessions live in a [`SessionVault`]; this client is the only writer. Every
//! change to the stored session is broadcast to subscribers as an
//! [`AuthChange`].

use crate::clock::{Clock, TokioClock};
use crate::pkce;
use crate::session::{AuthChange, AuthEvent, Identity, Session, SessionProvider};
use crate::supabase_client::summarize_response_body;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use hapien_config_and_utils::ServiceCredentials;
use hapien_storage::{SessionVault, StoredSession};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use url::Url;

/// Refresh when the access token has less than this left.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Capacity of the session-change channel. Slow subscribers skip events
/// rather than blocking the provider.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Configuration for retry behavior during token refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

#[derive(Debug, Serialize)]
struct OtpRequest<'a> {
    email: &'a str,
    create_user: bool,
    code_challenge: String,
    code_challenge_method: &'static str,
}

#[derive(Debug, Serialize)]
struct PkceExchangeRequest<'a> {
    auth_code: &'a str,
    code_verifier: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyOtpRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    email: &'a str,
    token: &'a str,
}

/// Token grant response shared by the pkce, refresh and verify endpoints.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + ChronoDuration::seconds(self.expires_in),
            user: Identity {
                id: self.user.id,
                email: self.user.email,
            },
        }
    }
}

/// Error payload shapes returned by GoTrue.
#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Human-readable message from a provider error body.
fn provider_message(status: reqwest::StatusCode, body: &str) -> String {
    let parsed: ProviderErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| format!("HTTP {} ({})", status, summarize_response_body(body)))
}

async fn read_failure(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    provider_message(status, &body)
}

/// Supabase identity provider client.
pub struct SupabaseAuth {
    http_client: Client,
    auth_url: String,
    publishable_key: String,
    vault: SessionVault,
    clock: Arc<dyn Clock>,
    refresh_config: RefreshConfig,
    events: broadcast::Sender<AuthChange>,
    /// Serializes refreshes so concurrent readers do not spend the same
    /// refresh token twice.
    refresh_lock: Mutex<()>,
}

impl SupabaseAuth {
    /// Create a client for the given project.
    pub fn new(credentials: &ServiceCredentials, vault: SessionVault) -> Self {
        Self::with_refresh_config(credentials, vault, RefreshConfig::default(), Arc::new(TokioClock))
    }

    /// Create a client with custom refresh retry behavior.
    pub fn with_refresh_config(
        credentials: &ServiceCredentials,
        vault: SessionVault,
        refresh_config: RefreshConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            http_client: Client::new(),
            auth_url: format!("{}/auth/v1", credentials.url.trim_end_matches('/')),
            publishable_key: credentials.publishable_key.clone(),
            vault,
            clock,
            refresh_config,
            events,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Underlying vault, for diagnostics.
    pub fn vault(&self) -> &SessionVault {
        &self.vault
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.auth_url, path)
    }

    fn broadcast(&self, event: AuthEvent, session: Option<Session>) {
        // No receivers is fine.
        let _ = self.events.send(AuthChange::new(event, session));
    }

    fn persist(&self, session: &Session) -> AuthResult<()> {
        self.vault.store_session(&StoredSession::from(session))?;
        Ok(())
    }

    /// Send a magic link to `email`.
    ///
    /// Stores a fresh PKCE verifier; the link lands on `redirect_to` with a
    /// `code` parameter for [`exchange_code_for_session`](Self::exchange_code_for_session).
    pub async fn send_magic_link(&self, email: &str, redirect_to: &str) -> AuthResult<()> {
        let verifier = pkce::generate_code_verifier();
        let url = Url::parse_with_params(&self.endpoint("otp"), &[("redirect_to", redirect_to)])?;

        debug!(email = %email, "Requesting magic link");

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.publishable_key)
            .json(&OtpRequest {
                email,
                create_user: true,
                code_challenge: pkce::code_challenge(&verifier),
                code_challenge_method: pkce::CHALLENGE_METHOD,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let message = read_failure(response).await;
            warn!(error = %message, "Magic link request failed");
            return Err(AuthError::Rejected(message));
        }

        self.vault.set_code_verifier(&verifier)?;
        info!(email = %email, "Magic link sent");
        Ok(())
    }

    /// Redeem the `code` from a magic-link redirect for a session.
    pub async fn exchange_code_for_session(&self, code: &str) -> AuthResult<Session> {
        let verifier = self
            .vault
            .code_verifier()?
            .ok_or(AuthError::MissingCodeVerifier)?;

        debug!("Exchanging redirect code for session");

        let response = self
            .http_client
            .post(self.endpoint("token?grant_type=pkce"))
            .header("apikey", &self.publishable_key)
            .json(&PkceExchangeRequest {
                auth_code: code,
                code_verifier: &verifier,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let message = read_failure(response).await;
            warn!(error = %message, "Code exchange failed");
            return Err(AuthError::InvalidCredentials(message));
        }

        let session = response.json::<TokenResponse>().await?.into_session();
        self.persist(&session)?;
        self.vault.clear_code_verifier()?;

        info!(user_id = %session.user.id, "Signed in via magic link");
        self.broadcast(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Sign in with the one-time code from the sign-in email.
    pub async fn verify_email_otp(&self, email: &str, token: &str) -> AuthResult<Session> {
        let response = self
            .http_client
            .post(self.endpoint("verify"))
            .header("apikey", &self.publishable_key)
            .json(&VerifyOtpRequest {
                kind: "email",
                email,
                token,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let message = read_failure(response).await;
            warn!(error = %message, "OTP verification failed");
            return Err(AuthError::InvalidCredentials(message));
        }

        let session = response.json::<TokenResponse>().await?.into_session();
        self.persist(&session)?;

        info!(user_id = %session.user.id, "Signed in via email code");
        self.broadcast(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Refresh the session with exponential backoff retry.
    async fn refresh_with_backoff(&self, current: &Session) -> AuthResult<Session> {
        let mut last_error = None;

        for attempt in 0..self.refresh_config.max_retries {
            match self.try_refresh(&current.refresh_token).await {
                Ok(session) => {
                    self.persist(&session)?;
                    info!(user_id = %session.user.id, "Token refreshed");
                    self.broadcast(AuthEvent::TokenRefreshed, Some(session.clone()));
                    return Ok(session);
                }
                Err(e) if e.is_transient() => {
                    last_error = Some(e);

                    if attempt + 1 < self.refresh_config.max_retries {
                        let delay = self.refresh_config.delay_for_attempt(attempt);
                        debug!(
                            attempt = attempt + 1,
                            max_retries = self.refresh_config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "Refresh failed with transient error, retrying"
                        );
                        self.clock.sleep(delay).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Refresh rejected, clearing session");
                    self.vault.clear_session()?;
                    self.broadcast(AuthEvent::SignedOut, None);
                    return Err(e);
                }
            }
        }

        // Transient failures only. A token that has not expired yet is still usable.
        if !current.is_expired() {
            warn!("Refresh unavailable, keeping current token until it expires");
            return Ok(current.clone());
        }

        warn!(
            attempts = self.refresh_config.max_retries,
            "Refresh failed and token expired, clearing session"
        );
        self.vault.clear_session()?;
        self.broadcast(AuthEvent::SignedOut, None);
        Err(last_error.unwrap_or(AuthError::RefreshExhausted(self.refresh_config.max_retries)))
    }

    /// Single refresh attempt.
    async fn try_refresh(&self, refresh_token: &str) -> AuthResult<Session> {
        let response = self
            .http_client
            .post(self.endpoint("token?grant_type=refresh_token"))
            .header("apikey", &self.publishable_key)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            debug!(status = %status, "Refresh hit a server error");
            return Err(AuthError::NetworkUnavailable);
        }
        if !status.is_success() {
            return Err(AuthError::TokenRefresh(read_failure(response).await));
        }

        Ok(response.json::<TokenResponse>().await?.into_session())
    }
}

#[async_trait]
impl SessionProvider for SupabaseAuth {
    async fn get_session(&self) -> AuthResult<Option<Session>> {
        let margin = ChronoDuration::seconds(REFRESH_MARGIN_SECS);

        let session = match self.vault.load_session()? {
            Some(stored) => Session::from(stored),
            None => return Ok(None),
        };
        if !session.expires_within(margin) {
            return Ok(Some(session));
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        let session = match self.vault.load_session()? {
            Some(stored) => Session::from(stored),
            None => return Ok(None),
        };
        if !session.expires_within(margin) {
            return Ok(Some(session));
        }

        self.refresh_with_backoff(&session).await.map(Some)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }

    async fn sign_out(&self) -> AuthResult<()> {
        if let Some(stored) = self.vault.load_session()? {
            let result = self
                .http_client
                .post(self.endpoint("logout"))
                .header("apikey", &self.publishable_key)
                .header("Authorization", format!("Bearer {}", stored.access_token))
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    debug!("Server session revoked");
                }
                Ok(response) => {
                    warn!(status = %response.status(), "Server logout failed, clearing locally");
                }
                Err(e) => {
                    warn!(error = %e, "Server logout unreachable, clearing locally");
                }
            }
        }

        self.vault.clear_session()?;
        info!("Signed out");
        self.broadcast(AuthEvent::SignedOut, None);
        Ok(())
    }
}
