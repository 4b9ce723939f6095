//! OAuth 2.0 identity backend for the Microsoft identity platform.
//!
//! - Silent: cached access token, else the `refresh_token` grant.
//! - Interactive: the device authorization grant. The user code is handed
//!   to a [`DevicePrompt`]; the token endpoint is then polled until the
//!   user finishes signing in, the code expires, or access is denied.
//!
//! After an interactive grant the signed-in profile is fetched from the
//! Graph `/me` endpoint to name the account.

use std::sync::Arc;
use std::time::Duration;

use printq_core::{AuthConfig, CardError};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::token::{Account, Acquired, IdentityBackend, SilentOutcome};

/// Error codes from the token endpoint that mean "ask the user".
const INTERACTION_ERRORS: &[&str] = &[
    "invalid_grant",
    "interaction_required",
    "consent_required",
    "login_required",
];

const REFRESH_OP: &str = "token_refresh";

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Device code details shown to the user.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Ready-made instruction text from the identity platform.
    #[serde(default)]
    pub message: Option<String>,
}

fn default_interval() -> u64 {
    5
}

/// Called once per interactive sign-in with the code the user must enter.
pub type DevicePrompt = Arc<dyn Fn(&DeviceCode) + Send + Sync>;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    #[serde(default)]
    user_principal_name: Option<String>,
    #[serde(default)]
    mail: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

struct CachedToken {
    username: String,
    access_token: String,
    /// Absolute expiry timestamp (seconds since epoch).
    expires_at: i64,
}

/// OAuth backend: refresh-token silent flow + device-code interactive flow.
pub struct OAuthBackend {
    http: reqwest::Client,
    config: AuthConfig,
    profile_url: String,
    prompt: DevicePrompt,
    cached: RwLock<Option<CachedToken>>,
}

impl OAuthBackend {
    /// `graph_url` is the Graph root used for the `/me` profile lookup.
    pub fn new(config: AuthConfig, graph_url: &str, prompt: DevicePrompt) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            profile_url: format!("{}/me", graph_url.trim_end_matches('/')),
            prompt,
            cached: RwLock::new(None),
        }
    }

    /// Device-code prompt that prints the platform's instructions to stderr.
    pub fn stderr_prompt() -> DevicePrompt {
        Arc::new(|code: &DeviceCode| match &code.message {
            Some(message) => eprintln!("{message}"),
            None => eprintln!(
                "To sign in, open {} and enter the code {}",
                code.verification_uri, code.user_code
            ),
        })
    }

    async fn cached_for(&self, username: &str) -> Option<String> {
        let guard = self.cached.read().await;
        let cached = guard.as_ref()?;
        let now = chrono::Utc::now().timestamp();
        (cached.username == username && now < cached.expires_at)
            .then(|| cached.access_token.clone())
    }

    async fn store_cached(&self, username: &str, token: &TokenResponse) {
        let now = chrono::Utc::now().timestamp();
        // Treat the token as expired 30s early.
        let expires_at = now + token.expires_in as i64 - 30;
        *self.cached.write().await = Some(CachedToken {
            username: username.to_string(),
            access_token: token.access_token.clone(),
            expires_at,
        });
    }

    async fn request_device_code(&self) -> Result<DeviceCode, CardError> {
        let resp = self
            .http
            .post(self.config.device_code_url())
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("scope", self.config.scope_param().as_str()),
            ])
            .send()
            .await
            .map_err(|e| CardError::Auth(format!("device code request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CardError::Auth(format!(
                "device code request returned {status}: {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| CardError::Auth(format!("device code response parse failed: {e}")))
    }

    /// Poll the token endpoint until the device code is redeemed.
    async fn poll_device_code(&self, code: &DeviceCode) -> Result<TokenResponse, CardError> {
        let mut interval = Duration::from_secs(code.interval);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(code.expires_in);

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(CardError::Auth("device code expired".into()));
            }
            tokio::time::sleep(interval).await;

            let resp = self
                .http
                .post(self.config.token_url())
                .form(&[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("client_id", self.config.client_id.as_str()),
                    ("device_code", code.device_code.as_str()),
                ])
                .send()
                .await
                .map_err(|e| CardError::Auth(format!("token request failed: {e}")))?;

            if resp.status().is_success() {
                return resp
                    .json()
                    .await
                    .map_err(|e| CardError::Auth(format!("token response parse failed: {e}")));
            }

            let body: TokenErrorResponse = resp
                .json()
                .await
                .map_err(|e| CardError::Auth(format!("token error parse failed: {e}")))?;
            match body.error.as_str() {
                "authorization_pending" => debug!("device code pending"),
                "slow_down" => interval += Duration::from_secs(5),
                _ => {
                    return Err(CardError::Auth(format!(
                        "device sign-in failed: {}",
                        body.error_description.unwrap_or(body.error)
                    )))
                }
            }
        }
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, CardError> {
        let resp = self
            .http
            .get(&self.profile_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| CardError::Auth(format!("profile fetch failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CardError::Auth(format!("profile returned {status}: {body}")));
        }

        resp.json()
            .await
            .map_err(|e| CardError::Auth(format!("profile parse failed: {e}")))
    }
}

#[async_trait::async_trait]
impl IdentityBackend for OAuthBackend {
    async fn acquire_silent(&self, account: &Account) -> SilentOutcome {
        if let Some(token) = self.cached_for(&account.username).await {
            return SilentOutcome::Token(Acquired {
                access_token: token,
                account: account.clone(),
            });
        }

        let Some(refresh_token) = account.refresh_token.as_deref() else {
            return SilentOutcome::NeedsInteraction("no refresh token".into());
        };

        let sent = self
            .http
            .post(self.config.token_url())
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("scope", self.config.scope_param().as_str()),
            ])
            .send()
            .await;
        let resp = match sent {
            Ok(resp) => resp,
            Err(e) => return SilentOutcome::Failed(CardError::network(REFRESH_OP, e.to_string())),
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) if INTERACTION_ERRORS.contains(&err.error.as_str()) => {
                    SilentOutcome::NeedsInteraction(err.error_description.unwrap_or(err.error))
                }
                _ => SilentOutcome::Failed(CardError::from_status(
                    REFRESH_OP,
                    status.as_u16(),
                    body,
                )),
            };
        }

        let token: TokenResponse = match resp.json().await {
            Ok(token) => token,
            Err(e) => return SilentOutcome::Failed(CardError::decode(REFRESH_OP, e.to_string())),
        };
        self.store_cached(&account.username, &token).await;

        let mut account = account.clone();
        if token.refresh_token.is_some() {
            account.refresh_token = token.refresh_token.clone();
        }
        SilentOutcome::Token(Acquired {
            access_token: token.access_token,
            account,
        })
    }

    async fn acquire_interactive(&self) -> Result<Acquired, CardError> {
        if self.config.client_id.is_empty() {
            return Err(CardError::Auth("client id is not configured".into()));
        }

        let code = self.request_device_code().await?;
        (self.prompt)(&code);
        let token = self.poll_device_code(&code).await?;

        let profile = self.fetch_profile(&token.access_token).await?;
        let username = profile
            .user_principal_name
            .or(profile.mail)
            .ok_or_else(|| CardError::Auth("profile has no user name".into()))?;
        if token.refresh_token.is_none() {
            warn!("no refresh token issued; silent sign-in will not survive a restart");
        }
        self.store_cached(&username, &token).await;

        Ok(Acquired {
            access_token: token.access_token,
            account: Account {
                username,
                display_name: profile.display_name,
                refresh_token: token.refresh_token,
            },
        })
    }

    async fn sign_out(&self, _account: &Account) -> Result<(), CardError> {
        *self.cached.write().await = None;
        Ok(())
    }
}
