//! Token providers.
//!
//! [`TokenProvider`] is what the card engine calls before every store
//! operation. [`AuthSession`] implements it on top of a pluggable
//! [`IdentityBackend`]: a silent attempt first, and an interactive one only
//! when the silent attempt says interaction is required.

use std::sync::Arc;

use printq_core::CardError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

// ── TokenProvider ───────────────────────────────────────────────────

/// Source of bearer tokens for the remote store.
///
/// Implementations handle acquisition, caching, and refresh. Unlike an
/// anonymous-capable source this never yields "no token": failing to get
/// one is an error.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    async fn get_token(&self) -> Result<String, CardError>;
}

/// Static bearer token (already obtained externally).
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticToken {
    async fn get_token(&self) -> Result<String, CardError> {
        if self.0.is_empty() {
            return Err(CardError::Auth("empty static token".into()));
        }
        Ok(self.0.clone())
    }
}

// ── Identity backend ────────────────────────────────────────────────

/// The signed-in account a session acquires tokens for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Login name (UPN / e-mail).
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Long-lived credential used by silent acquisition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// A token together with the account record it was issued for. Backends may
/// rotate the refresh token, so the account is returned every time.
#[derive(Debug, Clone)]
pub struct Acquired {
    pub access_token: String,
    pub account: Account,
}

/// Result of a silent acquisition attempt.
#[derive(Debug)]
pub enum SilentOutcome {
    Token(Acquired),
    /// The cached session cannot be used without the user (expired refresh
    /// token, consent required, MFA, ...).
    NeedsInteraction(String),
    /// Anything else (transport, server, malformed response). Propagated
    /// as is, never retried interactively.
    Failed(CardError),
}

/// Identity platform adapter.
#[async_trait::async_trait]
pub trait IdentityBackend: Send + Sync + 'static {
    /// Acquire a token for `account` without user involvement.
    async fn acquire_silent(&self, account: &Account) -> SilentOutcome;

    /// Acquire a token with user involvement (device code, browser, ...).
    async fn acquire_interactive(&self) -> Result<Acquired, CardError>;

    /// Drop any credentials cached for `account`.
    async fn sign_out(&self, _account: &Account) -> Result<(), CardError> {
        Ok(())
    }
}

// ── AuthSession ─────────────────────────────────────────────────────

/// Login state plus silent-then-interactive token acquisition.
pub struct AuthSession {
    backend: Arc<dyn IdentityBackend>,
    account: RwLock<Option<Account>>,
}

impl AuthSession {
    /// A session with nobody signed in.
    pub fn new(backend: Arc<dyn IdentityBackend>) -> Self {
        Self {
            backend,
            account: RwLock::new(None),
        }
    }

    /// A session restored from a previously saved account record.
    pub fn with_account(backend: Arc<dyn IdentityBackend>, account: Account) -> Self {
        Self {
            backend,
            account: RwLock::new(Some(account)),
        }
    }

    /// Current account record, including any rotated refresh token.
    pub async fn account(&self) -> Option<Account> {
        self.account.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.account.read().await.is_some()
    }

    /// Interactive sign-in. Replaces the current account on success.
    pub async fn login(&self) -> Result<Account, CardError> {
        let acquired = self.interactive().await?;
        info!("signed in as {}", acquired.account.username);
        Ok(acquired.account)
    }

    /// Forget the account and any cached credentials.
    pub async fn logout(&self) -> Result<(), CardError> {
        let previous = self.account.write().await.take();
        if let Some(account) = previous {
            self.backend.sign_out(&account).await?;
            info!("signed out {}", account.username);
        }
        Ok(())
    }

    async fn interactive(&self) -> Result<Acquired, CardError> {
        let acquired = self.backend.acquire_interactive().await.map_err(|e| match e {
            CardError::Auth(msg) => CardError::Auth(msg),
            other => CardError::Auth(format!("interactive sign-in failed: {other}")),
        })?;
        *self.account.write().await = Some(acquired.account.clone());
        Ok(acquired)
    }
}

#[async_trait::async_trait]
impl TokenProvider for AuthSession {
    async fn get_token(&self) -> Result<String, CardError> {
        let account = self
            .account
            .read()
            .await
            .clone()
            .ok_or_else(|| CardError::Auth("no signed-in account".into()))?;

        match self.backend.acquire_silent(&account).await {
            SilentOutcome::Token(acquired) => {
                if acquired.account != account {
                    debug!("account record updated by silent refresh");
                    *self.account.write().await = Some(acquired.account);
                }
                Ok(acquired.access_token)
            }
            SilentOutcome::NeedsInteraction(reason) => {
                info!("silent token acquisition needs interaction: {reason}");
                Ok(self.interactive().await?.access_token)
            }
            SilentOutcome::Failed(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    fn account(name: &str) -> Account {
        Account {
            username: name.into(),
            display_name: None,
            refresh_token: Some(format!("rt-{name}")),
        }
    }

    /// Backend that replays scripted outcomes and counts calls.
    struct Scripted {
        silent: Mutex<Vec<SilentOutcome>>,
        interactive: Mutex<Vec<Result<Acquired, CardError>>>,
        silent_calls: AtomicUsize,
        interactive_calls: AtomicUsize,
    }

    impl Scripted {
        fn new(
            silent: Vec<SilentOutcome>,
            interactive: Vec<Result<Acquired, CardError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                silent: Mutex::new(silent),
                interactive: Mutex::new(interactive),
                silent_calls: AtomicUsize::new(0),
                interactive_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl IdentityBackend for Scripted {
        async fn acquire_silent(&self, _account: &Account) -> SilentOutcome {
            self.silent_calls.fetch_add(1, Ordering::SeqCst);
            self.silent.lock().unwrap().remove(0)
        }

        async fn acquire_interactive(&self) -> Result<Acquired, CardError> {
            self.interactive_calls.fetch_add(1, Ordering::SeqCst);
            self.interactive.lock().unwrap().remove(0)
        }
    }

    fn acquired(token: &str, who: &str) -> Acquired {
        Acquired {
            access_token: token.into(),
            account: account(who),
        }
    }

    #[tokio::test]
    async fn static_token_returns_value() {
        let ts = StaticToken::new("my-jwt-token");
        assert_eq!(ts.get_token().await.unwrap(), "my-jwt-token");
        assert!(StaticToken::new("").get_token().await.is_err());
    }

    #[tokio::test]
    async fn no_account_is_auth_error() {
        let backend = Scripted::new(vec![], vec![]);
        let session = AuthSession::new(backend.clone());
        let err = session.get_token().await.unwrap_err();
        assert!(matches!(err, CardError::Auth(_)));
        assert_eq!(backend.silent_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn silent_success_skips_interaction() {
        let backend = Scripted::new(vec![SilentOutcome::Token(acquired("t1", "ana"))], vec![]);
        let session = AuthSession::with_account(backend.clone(), account("ana"));
        assert_eq!(session.get_token().await.unwrap(), "t1");
        assert_eq!(backend.interactive_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn needs_interaction_falls_back_once() {
        let backend = Scripted::new(
            vec![SilentOutcome::NeedsInteraction("refresh token expired".into())],
            vec![Ok(acquired("t2", "bruno"))],
        );
        let session = AuthSession::with_account(backend.clone(), account("ana"));
        assert_eq!(session.get_token().await.unwrap(), "t2");
        assert_eq!(backend.interactive_calls.load(Ordering::SeqCst), 1);
        // Interactive sign-in replaced the account record.
        assert_eq!(session.account().await.unwrap().username, "bruno");
    }

    #[tokio::test]
    async fn other_silent_failure_propagates_unchanged() {
        let backend = Scripted::new(
            vec![SilentOutcome::Failed(CardError::network(
                "token_refresh",
                "connection refused",
            ))],
            vec![],
        );
        let session = AuthSession::with_account(backend.clone(), account("ana"));
        let err = session.get_token().await.unwrap_err();
        match &err {
            CardError::Network { op, message } => {
                assert_eq!(op, "token_refresh");
                assert_eq!(message, "connection refused");
            }
            other => panic!("expected Network, got {other:?}"),
        }
        assert!(!err.needs_reauth());
        assert_eq!(backend.interactive_calls.load(Ordering::SeqCst), 0);
        // The account survives a transient failure.
        assert_eq!(session.account().await.unwrap().username, "ana");
    }

    #[tokio::test]
    async fn interactive_failure_is_fatal() {
        let backend = Scripted::new(
            vec![SilentOutcome::NeedsInteraction("consent".into())],
            vec![Err(CardError::network("device_code", "refused"))],
        );
        let session = AuthSession::with_account(backend.clone(), account("ana"));
        let err = session.get_token().await.unwrap_err();
        assert!(matches!(err, CardError::Auth(_)));
        assert_eq!(backend.silent_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.interactive_calls.load(Ordering::SeqCst), 1);
        // Failed interaction keeps the old record.
        assert_eq!(session.account().await.unwrap().username, "ana");
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_kept() {
        let mut rotated = acquired("t3", "ana");
        rotated.account.refresh_token = Some("rt-new".into());
        let backend = Scripted::new(vec![SilentOutcome::Token(rotated)], vec![]);
        let session = AuthSession::with_account(backend, account("ana"));
        session.get_token().await.unwrap();
        assert_eq!(
            session.account().await.unwrap().refresh_token.as_deref(),
            Some("rt-new")
        );
    }

    #[tokio::test]
    async fn login_then_logout() {
        let backend = Scripted::new(vec![], vec![Ok(acquired("t4", "carla"))]);
        let session = AuthSession::new(backend);
        assert!(!session.is_authenticated().await);
        let account = session.login().await.unwrap();
        assert_eq!(account.username, "carla");
        assert!(session.is_authenticated().await);
        session.logout().await.unwrap();
        assert!(!session.is_authenticated().await);
    }
}
