pub mod card;
pub mod context;
pub mod login;
pub mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use printq_card::{CardEngine, GraphCardStore};
use printq_client::{AuthSession, OAuthBackend, StaticToken, TokenProvider};

use crate::config::{ClientConfig, Context};

/// Everything a command needs to talk to the current context's list.
pub struct Session {
    config_path: PathBuf,
    pub ctx: Context,
    pub auth: Arc<AuthSession>,
    /// Token source for store calls: `PRINTQ_TOKEN` when set, else `auth`.
    pub token: Arc<dyn TokenProvider>,
    pub store: Arc<GraphCardStore>,
}

impl Session {
    /// Build a session for the current context. `PRINTQ_*` environment
    /// variables override the stored settings.
    pub fn open(config_path: &Path) -> Result<Self> {
        let config = ClientConfig::load(config_path)?;
        let ctx = config
            .current()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No current context. Run `printq context create <name>`."))?;

        let store_config = ctx.store.clone().with_env();
        let backend = Arc::new(OAuthBackend::new(
            ctx.auth.clone().with_env(),
            &store_config.graph_url,
            OAuthBackend::stderr_prompt(),
        ));
        let auth = match ctx.account.clone() {
            Some(account) => AuthSession::with_account(backend, account),
            None => AuthSession::new(backend),
        };

        let auth = Arc::new(auth);
        let token: Arc<dyn TokenProvider> = match std::env::var("PRINTQ_TOKEN") {
            Ok(t) if !t.trim().is_empty() => {
                tracing::debug!("using PRINTQ_TOKEN");
                Arc::new(StaticToken::new(t.trim()))
            }
            _ => auth.clone(),
        };

        Ok(Self {
            config_path: config_path.to_path_buf(),
            ctx,
            auth,
            token,
            store: Arc::new(GraphCardStore::new(store_config)),
        })
    }

    pub fn engine(&self) -> CardEngine {
        CardEngine::new(self.store.clone(), self.token.clone())
    }

    /// Write the session's account back to the context when sign-in or a
    /// token refresh changed it.
    pub async fn persist(&self) -> Result<()> {
        let account = self.auth.account().await;
        if account == self.ctx.account {
            return Ok(());
        }
        let mut config = ClientConfig::load(&self.config_path)?;
        let ctx = config
            .get_mut(&self.ctx.name)
            .ok_or_else(|| anyhow::anyhow!("Context \"{}\" disappeared.", self.ctx.name))?;
        ctx.account = account;
        config.save(&self.config_path)?;
        Ok(())
    }
}

/// Run a command body, then persist the account even if the body failed
/// (a refreshed token is still worth keeping).
pub async fn with_session<F, Fut>(config_path: &Path, body: F) -> Result<()>
where
    F: FnOnce(Arc<Session>) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let session = Arc::new(Session::open(config_path)?);
    let result = body(session.clone()).await;
    session.persist().await?;
    result
}

/// Ask for confirmation on stderr; true only for an explicit yes.
pub fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N]: ");
    let mut s = String::new();
    std::io::stdin().read_line(&mut s)?;
    Ok(s.trim().eq_ignore_ascii_case("y"))
}

/// Pretty-print any serializable value as JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cut `s` to `max` characters, marking the cut with `…`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("Manutenção", 20), "Manutenção");
        assert_eq!(truncate("Suporte do sensor", 8), "Suporte…");
    }
}
