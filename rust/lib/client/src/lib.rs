//! Bearer-token acquisition for the printq store client.
//!
//! Authentication is handled by pluggable [`TokenProvider`] implementations
//! (Go-style `oauth2.TokenSource` pattern). [`AuthSession`] layers login
//! state and the silent-then-interactive fallback over an
//! [`IdentityBackend`]; [`OAuthBackend`] is the Microsoft identity platform
//! implementation of that backend.
//!
//! # Usage
//!
//! ```ignore
//! use printq_client::{AuthSession, OAuthBackend, TokenProvider};
//!
//! let backend = OAuthBackend::new(auth_config, graph_url, OAuthBackend::stderr_prompt());
//! let session = AuthSession::new(Arc::new(backend));
//! session.login().await?;
//! let token = session.get_token().await?;
//! ```

pub mod oauth;
pub mod token;

pub use oauth::{DeviceCode, DevicePrompt, OAuthBackend};
pub use token::{
    Account, Acquired, AuthSession, IdentityBackend, SilentOutcome, StaticToken, TokenProvider,
};
