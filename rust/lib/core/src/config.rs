use serde::{Deserialize, Serialize};

use crate::CardError;

pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_LIST_NAME: &str = "SolicitacoesImpressao3D";
pub const DEFAULT_IMAGES_LIBRARY: &str = "ImagensPecas";
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Where the card list lives.
///
/// The site is addressed either by its Graph id or by its server-relative
/// URL (`/sites/Engineering`); the id wins when both are set. The list and
/// the image library are looked up by display name and cached by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Graph API root.
    #[serde(default = "default_graph_url")]
    pub graph_url: String,

    #[serde(default)]
    pub site_id: Option<String>,

    #[serde(default)]
    pub site_url: Option<String>,

    #[serde(default = "default_list_name")]
    pub list_name: String,

    #[serde(default = "default_images_library")]
    pub images_library: String,
}

fn default_graph_url() -> String {
    DEFAULT_GRAPH_URL.to_string()
}

fn default_list_name() -> String {
    DEFAULT_LIST_NAME.to_string()
}

fn default_images_library() -> String {
    DEFAULT_IMAGES_LIBRARY.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            graph_url: default_graph_url(),
            site_id: None,
            site_url: None,
            list_name: default_list_name(),
            images_library: default_images_library(),
        }
    }
}

impl StoreConfig {
    /// Read `PRINTQ_GRAPH_URL`, `PRINTQ_SITE_ID`, `PRINTQ_SITE_URL`,
    /// `PRINTQ_LIST_NAME` and `PRINTQ_IMAGES_LIBRARY` on top of `self`.
    pub fn with_env(mut self) -> Self {
        self.apply_env(|key| std::env::var(key).ok());
        self
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("PRINTQ_GRAPH_URL") {
            self.graph_url = val;
        }
        if let Some(val) = lookup("PRINTQ_SITE_ID") {
            self.site_id = non_empty(&val);
        }
        if let Some(val) = lookup("PRINTQ_SITE_URL") {
            self.site_url = non_empty(&val);
        }
        if let Some(val) = lookup("PRINTQ_LIST_NAME") {
            self.list_name = val;
        }
        if let Some(val) = lookup("PRINTQ_IMAGES_LIBRARY") {
            self.images_library = val;
        }
    }

    /// Check that the store can be addressed at all.
    pub fn validate(&self) -> Result<(), CardError> {
        if self.graph_url.trim().is_empty() {
            return Err(CardError::NotConfigured("graph url is empty".into()));
        }
        if self.site_id.is_none() && self.site_url.is_none() {
            return Err(CardError::NotConfigured(
                "neither site id nor site url is set".into(),
            ));
        }
        if self.list_name.trim().is_empty() {
            return Err(CardError::NotConfigured("list name is empty".into()));
        }
        Ok(())
    }

    /// Graph root without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.graph_url.trim_end_matches('/')
    }
}

/// Identity platform settings for the OAuth token provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_authority")]
    pub authority: String,

    /// Directory (tenant) id, or `organizations` / `common`.
    #[serde(default = "default_tenant")]
    pub tenant: String,

    /// Application (client) id registered with the identity platform.
    #[serde(default)]
    pub client_id: String,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}

fn default_tenant() -> String {
    "organizations".to_string()
}

fn default_scopes() -> Vec<String> {
    [
        "User.Read",
        "Sites.ReadWrite.All",
        "Files.ReadWrite.All",
        "offline_access",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authority: default_authority(),
            tenant: default_tenant(),
            client_id: String::new(),
            scopes: default_scopes(),
        }
    }
}

impl AuthConfig {
    /// Read `PRINTQ_AUTHORITY`, `PRINTQ_TENANT` and `PRINTQ_CLIENT_ID` on top
    /// of `self`.
    pub fn with_env(mut self) -> Self {
        if let Ok(val) = std::env::var("PRINTQ_AUTHORITY") {
            self.authority = val;
        }
        if let Ok(val) = std::env::var("PRINTQ_TENANT") {
            self.tenant = val;
        }
        if let Ok(val) = std::env::var("PRINTQ_CLIENT_ID") {
            self.client_id = val;
        }
        self
    }

    /// `{authority}/{tenant}/oauth2/v2.0/token`.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant
        )
    }

    /// `{authority}/{tenant}/oauth2/v2.0/devicecode`.
    pub fn device_code_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/devicecode",
            self.authority.trim_end_matches('/'),
            self.tenant
        )
    }

    /// Space-separated scope string as the token endpoint expects it.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

fn non_empty(val: &str) -> Option<String> {
    let val = val.trim();
    (!val.is_empty()).then(|| val.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        let mut config = StoreConfig::default();
        config.apply_env(|key| match key {
            "PRINTQ_SITE_ID" => Some("contoso.sharepoint.com,1,2".into()),
            "PRINTQ_LIST_NAME" => Some("Outra".into()),
            _ => None,
        });
        assert_eq!(config.site_id.as_deref(), Some("contoso.sharepoint.com,1,2"));
        assert_eq!(config.list_name, "Outra");
    }

    #[test]
    fn test_validate() {
        let config = StoreConfig::default();
        assert!(matches!(config.validate(), Err(CardError::NotConfigured(_))));

        let config = StoreConfig {
            site_id: Some("site-1".into()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = StoreConfig {
            site_id: Some("site-1".into()),
            list_name: "  ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_env_site_is_unset() {
        let mut config = StoreConfig {
            site_id: Some("old".into()),
            ..Default::default()
        };
        config.apply_env(|key| (key == "PRINTQ_SITE_ID").then(|| " ".to_string()));
        assert_eq!(config.site_id, None);
    }

    #[test]
    fn test_auth_urls() {
        let config = AuthConfig {
            tenant: "contoso".into(),
            ..Default::default()
        };
        assert_eq!(
            config.token_url(),
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/token"
        );
        assert!(config.scope_param().contains("offline_access"));
    }
}
