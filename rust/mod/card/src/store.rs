use std::sync::{PoisonError, RwLock};

use printq_core::{sanitize_file_name, short_id, CardError, StoreConfig};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::codec::{encode_new, encode_patch, parse_remote_item};
use crate::model::{Card, CardPatch, ImageKind, ImageUpload, NewCard};

// ---------------------------------------------------------------------------
// CardStore: the seam between the engine and the remote list
// ---------------------------------------------------------------------------

/// Remote persistence for cards.
///
/// Every operation needs a token set through [`CardStore::set_auth_token`]
/// first and fails with `NotConfigured` otherwise. Implementations never
/// retry.
#[async_trait::async_trait]
pub trait CardStore: Send + Sync + 'static {
    fn set_auth_token(&self, token: &str);

    /// All cards, newest request first. Degrades to an empty list when the
    /// store's own configuration is invalid.
    async fn get_cards(&self) -> Result<Vec<Card>, CardError>;

    async fn get_card(&self, id: &str) -> Result<Card, CardError>;

    /// Create and return the stored record (a re-fetch, not an echo).
    async fn create_card(&self, new: &NewCard) -> Result<Card, CardError>;

    /// Write the changed fields and return the stored record.
    async fn update_card(&self, id: &str, patch: &CardPatch) -> Result<Card, CardError>;

    async fn delete_card(&self, id: &str) -> Result<(), CardError>;

    /// Store an image and return its web URL.
    async fn upload_image(&self, upload: &ImageUpload, kind: ImageKind) -> Result<String, CardError>;
}

// ---------------------------------------------------------------------------
// GraphCardStore
// ---------------------------------------------------------------------------

/// Ids of the site resources the store works against, resolved on first
/// use and kept for the store's lifetime.
#[derive(Debug, Clone, Default)]
struct Resources {
    site_id: Option<String>,
    list_id: Option<String>,
    drive_id: Option<String>,
}

/// Outcome of [`GraphCardStore::check_connection`].
#[derive(Debug, Clone)]
pub struct ConnectionReport {
    pub site_id: String,
    pub list_id: String,
    /// `None` when the image library does not exist.
    pub drive_id: Option<String>,
    pub card_count: usize,
}

/// [`CardStore`] backed by a SharePoint list through Microsoft Graph.
///
/// Items live at `{graph}/sites/{site}/lists/{list}/items/{id}`; images go
/// to the document library `{graph}/sites/{site}/drives/{drive}`.
pub struct GraphCardStore {
    http: reqwest::Client,
    config: StoreConfig,
    token: RwLock<Option<String>>,
    resources: tokio::sync::RwLock<Resources>,
}

impl GraphCardStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: StoreConfig) -> Self {
        Self {
            http,
            config,
            token: RwLock::new(None),
            resources: tokio::sync::RwLock::new(Resources::default()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Resolve every resource and count the cards.
    ///
    /// Unlike [`CardStore::get_cards`] an invalid configuration is reported
    /// as an error here.
    pub async fn check_connection(&self) -> Result<ConnectionReport, CardError> {
        let token = self.preflight("check_connection")?;
        let site_id = self.site_id(&token).await?;
        let list_id = self.list_id(&token).await?;
        let drive_id = match self.drive_id(&token).await {
            Ok(id) => Some(id),
            Err(CardError::ResourceNotFound(name)) => {
                warn!("image library missing: {name}");
                None
            }
            Err(e) => return Err(e),
        };
        let card_count = self.fetch_cards(&token).await?.len();
        Ok(ConnectionReport {
            site_id,
            list_id,
            drive_id,
            card_count,
        })
    }

    // =======================================================================
    // Request plumbing
    // =======================================================================

    fn current_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Configuration and token check shared by every operation.
    fn preflight(&self, op: &str) -> Result<String, CardError> {
        self.config.validate()?;
        self.current_token()
            .ok_or_else(|| CardError::NotConfigured(format!("{op}: no auth token set")))
    }

    /// Send an authenticated request, mapping failures to `CardError`.
    async fn send(
        &self,
        op: &str,
        token: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, CardError> {
        let resp = builder
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CardError::network(op, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CardError::from_status(op, status.as_u16(), graph_message(&body)));
        }
        Ok(resp)
    }

    async fn send_json(
        &self,
        op: &str,
        token: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<Value, CardError> {
        let resp = self.send(op, token, builder).await?;
        resp.json::<Value>()
            .await
            .map_err(|e| CardError::decode(op, format!("response body: {e}")))
    }

    fn base(&self) -> &str {
        self.config.base_url()
    }

    /// URL that addresses the configured site directly.
    fn site_url(&self) -> String {
        match (&self.config.site_id, &self.config.site_url) {
            (Some(id), _) => format!("{}/sites/{}", self.base(), id),
            (None, Some(path)) => {
                let path = if path.starts_with('/') {
                    path.clone()
                } else {
                    format!("/{path}")
                };
                format!("{}/sites/root:{}", self.base(), path)
            }
            (None, None) => format!("{}/sites/root", self.base()),
        }
    }

    // =======================================================================
    // Resource resolution (cached)
    // =======================================================================

    async fn site_id(&self, token: &str) -> Result<String, CardError> {
        // Fast path: read lock, check cache.
        if let Some(id) = self.resources.read().await.site_id.clone() {
            return Ok(id);
        }

        let mut guard = self.resources.write().await;
        if let Some(id) = guard.site_id.clone() {
            return Ok(id);
        }

        let id = match &self.config.site_id {
            Some(id) => id.clone(),
            None => {
                let site = self
                    .send_json("resolve_site", token, self.http.get(self.site_url()))
                    .await?;
                site.get("id")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .ok_or_else(|| CardError::decode("resolve_site", "site has no id"))?
            }
        };
        info!("resolved site {id}");
        guard.site_id = Some(id.clone());
        Ok(id)
    }

    async fn list_id(&self, token: &str) -> Result<String, CardError> {
        if let Some(id) = self.resources.read().await.list_id.clone() {
            return Ok(id);
        }
        let site_id = self.site_id(token).await?;

        let mut guard = self.resources.write().await;
        if let Some(id) = guard.list_id.clone() {
            return Ok(id);
        }

        let name = &self.config.list_name;
        let url = format!("{}/sites/{}/lists", self.base(), site_id);
        let filter = format!("displayName eq '{}'", odata_quote(name));
        let id = self
            .find_by_name("resolve_list", token, &url, &filter, "displayName", name)
            .await?
            .ok_or_else(|| CardError::ResourceNotFound(format!("list '{name}'")))?;
        info!("resolved list '{name}' -> {id}");
        guard.list_id = Some(id.clone());
        Ok(id)
    }

    async fn drive_id(&self, token: &str) -> Result<String, CardError> {
        if let Some(id) = self.resources.read().await.drive_id.clone() {
            return Ok(id);
        }
        let site_id = self.site_id(token).await?;

        let mut guard = self.resources.write().await;
        if let Some(id) = guard.drive_id.clone() {
            return Ok(id);
        }

        let name = &self.config.images_library;
        let url = format!("{}/sites/{}/drives", self.base(), site_id);
        let filter = format!("name eq '{}'", odata_quote(name));
        let id = self
            .find_by_name("resolve_images_library", token, &url, &filter, "name", name)
            .await?
            .ok_or_else(|| CardError::ResourceNotFound(format!("image library '{name}'")))?;
        info!("resolved image library '{name}' -> {id}");
        guard.drive_id = Some(id.clone());
        Ok(id)
    }

    /// Query a site collection with `$filter` and return the id of the
    /// entry whose `key` equals `name`.
    async fn find_by_name(
        &self,
        op: &str,
        token: &str,
        url: &str,
        filter: &str,
        key: &str,
        name: &str,
    ) -> Result<Option<String>, CardError> {
        let body = self
            .send_json(op, token, self.http.get(url).query(&[("$filter", filter)]))
            .await?;
        let found = body
            .get("value")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find(|entry| entry.get(key).and_then(Value::as_str) == Some(name))
            .and_then(|entry| entry.get("id").and_then(Value::as_str))
            .map(String::from);
        Ok(found)
    }

    async fn items_url(&self, token: &str) -> Result<String, CardError> {
        let site_id = self.site_id(token).await?;
        let list_id = self.list_id(token).await?;
        Ok(format!(
            "{}/sites/{}/lists/{}/items",
            self.base(),
            site_id,
            list_id
        ))
    }

    // =======================================================================
    // Operations
    // =======================================================================

    async fn fetch_cards(&self, token: &str) -> Result<Vec<Card>, CardError> {
        const OP: &str = "get_cards";
        let url = self.items_url(token).await?;

        let mut cards = Vec::new();
        let mut request = self.http.get(&url).query(&[
            ("$expand", "fields"),
            ("$orderby", "createdDateTime desc"),
        ]);
        loop {
            let page = self.send_json(OP, token, request).await?;
            let items = page
                .get("value")
                .and_then(Value::as_array)
                .ok_or_else(|| CardError::decode(OP, "items response has no value array"))?;
            for item in items {
                cards.push(parse_remote_item(item)?);
            }
            match page.get("@odata.nextLink").and_then(Value::as_str) {
                Some(next) => {
                    debug!("following nextLink ({} cards so far)", cards.len());
                    request = self.http.get(next);
                }
                None => break,
            }
        }

        // Newest request first, then newest created.
        cards.sort_by(|a, b| {
            b.request_date
                .cmp(&a.request_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        debug!("fetched {} cards", cards.len());
        Ok(cards)
    }

    async fn fetch_card(&self, op: &str, token: &str, id: &str) -> Result<Card, CardError> {
        let url = format!("{}/{}", self.items_url(token).await?, id);
        let item = self
            .send_json(op, token, self.http.get(&url).query(&[("$expand", "fields")]))
            .await
            .map_err(|e| card_not_found(e, id))?;
        parse_remote_item(&item)
    }

    /// Re-read a card after a committed write. Failure here means the write
    /// happened but the caller has no authoritative copy.
    async fn refetch_after_write(&self, op: &str, token: &str, id: &str) -> Result<Card, CardError> {
        self.fetch_card(op, token, id)
            .await
            .map_err(|source| CardError::Unsynced {
                op: op.to_string(),
                id: id.to_string(),
                source: Box::new(source),
            })
    }
}

#[async_trait::async_trait]
impl CardStore for GraphCardStore {
    fn set_auth_token(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    async fn get_cards(&self) -> Result<Vec<Card>, CardError> {
        if let Err(e) = self.config.validate() {
            warn!("store configuration invalid, returning no cards: {e}");
            return Ok(Vec::new());
        }
        let token = self.preflight("get_cards")?;
        self.fetch_cards(&token).await
    }

    async fn get_card(&self, id: &str) -> Result<Card, CardError> {
        let token = self.preflight("get_card")?;
        self.fetch_card("get_card", &token, id).await
    }

    async fn create_card(&self, new: &NewCard) -> Result<Card, CardError> {
        const OP: &str = "create_card";
        let token = self.preflight(OP)?;
        let url = self.items_url(&token).await?;

        let fields = encode_new(new, chrono::Utc::now());
        let body = serde_json::json!({ "fields": fields.into_value() });
        let created = self
            .send_json(OP, &token, self.http.post(&url).json(&body))
            .await?;
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| CardError::decode(OP, "created item has no id"))?
            .to_string();
        info!("created card {id}");

        self.refetch_after_write(OP, &token, &id).await
    }

    async fn update_card(&self, id: &str, patch: &CardPatch) -> Result<Card, CardError> {
        const OP: &str = "update_card";
        let token = self.preflight(OP)?;

        // The derived pair is computed against the authoritative record,
        // never against whatever the caller last saw.
        let current = if patch.touches_financials() {
            Some(self.fetch_card(OP, &token, id).await?)
        } else {
            None
        };
        let fields = encode_patch(patch, current.as_ref());
        if fields.is_empty() {
            return self.fetch_card(OP, &token, id).await;
        }

        let url = format!("{}/{}/fields", self.items_url(&token).await?, id);
        let changed = fields.len();
        self.send(OP, &token, self.http.patch(&url).json(&fields.into_value()))
            .await
            .map_err(|e| card_not_found(e, id))?;
        debug!("updated card {id} ({changed} fields)");

        self.refetch_after_write(OP, &token, id).await
    }

    async fn delete_card(&self, id: &str) -> Result<(), CardError> {
        const OP: &str = "delete_card";
        let token = self.preflight(OP)?;
        let url = format!("{}/{}", self.items_url(&token).await?, id);
        self.send(OP, &token, self.http.delete(&url))
            .await
            .map_err(|e| card_not_found(e, id))?;
        info!("deleted card {id}");
        Ok(())
    }

    async fn upload_image(&self, upload: &ImageUpload, kind: ImageKind) -> Result<String, CardError> {
        const OP: &str = "upload_image";
        let token = self.preflight(OP)?;
        let site_id = self.site_id(&token).await?;
        let drive_id = self.drive_id(&token).await?;

        let name = upload_name(kind, &upload.file_name);
        let url = format!(
            "{}/sites/{}/drives/{}/root:/{}:/content",
            self.base(),
            site_id,
            drive_id,
            name
        );
        let request = self
            .http
            .put(&url)
            .header(CONTENT_TYPE, upload.content_type.as_str())
            .body(upload.bytes.clone());
        let item = self.send_json(OP, &token, request).await?;
        let web_url = item
            .get("webUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| CardError::decode(OP, "uploaded item has no webUrl"))?;
        info!("uploaded {} image as {name}", kind.as_str());
        Ok(web_url.to_string())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `<kind>-<unix millis>-<random>-<sanitized name>`.
fn upload_name(kind: ImageKind, file_name: &str) -> String {
    format!(
        "{}-{}-{}-{}",
        kind.as_str(),
        chrono::Utc::now().timestamp_millis(),
        short_id(),
        sanitize_file_name(file_name)
    )
}

/// Escape a literal for an OData string (`'` → `''`).
fn odata_quote(s: &str) -> String {
    s.replace('\'', "''")
}

/// Pull `error.message` out of a Graph error body, falling back to the raw
/// text.
fn graph_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

fn card_not_found(err: CardError, id: &str) -> CardError {
    match err {
        CardError::NotFound(_) => CardError::NotFound(format!("card {id} not found")),
        other => other,
    }
}
