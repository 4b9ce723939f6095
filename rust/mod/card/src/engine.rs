//! Card workflow engine.
//!
//! Owns the in-memory card collection and the `{cards, loading, error}`
//! view a UI renders. Every networked operation authenticates first: it
//! asks the [`TokenProvider`] for a token and hands it to the store.

use std::sync::{Arc, PoisonError, RwLock};

use printq_client::TokenProvider;
use printq_core::CardError;
use tracing::{debug, info, warn};

use crate::model::{Card, CardPatch, NewCard};
use crate::store::CardStore;

/// Point-in-time view of the engine for rendering.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub cards: Vec<Card>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct State {
    cards: Vec<Card>,
    in_flight: usize,
    error: Option<String>,
}

/// Orchestrates card operations against a [`CardStore`].
///
/// Callers must not run two mutations on the same card concurrently.
/// Operations on different cards may interleave; whichever finishes last
/// wins.
pub struct CardEngine {
    store: Arc<dyn CardStore>,
    auth: Arc<dyn TokenProvider>,
    state: RwLock<State>,
}

impl CardEngine {
    pub fn new(store: Arc<dyn CardStore>, auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            store,
            auth,
            state: RwLock::new(State::default()),
        }
    }

    // ── Reads (never networked) ─────────────────────────────────────

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Snapshot {
            cards: state.cards.clone(),
            loading: state.in_flight > 0,
            error: state.error.clone(),
        }
    }

    pub fn cards(&self) -> Vec<Card> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cards
            .clone()
    }

    /// Cached card by id.
    pub fn card(&self, id: &str) -> Option<Card> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cards
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Replace the whole collection with the store's.
    pub async fn refresh(&self) -> Result<Vec<Card>, CardError> {
        self.begin();
        let result = self.do_refresh().await;
        self.finish("refresh", result.as_ref().err());
        result
    }

    /// Validate, create, then refresh. Returns the stored card.
    pub async fn create_card(&self, new: &NewCard) -> Result<Card, CardError> {
        self.begin();
        let result = self.do_create(new).await;
        self.finish("create_card", result.as_ref().err());
        result
    }

    /// Apply `patch` to a cached card. On failure the cached copy is left
    /// as it was.
    pub async fn update_card(&self, id: &str, patch: &CardPatch) -> Result<Card, CardError> {
        self.begin();
        let result = self.do_update(id, patch).await;
        self.finish("update_card", result.as_ref().err());
        result
    }

    /// Move a card to its successor status. A finished card is returned
    /// unchanged without touching the store.
    pub async fn advance_status(&self, id: &str) -> Result<Card, CardError> {
        self.begin();
        let result = self.do_advance(id).await;
        self.finish("advance_status", result.as_ref().err());
        result
    }

    pub async fn delete_card(&self, id: &str) -> Result<(), CardError> {
        self.begin();
        let result = self.do_delete(id).await;
        self.finish("delete_card", result.as_ref().err());
        result
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn authenticate(&self) -> Result<(), CardError> {
        let token = self.auth.get_token().await?;
        self.store.set_auth_token(&token);
        Ok(())
    }

    async fn do_refresh(&self) -> Result<Vec<Card>, CardError> {
        self.authenticate().await?;
        let cards = self.store.get_cards().await?;
        debug!("refreshed {} cards", cards.len());
        self.write().cards = cards.clone();
        Ok(cards)
    }

    async fn do_create(&self, new: &NewCard) -> Result<Card, CardError> {
        let invalid = new.invalid_fields();
        if !invalid.is_empty() {
            return Err(CardError::validation(invalid));
        }
        self.authenticate().await?;
        let created = self.store.create_card(new).await?;
        info!("created card {}", created.id);

        match self.store.get_cards().await {
            Ok(cards) => {
                let card = cards
                    .iter()
                    .find(|c| c.id == created.id)
                    .cloned()
                    .unwrap_or_else(|| created.clone());
                let mut state = self.write();
                state.cards = cards;
                if !state.cards.iter().any(|c| c.id == card.id) {
                    state.cards.insert(0, card.clone());
                }
                Ok(card)
            }
            Err(source) => {
                warn!("card {} created but refresh failed: {source}", created.id);
                self.upsert(created.clone());
                Err(CardError::Unsynced {
                    op: "create_card".into(),
                    id: created.id,
                    source: Box::new(source),
                })
            }
        }
    }

    async fn do_update(&self, id: &str, patch: &CardPatch) -> Result<Card, CardError> {
        if self.card(id).is_none() {
            return Err(CardError::NotFound(format!("card {id} not found")));
        }
        let invalid = patch.invalid_fields();
        if !invalid.is_empty() {
            return Err(CardError::validation(invalid));
        }
        self.authenticate().await?;
        let updated = self.store.update_card(id, patch).await?;
        self.upsert(updated.clone());
        Ok(updated)
    }

    async fn do_advance(&self, id: &str) -> Result<Card, CardError> {
        let card = self
            .card(id)
            .ok_or_else(|| CardError::NotFound(format!("card {id} not found")))?;
        let Some(next) = card.status.next() else {
            debug!("card {id} is already {}", card.status);
            return Ok(card);
        };
        let updated = self.do_update(id, &CardPatch::status(next)).await?;
        info!("card {id}: {} -> {}", card.status, updated.status);
        Ok(updated)
    }

    async fn do_delete(&self, id: &str) -> Result<(), CardError> {
        self.authenticate().await?;
        let result = self.store.delete_card(id).await;
        // A 404 means the card is gone remotely too; drop the stale copy.
        if matches!(result, Ok(()) | Err(CardError::NotFound(_))) {
            self.write().cards.retain(|c| c.id != id);
        }
        result
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the cached card with the same id, or put it first.
    fn upsert(&self, card: Card) {
        let mut state = self.write();
        match state.cards.iter_mut().find(|c| c.id == card.id) {
            Some(slot) => *slot = card,
            None => state.cards.insert(0, card),
        }
    }

    fn begin(&self) {
        let mut state = self.write();
        state.in_flight += 1;
        state.error = None;
    }

    fn finish(&self, op: &str, error: Option<&CardError>) {
        let mut state = self.write();
        state.in_flight = state.in_flight.saturating_sub(1);
        if let Some(e) = error {
            warn!("{op} failed: {e}");
            state.error = Some(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::{Duration, TimeZone, Utc};
    use printq_client::StaticToken;

    use super::*;
    use crate::model::{CardStatus, ImageKind, ImageUpload};

    // ── In-memory store ─────────────────────────────────────────────

    #[derive(Default)]
    struct MemoryStore {
        cards: Mutex<Vec<Card>>,
        token: Mutex<Option<String>>,
        next_id: AtomicUsize,
        calls: AtomicUsize,
        fail_get_cards: Mutex<Option<CardError>>,
        fail_update: Mutex<Option<CardError>>,
    }

    impl MemoryStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn enter(&self) -> Result<(), CardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.token.lock().unwrap().as_deref() {
                Some("good-token") => Ok(()),
                _ => Err(CardError::NotConfigured("no auth token set".into())),
            }
        }

        fn apply(card: &mut Card, patch: &CardPatch) {
            if let Some(v) = &patch.title {
                card.title = v.clone();
            }
            if let Some(v) = patch.status {
                card.status = v;
            }
            if let Some(v) = patch.quantity {
                card.quantity = v;
            }
            if let Some(v) = patch.part_value {
                card.part_value = Some(v);
            }
            if let Some(v) = patch.printing_cost {
                card.printing_cost = Some(v);
            }
            card.recompute_profit();
        }
    }

    #[async_trait::async_trait]
    impl CardStore for MemoryStore {
        fn set_auth_token(&self, token: &str) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.token.lock().unwrap() = Some(token.to_string());
        }

        async fn get_cards(&self) -> Result<Vec<Card>, CardError> {
            self.enter()?;
            if let Some(e) = self.fail_get_cards.lock().unwrap().take() {
                return Err(e);
            }
            let mut cards = self.cards.lock().unwrap().clone();
            cards.sort_by(|a, b| b.request_date.cmp(&a.request_date));
            Ok(cards)
        }

        async fn get_card(&self, id: &str) -> Result<Card, CardError> {
            self.enter()?;
            self.cards
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| CardError::NotFound(format!("card {id} not found")))
        }

        async fn create_card(&self, new: &NewCard) -> Result<Card, CardError> {
            self.enter()?;
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(n as i64);
            let mut card = Card {
                id: n.to_string(),
                status: CardStatus::Requested,
                title: new.title.clone(),
                requester_name: new.requester_name.clone(),
                department: new.department.clone(),
                brand: new.brand.clone(),
                model: new.model.clone(),
                part_name: new.part_name.clone(),
                description: new.description.clone(),
                quantity: new.quantity,
                request_date: now,
                deadline: new.deadline,
                part_image_url: new.part_image_url.clone(),
                application_image_url: new.application_image_url.clone(),
                part_value: new.part_value,
                printing_cost: new.printing_cost,
                profit_loss: None,
                is_profitable: None,
                created_by: "Ana Souza".into(),
                created_at: now,
                modified_by: None,
                modified_at: None,
            };
            card.recompute_profit();
            self.cards.lock().unwrap().push(card.clone());
            Ok(card)
        }

        async fn update_card(&self, id: &str, patch: &CardPatch) -> Result<Card, CardError> {
            self.enter()?;
            if let Some(e) = self.fail_update.lock().unwrap().take() {
                return Err(e);
            }
            let mut cards = self.cards.lock().unwrap();
            let card = cards
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| CardError::NotFound(format!("card {id} not found")))?;
            Self::apply(card, patch);
            Ok(card.clone())
        }

        async fn delete_card(&self, id: &str) -> Result<(), CardError> {
            self.enter()?;
            let mut cards = self.cards.lock().unwrap();
            let before = cards.len();
            cards.retain(|c| c.id != id);
            if cards.len() == before {
                return Err(CardError::NotFound(format!("card {id} not found")));
            }
            Ok(())
        }

        async fn upload_image(&self, upload: &ImageUpload, kind: ImageKind) -> Result<String, CardError> {
            self.enter()?;
            Ok(format!("https://files/{}/{}", kind.as_str(), upload.file_name))
        }
    }

    fn engine() -> (CardEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let engine = CardEngine::new(store.clone(), Arc::new(StaticToken::new("good-token")));
        (engine, store)
    }

    fn bracket() -> NewCard {
        NewCard {
            title: "Sensor bracket".into(),
            requester_name: "Ana".into(),
            department: "Manutenção".into(),
            part_name: "Bracket".into(),
            quantity: 2,
            ..Default::default()
        }
    }

    // ── Create ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_then_lookup() {
        let (engine, _) = engine();
        let created = engine.create_card(&bracket()).await.unwrap();

        let cached = engine.card(&created.id).unwrap();
        assert_eq!(cached.title, "Sensor bracket");
        assert_eq!(cached.quantity, 2);
        assert_eq!(cached.status, CardStatus::Requested);
        assert_eq!(cached.created_by, "Ana Souza");
        assert!(!cached.id.is_empty());
        assert_eq!(engine.cards().len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_blank_title_without_store_calls() {
        let (engine, store) = engine();
        let new = NewCard {
            title: String::new(),
            ..bracket()
        };
        match engine.create_card(&new).await.unwrap_err() {
            CardError::Validation { fields } => assert_eq!(fields, vec!["title"]),
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(store.calls(), 0);
        assert!(engine.snapshot().error.unwrap().contains("title"));
    }

    #[tokio::test]
    async fn create_derives_profit() {
        let (engine, _) = engine();
        let new = NewCard {
            part_value: Some(100.0),
            printing_cost: Some(40.0),
            ..bracket()
        };
        let card = engine.create_card(&new).await.unwrap();
        assert_eq!(card.profit_loss, Some(60.0));
        assert_eq!(card.is_profitable, Some(true));

        let patch = CardPatch {
            printing_cost: Some(150.0),
            ..Default::default()
        };
        let card = engine.update_card(&card.id, &patch).await.unwrap();
        assert_eq!(card.part_value, Some(100.0));
        assert_eq!(card.profit_loss, Some(-50.0));
        assert_eq!(card.is_profitable, Some(false));
        assert_eq!(engine.card(&card.id).unwrap(), card);
    }

    #[tokio::test]
    async fn create_with_failed_refresh_is_unsynced() {
        let (engine, store) = engine();
        *store.fail_get_cards.lock().unwrap() = Some(CardError::network("get_cards", "reset"));

        match engine.create_card(&bracket()).await.unwrap_err() {
            CardError::Unsynced { op, id, source } => {
                assert_eq!(op, "create_card");
                assert!(matches!(*source, CardError::Network { .. }));
                // The stored card is still visible locally.
                assert_eq!(engine.card(&id).unwrap().title, "Sensor bracket");
            }
            other => panic!("expected Unsynced, got {other:?}"),
        }
        assert_eq!(store.cards.lock().unwrap().len(), 1);
    }

    // ── Advance ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn advance_walks_the_pipeline() {
        let (engine, _) = engine();
        let id = engine.create_card(&bracket()).await.unwrap().id;

        let mut seen = vec![engine.card(&id).unwrap().status];
        for _ in 0..4 {
            seen.push(engine.advance_status(&id).await.unwrap().status);
        }
        assert_eq!(seen, CardStatus::ALL.to_vec());
        assert_eq!(engine.card(&id).unwrap().status, CardStatus::Finished);
    }

    #[tokio::test]
    async fn advance_finished_makes_no_store_calls() {
        let (engine, store) = engine();
        let id = engine.create_card(&bracket()).await.unwrap().id;
        engine
            .update_card(&id, &CardPatch::status(CardStatus::Finished))
            .await
            .unwrap();
        let before = engine.card(&id).unwrap();
        let calls = store.calls();

        let after = engine.advance_status(&id).await.unwrap();
        assert_eq!(after, before);
        assert_eq!(store.calls(), calls);
    }

    #[tokio::test]
    async fn advance_unknown_card_is_not_found() {
        let (engine, store) = engine();
        let err = engine.advance_status("missing").await.unwrap_err();
        assert!(matches!(err, CardError::NotFound(_)), "got {err:?}");
        assert_eq!(store.calls(), 0);
    }

    // ── Update ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn update_requires_cached_card() {
        let (engine, store) = engine();
        let err = engine
            .update_card("42", &CardPatch::status(CardStatus::Approved))
            .await
            .unwrap_err();
        assert!(matches!(err, CardError::NotFound(_)), "got {err:?}");
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn unauthorized_update_leaves_cache_untouched() {
        let (engine, store) = engine();
        let id = engine.create_card(&bracket()).await.unwrap().id;
        let before = engine.card(&id).unwrap();

        *store.fail_update.lock().unwrap() = Some(CardError::from_status(
            "update_card",
            401,
            "token expired",
        ));
        let patch = CardPatch {
            title: Some("Renamed".into()),
            ..Default::default()
        };
        let err = engine.update_card(&id, &patch).await.unwrap_err();
        assert!(matches!(err, CardError::Unauthorized { .. }), "got {err:?}");
        assert!(err.needs_reauth());
        assert_eq!(engine.card(&id).unwrap(), before);

        let snap = engine.snapshot();
        assert!(!snap.loading);
        assert!(snap.error.unwrap().contains("unauthorized"));
    }

    #[tokio::test]
    async fn update_rejects_blank_required_field() {
        let (engine, _) = engine();
        let id = engine.create_card(&bracket()).await.unwrap().id;
        let patch = CardPatch {
            department: Some("  ".into()),
            ..Default::default()
        };
        let err = engine.update_card(&id, &patch).await.unwrap_err();
        assert!(matches!(err, CardError::Validation { .. }), "got {err:?}");
    }

    // ── Refresh / delete / state ────────────────────────────────────

    #[tokio::test]
    async fn refresh_replaces_collection_and_clears_error() {
        let (engine, store) = engine();
        engine.create_card(&bracket()).await.unwrap();
        engine
            .create_card(&NewCard {
                title: "Gear".into(),
                ..bracket()
            })
            .await
            .unwrap();
        store.cards.lock().unwrap().retain(|c| c.title == "Gear");

        let _ = engine.advance_status("missing").await;
        assert!(engine.snapshot().error.is_some());

        let cards = engine.refresh().await.unwrap();
        assert_eq!(cards.len(), 1);
        let snap = engine.snapshot();
        assert_eq!(snap.cards.len(), 1);
        assert!(snap.error.is_none());
        assert!(!snap.loading);
    }

    #[tokio::test]
    async fn refresh_orders_newest_first() {
        let (engine, _) = engine();
        engine.create_card(&bracket()).await.unwrap();
        let newest = engine
            .create_card(&NewCard {
                title: "Gear".into(),
                ..bracket()
            })
            .await
            .unwrap();
        assert_eq!(engine.refresh().await.unwrap()[0].id, newest.id);
    }

    #[tokio::test]
    async fn delete_removes_from_collection() {
        let (engine, _) = engine();
        let id = engine.create_card(&bracket()).await.unwrap().id;
        engine.delete_card(&id).await.unwrap();
        assert!(engine.card(&id).is_none());

        let err = engine.delete_card(&id).await.unwrap_err();
        assert!(matches!(err, CardError::NotFound(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn auth_failure_stops_before_store() {
        let store = Arc::new(MemoryStore::default());
        let engine = CardEngine::new(store.clone(), Arc::new(StaticToken::new("")));
        let err = engine.refresh().await.unwrap_err();
        assert!(matches!(err, CardError::Auth(_)), "got {err:?}");
        assert_eq!(store.calls(), 0);
    }
}
