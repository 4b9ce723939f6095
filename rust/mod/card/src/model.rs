use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fields::CardField;

// ---------------------------------------------------------------------------
// CardStatus
// ---------------------------------------------------------------------------

/// Position of a card in the production pipeline.
///
/// ```text
/// REQUESTED → APPROVED → QUEUED_FOR_PRODUCTION → IN_PRODUCTION → FINISHED
/// ```
///
/// The list stores the Portuguese labels (`Solicitado`, ...); see
/// [`CardStatus::label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    Requested,
    Approved,
    QueuedForProduction,
    InProduction,
    Finished,
}

impl CardStatus {
    /// Every status, in pipeline order.
    pub const ALL: [CardStatus; 5] = [
        Self::Requested,
        Self::Approved,
        Self::QueuedForProduction,
        Self::InProduction,
        Self::Finished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Approved => "APPROVED",
            Self::QueuedForProduction => "QUEUED_FOR_PRODUCTION",
            Self::InProduction => "IN_PRODUCTION",
            Self::Finished => "FINISHED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "REQUESTED" => Some(Self::Requested),
            "APPROVED" => Some(Self::Approved),
            "QUEUED_FOR_PRODUCTION" => Some(Self::QueuedForProduction),
            "IN_PRODUCTION" => Some(Self::InProduction),
            "FINISHED" => Some(Self::Finished),
            _ => None,
        }
    }

    /// Label stored in the remote list's `Status` column.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Requested => "Solicitado",
            Self::Approved => "Aprovado",
            Self::QueuedForProduction => "Fila de Produção",
            Self::InProduction => "Em Produção",
            Self::Finished => "Finalizado",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.label() == s)
    }

    /// Fixed successor. `None` at `Finished`.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Requested => Some(Self::Approved),
            Self::Approved => Some(Self::QueuedForProduction),
            Self::QueuedForProduction => Some(Self::InProduction),
            Self::InProduction => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

impl std::fmt::Display for CardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Derived financials
// ---------------------------------------------------------------------------

/// `(profit_loss, is_profitable)` for a pair of inputs, defined only when
/// both are present.
pub fn derive_profit(part_value: Option<f64>, printing_cost: Option<f64>) -> Option<(f64, bool)> {
    let profit_loss = part_value? - printing_cost?;
    Some((profit_loss, profit_loss > 0.0))
}

// ---------------------------------------------------------------------------
// Card: the core data model
// ---------------------------------------------------------------------------

/// A single 3D print request.
///
/// `profit_loss` and `is_profitable` are derived from `part_value` and
/// `printing_cost`; use [`Card::recompute_profit`] after touching either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub status: CardStatus,

    // --- request ---
    pub title: String,
    pub requester_name: String,
    pub department: String,
    pub brand: String,
    pub model: String,
    pub part_name: String,
    pub description: String,
    pub quantity: u32,
    pub request_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,

    // --- images ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_image_url: Option<String>,

    // --- financials ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printing_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_profitable: Option<bool>,

    // --- audit ---
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Card {
    pub fn recompute_profit(&mut self) {
        let derived = derive_profit(self.part_value, self.printing_cost);
        self.profit_loss = derived.map(|(pl, _)| pl);
        self.is_profitable = derived.map(|(_, p)| p);
    }
}

// ---------------------------------------------------------------------------
// Write payloads
// ---------------------------------------------------------------------------

/// Caller-supplied fields for a new card. Status, request date and audit
/// fields are assigned on creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub title: String,
    pub requester_name: String,
    pub department: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    pub part_name: String,
    #[serde(default)]
    pub description: String,
    pub quantity: u32,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub part_image_url: Option<String>,
    #[serde(default)]
    pub application_image_url: Option<String>,
    #[serde(default)]
    pub part_value: Option<f64>,
    #[serde(default)]
    pub printing_cost: Option<f64>,
}

impl NewCard {
    /// Names of required fields that are blank, in declaration order.
    pub fn invalid_fields(&self) -> Vec<&'static str> {
        let blank = [
            (CardField::Title, &self.title),
            (CardField::RequesterName, &self.requester_name),
            (CardField::Department, &self.department),
            (CardField::PartName, &self.part_name),
        ];
        let mut invalid: Vec<_> = blank
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field.domain())
            .collect();
        if self.quantity == 0 {
            invalid.push(CardField::Quantity.domain());
        }
        invalid
    }
}

/// Partial update. `None` leaves a field untouched.
///
/// `status` here is a direct set (edit-mode correction) and is not bound to
/// the pipeline order; use the engine's `advance_status` for normal moves.
/// The derived financial fields are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CardStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printing_cost: Option<f64>,
}

impl CardPatch {
    pub fn status(status: CardStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Whether either input of the derived pair changes.
    pub fn touches_financials(&self) -> bool {
        self.part_value.is_some() || self.printing_cost.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Names of fields that would break an invariant if written.
    pub fn invalid_fields(&self) -> Vec<&'static str> {
        let required = [
            (CardField::Title, &self.title),
            (CardField::RequesterName, &self.requester_name),
            (CardField::Department, &self.department),
            (CardField::PartName, &self.part_name),
        ];
        let mut invalid: Vec<_> = required
            .into_iter()
            .filter(|(_, value)| value.as_deref().is_some_and(|s| s.trim().is_empty()))
            .map(|(field, _)| field.domain())
            .collect();
        if self.quantity == Some(0) {
            invalid.push(CardField::Quantity.domain());
        }
        invalid
    }
}

/// Which image slot an upload is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Part,
    Application,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Part => "part",
            Self::Application => "application",
        }
    }
}

/// Image bytes with the file's declared name and MIME type.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_roundtrip() {
        for s in CardStatus::ALL {
            assert_eq!(CardStatus::from_label(s.label()), Some(s));
            assert_eq!(CardStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(CardStatus::from_label("Cancelado"), None);
    }

    #[test]
    fn status_successors_follow_pipeline() {
        assert_eq!(CardStatus::Requested.next(), Some(CardStatus::Approved));
        assert_eq!(CardStatus::Approved.next(), Some(CardStatus::QueuedForProduction));
        assert_eq!(CardStatus::QueuedForProduction.next(), Some(CardStatus::InProduction));
        assert_eq!(CardStatus::InProduction.next(), Some(CardStatus::Finished));
        assert_eq!(CardStatus::Finished.next(), None);
        assert!(CardStatus::Finished.is_terminal());
        assert!(!CardStatus::InProduction.is_terminal());
    }

    #[test]
    fn status_order_matches_pipeline() {
        let mut sorted = CardStatus::ALL;
        sorted.sort();
        assert_eq!(sorted, CardStatus::ALL);
    }

    #[test]
    fn derive_profit_needs_both_inputs() {
        assert_eq!(derive_profit(Some(100.0), Some(40.0)), Some((60.0, true)));
        assert_eq!(derive_profit(Some(100.0), Some(150.0)), Some((-50.0, false)));
        assert_eq!(derive_profit(Some(10.0), Some(10.0)), Some((0.0, false)));
        assert_eq!(derive_profit(None, Some(40.0)), None);
        assert_eq!(derive_profit(Some(100.0), None), None);
    }

    #[test]
    fn new_card_validation_lists_every_blank_field() {
        let new = NewCard {
            title: " ".into(),
            requester_name: "Ana".into(),
            department: String::new(),
            part_name: "Bracket".into(),
            quantity: 0,
            ..Default::default()
        };
        assert_eq!(new.invalid_fields(), vec!["title", "department", "quantity"]);
    }

    #[test]
    fn patch_validation_ignores_untouched_fields() {
        assert!(CardPatch::default().invalid_fields().is_empty());
        let patch = CardPatch {
            title: Some(String::new()),
            quantity: Some(0),
            ..Default::default()
        };
        assert_eq!(patch.invalid_fields(), vec!["title", "quantity"]);
    }

    #[test]
    fn patch_financial_detection() {
        assert!(!CardPatch::status(CardStatus::Approved).touches_financials());
        let patch = CardPatch {
            printing_cost: Some(150.0),
            ..Default::default()
        };
        assert!(patch.touches_financials());
        assert!(CardPatch::default().is_empty());
    }

    #[test]
    fn patch_json_is_sparse() {
        let json = serde_json::to_value(CardPatch::status(CardStatus::Finished)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "FINISHED"}));
    }
}
