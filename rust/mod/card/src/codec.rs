//! Translation between [`Card`] and the list item JSON.
//!
//! Reading goes through [`parse_remote_item`] only, so every defaulting rule
//! for a missing or malformed column lives here. Writing goes through
//! [`encode_new`] and [`encode_patch`], which also own the derived
//! profit/loss pair.

use chrono::{DateTime, SecondsFormat, Utc};
use printq_core::{parse_rfc3339, CardError};
use serde_json::{Map, Value};

use crate::fields::{CardField, LEGACY_TITLE};
use crate::model::{derive_profit, Card, CardPatch, CardStatus, NewCard};

const OP: &str = "parse_remote_item";

// ---------------------------------------------------------------------------
// Native field payload
// ---------------------------------------------------------------------------

/// A `fields` object keyed by native column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeFields(Map<String, Value>);

impl NativeFields {
    pub fn set(&mut self, field: CardField, value: impl Into<Value>) {
        self.0.insert(field.native().to_string(), value.into());
    }

    /// Write an explicit `null`, clearing the column.
    pub fn clear(&mut self, field: CardField) {
        self.0.insert(field.native().to_string(), Value::Null);
    }

    pub fn get(&self, field: CardField) -> Option<&Value> {
        self.0.get(field.native())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Write both derived columns from a merged input pair, or clear both when
/// the pair is incomplete.
fn write_profit(fields: &mut NativeFields, part_value: Option<f64>, printing_cost: Option<f64>) {
    match derive_profit(part_value, printing_cost) {
        Some((profit_loss, is_profitable)) => {
            fields.set(CardField::ProfitLoss, profit_loss);
            fields.set(CardField::IsProfitable, is_profitable);
        }
        None => {
            fields.clear(CardField::ProfitLoss);
            fields.clear(CardField::IsProfitable);
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Fields for the initial write of a new card.
///
/// Only present values are sent; the list's column defaults cover the rest.
/// The derived pair is written when both amounts are present.
pub fn encode_new(new: &NewCard, request_date: DateTime<Utc>) -> NativeFields {
    let mut fields = NativeFields::default();
    fields.set(CardField::Title, new.title.as_str());
    fields.set(CardField::Status, CardStatus::Requested.label());
    fields.set(CardField::RequestDate, timestamp(&request_date));
    fields.set(CardField::RequesterName, new.requester_name.as_str());
    fields.set(CardField::Department, new.department.as_str());
    fields.set(CardField::PartName, new.part_name.as_str());
    fields.set(CardField::Quantity, new.quantity);

    let optional_text = [
        (CardField::Brand, &new.brand),
        (CardField::Model, &new.model),
        (CardField::Description, &new.description),
    ];
    for (field, value) in optional_text {
        if !value.is_empty() {
            fields.set(field, value.as_str());
        }
    }
    if let Some(deadline) = &new.deadline {
        fields.set(CardField::Deadline, timestamp(deadline));
    }
    if let Some(url) = &new.part_image_url {
        fields.set(CardField::PartImageUrl, url.as_str());
    }
    if let Some(url) = &new.application_image_url {
        fields.set(CardField::ApplicationImageUrl, url.as_str());
    }
    if let Some(value) = new.part_value {
        fields.set(CardField::PartValue, value);
    }
    if let Some(cost) = new.printing_cost {
        fields.set(CardField::PrintingCost, cost);
    }
    if let Some((profit_loss, is_profitable)) = derive_profit(new.part_value, new.printing_cost) {
        fields.set(CardField::ProfitLoss, profit_loss);
        fields.set(CardField::IsProfitable, is_profitable);
    }
    fields
}

/// Fields for a partial update: only the columns the patch changes.
///
/// When the patch touches either amount, `current` must be the freshly read
/// record; the amount the patch leaves alone is taken from it and both
/// derived columns are written in the same payload.
pub fn encode_patch(patch: &CardPatch, current: Option<&Card>) -> NativeFields {
    let mut fields = NativeFields::default();

    let text = [
        (CardField::Title, &patch.title),
        (CardField::RequesterName, &patch.requester_name),
        (CardField::Department, &patch.department),
        (CardField::Brand, &patch.brand),
        (CardField::Model, &patch.model),
        (CardField::PartName, &patch.part_name),
        (CardField::Description, &patch.description),
        (CardField::PartImageUrl, &patch.part_image_url),
        (CardField::ApplicationImageUrl, &patch.application_image_url),
    ];
    for (field, value) in text {
        if let Some(value) = value {
            fields.set(field, value.as_str());
        }
    }
    if let Some(status) = patch.status {
        fields.set(CardField::Status, status.label());
    }
    if let Some(quantity) = patch.quantity {
        fields.set(CardField::Quantity, quantity);
    }
    if let Some(deadline) = &patch.deadline {
        fields.set(CardField::Deadline, timestamp(deadline));
    }
    if let Some(value) = patch.part_value {
        fields.set(CardField::PartValue, value);
    }
    if let Some(cost) = patch.printing_cost {
        fields.set(CardField::PrintingCost, cost);
    }

    if patch.touches_financials() {
        let part_value = patch.part_value.or(current.and_then(|c| c.part_value));
        let printing_cost = patch.printing_cost.or(current.and_then(|c| c.printing_cost));
        write_profit(&mut fields, part_value, printing_cost);
    }
    fields
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn as_url(value: &Value) -> Option<String> {
    let url = match value {
        Value::String(s) => s.as_str(),
        // Hyperlink columns come back as {"Url": ..., "Description": ...}.
        Value::Object(obj) => obj.get("Url").and_then(Value::as_str)?,
        _ => return None,
    };
    let url = url.trim();
    (!url.is_empty()).then(|| url.to_string())
}

fn as_quantity(value: Option<&Value>) -> u32 {
    match value.and_then(as_number).map(f64::round) {
        Some(n) if n >= 1.0 => n.min(u32::MAX as f64) as u32,
        _ => 1,
    }
}

/// Build a [`Card`] from a list item (`$expand=fields`).
///
/// Defaults: missing text → empty; missing status → `Requested`; quantity
/// missing or below one → 1; missing request date → `createdDateTime`;
/// stored derived columns are ignored and recomputed from the amounts.
/// An item without `id` or `createdDateTime`, or with an unknown status
/// label, is rejected with `Decode`. Listing callers propagate that error,
/// so one such row fails the whole fetch instead of vanishing from the
/// board or being shown in a guessed column; the message names the item.
pub fn parse_remote_item(raw: &Value) -> Result<Card, CardError> {
    let id = match raw.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(CardError::decode(OP, "item has no id")),
    };

    let empty = Map::new();
    let fields = raw.get("fields").and_then(Value::as_object).unwrap_or(&empty);
    let get = |field: CardField| fields.get(field.native()).filter(|v| !v.is_null());
    let text = |field: CardField| {
        get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let time = |field: CardField| get(field).and_then(Value::as_str).and_then(parse_rfc3339);

    let created_at = raw
        .get("createdDateTime")
        .and_then(Value::as_str)
        .and_then(parse_rfc3339)
        .ok_or_else(|| CardError::decode(OP, format!("item {id} has no createdDateTime")))?;

    let status = match get(CardField::Status).and_then(Value::as_str) {
        None | Some("") => CardStatus::Requested,
        Some(label) => CardStatus::from_label(label).ok_or_else(|| {
            CardError::decode(OP, format!("item {id} has unknown status {label:?}"))
        })?,
    };

    let title = match get(CardField::Title).and_then(Value::as_str) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => fields
            .get(LEGACY_TITLE)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };

    let mut card = Card {
        id,
        status,
        title,
        requester_name: text(CardField::RequesterName),
        department: text(CardField::Department),
        brand: text(CardField::Brand),
        model: text(CardField::Model),
        part_name: text(CardField::PartName),
        description: text(CardField::Description),
        quantity: as_quantity(get(CardField::Quantity)),
        request_date: time(CardField::RequestDate).unwrap_or(created_at),
        deadline: time(CardField::Deadline),
        part_image_url: get(CardField::PartImageUrl).and_then(as_url),
        application_image_url: get(CardField::ApplicationImageUrl).and_then(as_url),
        part_value: get(CardField::PartValue).and_then(as_number),
        printing_cost: get(CardField::PrintingCost).and_then(as_number),
        profit_loss: None,
        is_profitable: None,
        created_by: raw
            .pointer("/createdBy/user/displayName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        created_at,
        modified_by: raw
            .pointer("/lastModifiedBy/user/displayName")
            .and_then(Value::as_str)
            .map(String::from),
        modified_at: raw
            .get("lastModifiedDateTime")
            .and_then(Value::as_str)
            .and_then(parse_rfc3339),
    };
    card.recompute_profit();
    Ok(card)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
