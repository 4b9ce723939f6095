//! Board and report views over a card collection. Pure functions, no I/O.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Card, CardStatus};

/// One board column: the cards currently in `status`.
#[derive(Debug, Clone, Serialize)]
pub struct BoardColumn {
    pub status: CardStatus,
    pub label: &'static str,
    pub cards: Vec<Card>,
}

/// Group cards per status, one column per status in pipeline order (empty
/// columns included). Cards keep their input order inside a column.
pub fn board(cards: &[Card]) -> Vec<BoardColumn> {
    CardStatus::ALL
        .into_iter()
        .map(|status| BoardColumn {
            status,
            label: status.label(),
            cards: cards.iter().filter(|c| c.status == status).cloned().collect(),
        })
        .collect()
}

/// Card count per status, pipeline order, zeros included.
pub fn count_by_status(cards: &[Card]) -> Vec<(CardStatus, usize)> {
    CardStatus::ALL
        .into_iter()
        .map(|status| (status, cards.iter().filter(|c| c.status == status).count()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentCount {
    pub department: String,
    pub count: usize,
    /// Share of all cards, 0-100.
    pub percent: f64,
}

/// Card count per department, largest first (ties by name).
pub fn count_by_department(cards: &[Card]) -> Vec<DepartmentCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for card in cards {
        *counts.entry(card.department.trim()).or_default() += 1;
    }
    let total = cards.len();
    let mut rows: Vec<DepartmentCount> = counts
        .into_iter()
        .map(|(department, count)| DepartmentCount {
            department: department.to_string(),
            count,
            percent: count as f64 * 100.0 / total as f64,
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.department.cmp(&b.department)));
    rows
}

// ---------------------------------------------------------------------------
// Cost-benefit analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostRow {
    pub id: String,
    pub title: String,
    pub part_value: f64,
    pub printing_cost: f64,
    pub profit_loss: f64,
    pub is_profitable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    /// Sum of the gains of profitable cards.
    pub total_savings: f64,
    /// Sum of the absolute losses of the other cards.
    pub total_loss: f64,
    pub profitable: usize,
    pub unprofitable: usize,
    pub rows: Vec<CostRow>,
}

impl CostSummary {
    pub fn net(&self) -> f64 {
        self.total_savings - self.total_loss
    }
}

/// Savings and losses of finished cards that carry both amounts.
pub fn cost_analysis(cards: &[Card]) -> CostSummary {
    let mut summary = CostSummary::default();
    for card in cards.iter().filter(|c| c.status.is_terminal()) {
        let (Some(part_value), Some(printing_cost)) = (card.part_value, card.printing_cost) else {
            continue;
        };
        let profit_loss = part_value - printing_cost;
        let is_profitable = profit_loss > 0.0;
        if is_profitable {
            summary.total_savings += profit_loss;
            summary.profitable += 1;
        } else {
            summary.total_loss += profit_loss.abs();
            summary.unprofitable += 1;
        }
        summary.rows.push(CostRow {
            id: card.id.clone(),
            title: card.title.clone(),
            part_value,
            printing_cost,
            profit_loss,
            is_profitable,
        });
    }
    summary
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn card(id: &str, status: CardStatus, department: &str, amounts: Option<(f64, f64)>) -> Card {
        let at = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();
        let mut card = Card {
            id: id.into(),
            status,
            title: format!("Card {id}"),
            requester_name: "Ana".into(),
            department: department.into(),
            brand: String::new(),
            model: String::new(),
            part_name: "Part".into(),
            description: String::new(),
            quantity: 1,
            request_date: at,
            deadline: None,
            part_image_url: None,
            application_image_url: None,
            part_value: amounts.map(|(v, _)| v),
            printing_cost: amounts.map(|(_, c)| c),
            profit_loss: None,
            is_profitable: None,
            created_by: "Ana".into(),
            created_at: at,
            modified_by: None,
            modified_at: None,
        };
        card.recompute_profit();
        card
    }

    fn sample() -> Vec<Card> {
        vec![
            card("1", CardStatus::Finished, "Manutenção", Some((100.0, 40.0))),
            card("2", CardStatus::Finished, "Qualidade", Some((20.0, 35.0))),
            card("3", CardStatus::Finished, "Manutenção", None),
            card("4", CardStatus::InProduction, "Manutenção", Some((500.0, 10.0))),
            card("5", CardStatus::Requested, "Engenharia", None),
        ]
    }

    #[test]
    fn board_has_every_column_in_order() {
        let columns = board(&sample());
        let statuses: Vec<_> = columns.iter().map(|c| c.status).collect();
        assert_eq!(statuses, CardStatus::ALL.to_vec());
        let sizes: Vec<_> = columns.iter().map(|c| c.cards.len()).collect();
        assert_eq!(sizes, vec![1, 0, 0, 1, 3]);
        assert_eq!(columns[4].label, "Finalizado");
    }

    #[test]
    fn status_counts_include_zeros() {
        let counts = count_by_status(&sample());
        assert_eq!(counts[1], (CardStatus::Approved, 0));
        assert_eq!(counts[4], (CardStatus::Finished, 3));
    }

    #[test]
    fn department_counts_largest_first() {
        let rows = count_by_department(&sample());
        assert_eq!(rows[0].department, "Manutenção");
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[0].percent, 60.0);
        assert_eq!(rows[1].department, "Engenharia");
        assert_eq!(rows[2].department, "Qualidade");
        assert!(count_by_department(&[]).is_empty());
    }

    #[test]
    fn cost_analysis_covers_finished_cards_with_amounts() {
        let summary = cost_analysis(&sample());
        assert_eq!(summary.rows.len(), 2);
        assert_eq!(summary.total_savings, 60.0);
        assert_eq!(summary.total_loss, 15.0);
        assert_eq!(summary.profitable, 1);
        assert_eq!(summary.unprofitable, 1);
        assert_eq!(summary.net(), 45.0);
        assert!(!summary.rows[1].is_profitable);
    }
}
