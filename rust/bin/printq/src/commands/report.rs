//! `printq report`: status and department breakdowns plus the cost-benefit
//! analysis of finished cards.

use std::path::Path;

use anyhow::Result;
use printq_card::report::{cost_analysis, count_by_department, count_by_status};
use printq_card::Card;
use serde_json::json;

use super::{print_json, truncate, with_session};

pub async fn report(config_path: &Path, json: bool) -> Result<()> {
    with_session(config_path, |session| async move {
        let cards = session.engine().refresh().await?;
        if json {
            return print_json(&report_json(&cards));
        }
        print_report(&cards);
        Ok(())
    })
    .await
}

fn report_json(cards: &[Card]) -> serde_json::Value {
    let by_status: serde_json::Map<String, serde_json::Value> = count_by_status(cards)
        .into_iter()
        .map(|(status, count)| (status.as_str().to_string(), json!(count)))
        .collect();
    json!({
        "total": cards.len(),
        "byStatus": by_status,
        "byDepartment": count_by_department(cards),
        "costs": cost_analysis(cards),
    })
}

fn print_report(cards: &[Card]) {
    println!("Total requests: {}", cards.len());
    if cards.is_empty() {
        return;
    }

    println!();
    println!("{:24} {:>6}", "STATUS", "COUNT");
    for (status, count) in count_by_status(cards) {
        println!("{:24} {:>6}", status.label(), count);
    }

    println!();
    println!("{:24} {:>6} {:>7}", "DEPARTMENT", "COUNT", "SHARE");
    for row in count_by_department(cards) {
        let name = if row.department.is_empty() {
            "-"
        } else {
            row.department.as_str()
        };
        println!("{:24} {:>6} {:>6.1}%", truncate(name, 24), row.count, row.percent);
    }

    let costs = cost_analysis(cards);
    println!();
    if costs.rows.is_empty() {
        println!("No finished cards with value and cost.");
        return;
    }
    println!("Savings: {:.2} ({} cards)", costs.total_savings, costs.profitable);
    println!("Losses:  {:.2} ({} cards)", costs.total_loss, costs.unprofitable);
    println!("Net:     {:.2}", costs.net());
    println!();
    println!(
        "{:8} {:32} {:>10} {:>10} {:>10}",
        "ID", "TITLE", "VALUE", "COST", "RESULT"
    );
    for row in &costs.rows {
        println!(
            "{:8} {:32} {:>10.2} {:>10.2} {:>10.2}",
            row.id,
            truncate(&row.title, 32),
            row.part_value,
            row.printing_cost,
            row.profit_loss
        );
    }
}
