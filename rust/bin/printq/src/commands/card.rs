//! Card commands: list, board, get, create, update, advance, delete, upload,
//! check.

use std::path::Path;

use anyhow::{Context as _, Result};
use printq_card::report::board as group_by_status;
use printq_card::{Card, CardPatch, CardStatus, CardStore, ImageKind, ImageUpload, NewCard};
use printq_client::TokenProvider;

use super::{confirm, print_json, truncate, with_session};

/// Which image slot an upload fills.
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum KindArg {
    Part,
    Application,
}

impl From<KindArg> for ImageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Part => ImageKind::Part,
            KindArg::Application => ImageKind::Application,
        }
    }
}

fn money(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn print_table(cards: &[Card]) {
    if cards.is_empty() {
        println!("No cards.");
        return;
    }
    println!(
        "{:8} {:22} {:32} {:18} {:16} {:>4} {:10}",
        "ID", "STATUS", "TITLE", "REQUESTER", "DEPARTMENT", "QTY", "REQUESTED"
    );
    for c in cards {
        println!(
            "{:8} {:22} {:32} {:18} {:16} {:>4} {:10}",
            c.id,
            c.status.label(),
            truncate(&c.title, 32),
            truncate(&c.requester_name, 18),
            truncate(&c.department, 16),
            c.quantity,
            c.request_date.format("%Y-%m-%d"),
        );
    }
}

fn print_card(c: &Card) {
    println!("{} #{}", c.title, c.id);
    println!("  status:       {}", c.status.label());
    println!("  requester:    {} ({})", c.requester_name, c.department);
    println!("  part:         {} x{}", c.part_name, c.quantity);
    if !c.brand.is_empty() || !c.model.is_empty() {
        println!("  brand/model:  {} {}", c.brand, c.model);
    }
    if !c.description.is_empty() {
        println!("  description:  {}", c.description);
    }
    println!("  requested:    {}", c.request_date.format("%Y-%m-%d %H:%M"));
    if let Some(deadline) = c.deadline {
        println!("  deadline:     {}", deadline.format("%Y-%m-%d"));
    }
    if let Some(url) = &c.part_image_url {
        println!("  part image:   {url}");
    }
    if let Some(url) = &c.application_image_url {
        println!("  usage image:  {url}");
    }
    println!(
        "  value/cost:   {} / {}",
        money(c.part_value),
        money(c.printing_cost)
    );
    if let (Some(pl), Some(profitable)) = (c.profit_loss, c.is_profitable) {
        let verdict = if profitable { "savings" } else { "loss" };
        println!("  result:       {pl:.2} ({verdict})");
    }
    println!(
        "  created:      {} by {}",
        c.created_at.format("%Y-%m-%d %H:%M"),
        c.created_by
    );
    if let (Some(at), Some(by)) = (c.modified_at, &c.modified_by) {
        println!("  modified:     {} by {}", at.format("%Y-%m-%d %H:%M"), by);
    }
}

/// Status from its code (`IN_PRODUCTION`, any case) or its list label.
fn parse_status(s: &str) -> Result<CardStatus> {
    let s = s.trim();
    CardStatus::from_str(&s.to_ascii_uppercase())
        .or_else(|| CardStatus::from_label(s))
        .ok_or_else(|| {
            let known: Vec<_> = CardStatus::ALL.iter().map(CardStatus::as_str).collect();
            anyhow::anyhow!("Unknown status \"{s}\". Known: {}", known.join(", "))
        })
}

fn read_body(json: Option<String>, file: Option<String>) -> Result<String> {
    match (json, file) {
        (_, Some(path)) => std::fs::read_to_string(&path).with_context(|| format!("reading {path}")),
        (Some(json), None) => Ok(json),
        (None, None) => anyhow::bail!("Provide --json or -f <file>."),
    }
}

/// MIME type from the file extension.
fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

// ── Commands ────────────────────────────────────────────────────────

pub async fn list(config_path: &Path, status: Option<String>, json: bool) -> Result<()> {
    let status = status.as_deref().map(parse_status).transpose()?;
    with_session(config_path, |session| async move {
        let mut cards = session.engine().refresh().await?;
        if let Some(status) = status {
            cards.retain(|c| c.status == status);
        }
        if json {
            return print_json(&cards);
        }
        print_table(&cards);
        Ok(())
    })
    .await
}

pub async fn board(config_path: &Path, json: bool) -> Result<()> {
    with_session(config_path, |session| async move {
        let cards = session.engine().refresh().await?;
        let columns = group_by_status(&cards);
        if json {
            return print_json(&columns);
        }
        for column in columns {
            println!("── {} ({})", column.label, column.cards.len());
            for c in &column.cards {
                println!(
                    "   #{:6} {} · {} · {}",
                    c.id,
                    truncate(&c.title, 40),
                    c.requester_name,
                    c.department
                );
            }
        }
        Ok(())
    })
    .await
}

pub async fn get(config_path: &Path, id: &str, json: bool) -> Result<()> {
    with_session(config_path, |session| async move {
        let engine = session.engine();
        engine.refresh().await?;
        let card = engine
            .card(id)
            .ok_or_else(|| anyhow::anyhow!("Card {id} not found."))?;
        if json {
            return print_json(&card);
        }
        print_card(&card);
        Ok(())
    })
    .await
}

pub async fn create(
    config_path: &Path,
    json_body: Option<String>,
    file: Option<String>,
    json: bool,
) -> Result<()> {
    let body = read_body(json_body, file)?;
    let new: NewCard = serde_json::from_str(&body).context("invalid card JSON")?;
    with_session(config_path, |session| async move {
        let card = session.engine().create_card(&new).await?;
        if json {
            return print_json(&card);
        }
        println!("Card #{} created.", card.id);
        Ok(())
    })
    .await
}

pub async fn update(config_path: &Path, id: &str, json_body: &str, json: bool) -> Result<()> {
    let patch: CardPatch = serde_json::from_str(json_body).context("invalid patch JSON")?;
    if patch.is_empty() {
        anyhow::bail!("Nothing to update.");
    }
    with_session(config_path, |session| async move {
        let engine = session.engine();
        engine.refresh().await?;
        let card = engine.update_card(id, &patch).await?;
        if json {
            return print_json(&card);
        }
        println!("Card #{} updated.", card.id);
        Ok(())
    })
    .await
}

pub async fn advance(config_path: &Path, id: &str, json: bool) -> Result<()> {
    with_session(config_path, |session| async move {
        let engine = session.engine();
        engine.refresh().await?;
        let before = engine
            .card(id)
            .map(|c| c.status)
            .ok_or_else(|| anyhow::anyhow!("Card {id} not found."))?;
        let card = engine.advance_status(id).await?;
        if json {
            return print_json(&card);
        }
        if card.status == before {
            println!("Card #{} is already {}.", card.id, card.status.label());
        } else {
            println!(
                "Card #{}: {} -> {}",
                card.id,
                before.label(),
                card.status.label()
            );
        }
        Ok(())
    })
    .await
}

pub async fn delete(config_path: &Path, id: &str, yes: bool) -> Result<()> {
    if !yes && !confirm(&format!("Delete card {id}?"))? {
        println!("Cancelled.");
        return Ok(());
    }
    with_session(config_path, |session| async move {
        session.engine().delete_card(id).await?;
        println!("Card #{id} deleted.");
        Ok(())
    })
    .await
}

/// Upload an image; with `card` set, also point that card's image field at
/// the uploaded file.
pub async fn upload(
    config_path: &Path,
    file: &Path,
    kind: KindArg,
    card: Option<String>,
) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let upload = ImageUpload {
        file_name: file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string()),
        content_type: content_type(file).to_string(),
        bytes,
    };
    let kind = ImageKind::from(kind);

    with_session(config_path, |session| async move {
        let token = session.token.get_token().await?;
        session.store.set_auth_token(&token);
        let url = session.store.upload_image(&upload, kind).await?;
        println!("{url}");

        if let Some(id) = card {
            let patch = match kind {
                ImageKind::Part => CardPatch {
                    part_image_url: Some(url),
                    ..Default::default()
                },
                ImageKind::Application => CardPatch {
                    application_image_url: Some(url),
                    ..Default::default()
                },
            };
            let engine = session.engine();
            engine.refresh().await?;
            engine.update_card(&id, &patch).await?;
            eprintln!("Card #{id} updated.");
        }
        Ok(())
    })
    .await
}

/// Resolve the site resources and count the cards.
pub async fn check(config_path: &Path) -> Result<()> {
    with_session(config_path, |session| async move {
        let token = session.token.get_token().await?;
        session.store.set_auth_token(&token);
        let report = session.store.check_connection().await?;
        let config = session.store.config();
        println!("site:          {}", report.site_id);
        println!("list:          {} ({})", config.list_name, report.list_id);
        match &report.drive_id {
            Some(id) => println!("image library: {} ({id})", config.images_library),
            None => println!("image library: {} (missing)", config.images_library),
        }
        println!("cards:         {}", report.card_count);
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type(Path::new("a/b/foto.PNG")), "image/png");
        assert_eq!(content_type(Path::new("peca.jpeg")), "image/jpeg");
        assert_eq!(content_type(Path::new("notes")), "application/octet-stream");
    }

    #[test]
    fn status_filter_accepts_code_or_label() {
        assert_eq!(parse_status("approved").unwrap(), CardStatus::Approved);
        assert_eq!(parse_status("IN_PRODUCTION").unwrap(), CardStatus::InProduction);
        assert_eq!(parse_status("Fila de Produção").unwrap(), CardStatus::QueuedForProduction);
        let err = parse_status("Cancelado").unwrap_err().to_string();
        assert!(err.contains("REQUESTED"), "got: {err}");
    }

    #[test]
    fn body_from_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.json");
        std::fs::write(&path, r#"{"title":"x"}"#).unwrap();
        let body = read_body(
            Some("ignored".into()),
            Some(path.to_string_lossy().into_owned()),
        )
        .unwrap();
        assert_eq!(body, r#"{"title":"x"}"#);
        assert!(read_body(None, None).is_err());
    }

    #[test]
    fn new_card_json_uses_camel_case() {
        let new: NewCard = serde_json::from_str(
            r#"{"title":"Suporte","requesterName":"Ana","department":"Manutenção",
                "partName":"Suporte","quantity":3,"partValue":12.5}"#,
        )
        .unwrap();
        assert_eq!(new.quantity, 3);
        assert_eq!(new.part_value, Some(12.5));
        assert!(new.invalid_fields().is_empty());
    }
}
