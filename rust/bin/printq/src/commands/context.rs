//! Context management commands.

use std::path::Path;

use anyhow::Result;

use crate::config::{ClientConfig, Context};

/// Store and identity settings shared by `context create` and `context set`.
/// An empty value clears an optional setting.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ContextSettings {
    /// Graph site id (takes precedence over --site-url).
    #[arg(long)]
    pub site_id: Option<String>,
    /// Server-relative site URL, e.g. /sites/Fabrica.
    #[arg(long)]
    pub site_url: Option<String>,
    /// Display name of the card list.
    #[arg(long)]
    pub list: Option<String>,
    /// Name of the image document library.
    #[arg(long)]
    pub images_library: Option<String>,
    /// Graph API root.
    #[arg(long)]
    pub graph_url: Option<String>,
    /// Application (client) id used for sign-in.
    #[arg(long)]
    pub client_id: Option<String>,
    /// Directory (tenant) id.
    #[arg(long)]
    pub tenant: Option<String>,
    /// Identity platform authority URL.
    #[arg(long)]
    pub authority: Option<String>,
}

fn optional(val: &str) -> Option<String> {
    let val = val.trim();
    (!val.is_empty()).then(|| val.to_string())
}

impl ContextSettings {
    pub fn apply(&self, ctx: &mut Context) {
        if let Some(v) = &self.site_id {
            ctx.store.site_id = optional(v);
        }
        if let Some(v) = &self.site_url {
            ctx.store.site_url = optional(v);
        }
        if let Some(v) = &self.list {
            ctx.store.list_name = v.clone();
        }
        if let Some(v) = &self.images_library {
            ctx.store.images_library = v.clone();
        }
        if let Some(v) = &self.graph_url {
            ctx.store.graph_url = v.clone();
        }
        if let Some(v) = &self.client_id {
            ctx.auth.client_id = v.clone();
        }
        if let Some(v) = &self.tenant {
            ctx.auth.tenant = v.clone();
        }
        if let Some(v) = &self.authority {
            ctx.auth.authority = v.clone();
        }
    }
}

/// Create a context. The first context becomes current.
pub fn create(name: &str, settings: &ContextSettings, client_config_path: &Path) -> Result<()> {
    let mut config = ClientConfig::load(client_config_path)?;
    if config.contexts.iter().any(|c| c.name == name) {
        anyhow::bail!("Context \"{}\" already exists. Use `printq context set`.", name);
    }

    let mut ctx = Context::new(name);
    settings.apply(&mut ctx);
    if let Err(e) = ctx.store.validate() {
        eprintln!("warning: {e}");
    }
    config.upsert_context(ctx);
    if config.current_context.is_empty() {
        config.current_context = name.to_string();
    }
    config.save(client_config_path)?;

    println!("Context \"{}\" created.", name);
    Ok(())
}

/// List all contexts.
pub fn list(client_config_path: &Path) -> Result<()> {
    let config = ClientConfig::load(client_config_path)?;

    if config.contexts.is_empty() {
        println!("No contexts configured.");
        println!("Run: printq context create <name> --site-url <path>");
        return Ok(());
    }

    println!("{:2} {:16} {:36} {:28} {:24}", "", "NAME", "SITE", "LIST", "ACCOUNT");
    for ctx in &config.contexts {
        let marker = if ctx.name == config.current_context {
            "*"
        } else {
            " "
        };
        let site = ctx
            .store
            .site_id
            .as_deref()
            .or(ctx.store.site_url.as_deref())
            .unwrap_or("-");
        let account = ctx.account.as_ref().map_or("-", |a| a.username.as_str());
        println!(
            "{:2} {:16} {:36} {:28} {:24}",
            marker, ctx.name, site, ctx.store.list_name, account
        );
    }

    Ok(())
}

/// Switch current context.
pub fn use_context(name: &str, client_config_path: &Path) -> Result<()> {
    let mut config = ClientConfig::load(client_config_path)?;

    if !config.contexts.iter().any(|c| c.name == name) {
        anyhow::bail!(
            "Context \"{}\" not found. Run `printq context list` to see available contexts.",
            name
        );
    }

    config.current_context = name.to_string();
    config.save(client_config_path)?;
    println!("Switched to context \"{}\".", name);
    Ok(())
}

/// Change settings on a context.
pub fn set(name: &str, settings: &ContextSettings, client_config_path: &Path) -> Result<()> {
    let mut config = ClientConfig::load(client_config_path)?;

    let ctx = config
        .get_mut(name)
        .ok_or_else(|| anyhow::anyhow!("Context \"{}\" not found.", name))?;
    settings.apply(ctx);
    if let Err(e) = ctx.store.validate() {
        eprintln!("warning: {e}");
    }

    config.save(client_config_path)?;
    println!("Context \"{}\" updated.", name);
    Ok(())
}

/// Delete a context, including its saved account.
pub fn delete(name: &str, client_config_path: &Path) -> Result<()> {
    let mut config = ClientConfig::load(client_config_path)?;

    if !config.remove_context(name) {
        anyhow::bail!("Context \"{}\" not found.", name);
    }

    config.save(client_config_path)?;
    println!("Context \"{}\" deleted.", name);
    Ok(())
}
