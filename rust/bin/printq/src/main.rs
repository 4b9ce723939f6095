//! `printq`: command-line front end for the 3D print request board.
//!
//! Manages contexts (which list, which tenant), sign-in, and card
//! operations against a SharePoint list through Microsoft Graph.

mod commands;
mod config;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use commands::card::KindArg;
use commands::context::ContextSettings;
use printq_core::CardError;

/// printq CLI tool.
#[derive(Parser, Debug)]
#[command(name = "printq", about = "3D print request board", version)]
struct Cli {
    /// Path to client config file (default: ~/.printq/config.toml).
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Output format: table or json.
    #[arg(long = "output", short = 'o', global = true, default_value = "table")]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage contexts.
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },

    /// Sign in with a device code.
    Login,

    /// Sign out and forget the saved account.
    Logout,

    /// Show the signed-in account.
    Whoami,

    /// List all cards, newest request first.
    List {
        /// Only cards in this status (code such as APPROVED, or list label).
        #[arg(long)]
        status: Option<String>,
    },

    /// Cards grouped by status.
    Board,

    /// Show one card.
    Get { id: String },

    /// Create a card from JSON.
    Create {
        /// JSON body.
        #[arg(long = "json")]
        json_body: Option<String>,
        /// Read JSON from file.
        #[arg(short = 'f', long = "file")]
        file: Option<String>,
    },

    /// Update card fields (JSON patch, camelCase keys).
    Update {
        id: String,
        #[arg(long = "json")]
        json_body: String,
    },

    /// Move a card to its next status.
    Advance { id: String },

    /// Delete a card.
    Delete {
        id: String,
        /// Skip confirmation.
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },

    /// Upload an image to the image library.
    Upload {
        file: PathBuf,
        #[arg(long, value_enum, default_value = "part")]
        kind: KindArg,
        /// Also set the image on this card.
        #[arg(long)]
        card: Option<String>,
    },

    /// Status, department and cost-benefit report.
    Report,

    /// Check that the site, list and image library can be reached.
    Check,
}

#[derive(Subcommand, Debug)]
enum ContextAction {
    /// Create a new context.
    Create {
        name: String,
        #[command(flatten)]
        settings: ContextSettings,
    },
    /// List all contexts.
    List,
    /// Switch the current context.
    Use { name: String },
    /// Change settings on a context.
    Set {
        name: String,
        #[command(flatten)]
        settings: ContextSettings,
    },
    /// Delete a context.
    Delete { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(config::ClientConfig::default_path);
    let json = cli.output == "json";
    tracing::debug!("using config {}", config_path.display());

    let result = run(cli.command, &config_path, json).await;
    if let Err(e) = &result {
        if let Some(err) = e.downcast_ref::<CardError>() {
            eprintln!("error code: {}", err.error_code());
            if err.needs_reauth() {
                eprintln!("hint: run `printq login` to sign in again.");
            } else if err.is_retryable() {
                eprintln!("hint: requests are being throttled; try again shortly.");
            }
        }
    }
    result
}

async fn run(command: Commands, config_path: &Path, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Context { action } => match action {
            ContextAction::Create { name, settings } => {
                commands::context::create(&name, &settings, config_path)?;
            }
            ContextAction::List => commands::context::list(config_path)?,
            ContextAction::Use { name } => commands::context::use_context(&name, config_path)?,
            ContextAction::Set { name, settings } => {
                commands::context::set(&name, &settings, config_path)?;
            }
            ContextAction::Delete { name } => commands::context::delete(&name, config_path)?,
        },

        Commands::Login => commands::login::login(config_path).await?,
        Commands::Logout => commands::login::logout(config_path).await?,
        Commands::Whoami => commands::login::whoami(config_path).await?,

        Commands::List { status } => commands::card::list(config_path, status, json).await?,
        Commands::Board => commands::card::board(config_path, json).await?,
        Commands::Get { id } => commands::card::get(config_path, &id, json).await?,
        Commands::Create { json_body, file } => {
            commands::card::create(config_path, json_body, file, json).await?;
        }
        Commands::Update { id, json_body } => {
            commands::card::update(config_path, &id, &json_body, json).await?;
        }
        Commands::Advance { id } => commands::card::advance(config_path, &id, json).await?,
        Commands::Delete { id, yes } => commands::card::delete(config_path, &id, yes).await?,
        Commands::Upload { file, kind, card } => {
            commands::card::upload(config_path, &file, kind, card).await?;
        }
        Commands::Report => commands::report::report(config_path, json).await?,
        Commands::Check => commands::card::check(config_path).await?,
    }

    Ok(())
}
