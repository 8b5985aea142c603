//! # Cardex CLI (`cardex`)
//!
//! The `cardex` binary is the interface to the card collection. It provides
//! commands for database initialization, credential and theme management,
//! scanning cards, browsing and editing the collection, and backups.
//!
//! ## Usage
//!
//! ```bash
//! cardex --config ./config/cardex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cardex init` | Create the SQLite database and schema |
//! | `cardex key set <KEY>` | Store the extraction API key |
//! | `cardex key reset` | Remove the stored API key |
//! | `cardex key show` | Show the stored API key, masked |
//! | `cardex theme [show\|toggle\|set]` | Show or change the theme preference |
//! | `cardex scan <IMAGE>` | Scan a card image and save the extracted card |
//! | `cardex list` | List cards grouped by industry |
//! | `cardex get <id>` | Show one card |
//! | `cardex edit <id>` | Change fields of a card |
//! | `cardex delete <id>` | Delete a card |
//! | `cardex export` | Write a JSON backup |
//! | `cardex import <FILE>` | Merge a JSON backup |
//! | `cardex stats` | Collection summary |
//!
//! ## Examples
//!
//! ```bash
//! # Scan a card, correcting the extracted title
//! cardex scan ./card.jpg --title "CTO"
//!
//! # Preview extraction without saving
//! cardex scan ./card.jpg --dry-run
//!
//! # Search across all contact fields
//! cardex list --search gmail
//! ```

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use cardex::models::{FieldOverrides, Theme};
use cardex::theme::ThemeAction;
use cardex::{
    config, credential, edit_cmd, export, get, import, list, logging, migrate, scan_cmd, stats,
    theme,
};

/// Cardex: scan business cards into a searchable local collection.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "cardex",
    about = "Cardex — scan business cards into a searchable local collection",
    version,
    long_about = "Cardex reads business card photos with a vision model, crops the portrait, \
    and keeps the cards in a local SQLite store that can be searched, grouped by industry, \
    edited, and backed up as JSON."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cardex.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the key-value table. Running it
    /// more than once is safe.
    Init,

    /// Manage the extraction API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Show or change the light/dark theme preference.
    Theme {
        #[command(subcommand)]
        action: Option<ThemeCommand>,
    },

    /// Scan a card image, extract its fields, and save it.
    ///
    /// Use `-` to read the image from stdin. Field flags override what the
    /// model extracted.
    Scan {
        /// Card image (JPEG, PNG, WebP, GIF, or BMP).
        image: PathBuf,

        #[command(flatten)]
        fields: FieldArgs,

        /// Show the extracted card without saving it.
        #[arg(long)]
        dry_run: bool,
    },

    /// List cards grouped by industry.
    List {
        /// Only cards containing this text in any contact field.
        #[arg(long, short)]
        search: Option<String>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show all fields of one card.
    Get {
        /// Card ID (e.g. card_3f2a...).
        id: String,
    },

    /// Change fields of an existing card.
    Edit {
        id: String,

        #[command(flatten)]
        fields: FieldArgs,

        /// Replace the card image with this file.
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Delete a card.
    Delete {
        id: String,

        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },

    /// Write the collection to a JSON backup.
    ///
    /// Defaults to `ai-card-backup-<YYYY-MM-DD>.json` in the current
    /// directory; `--output -` writes to stdout.
    Export {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Merge a JSON backup into the collection (matching IDs are replaced).
    Import {
        file: PathBuf,
    },

    /// Show collection statistics.
    Stats,

    /// Generate a shell completion script.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Store the API key.
    Set { key: String },

    /// Remove the stored API key.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },

    /// Show the stored API key, masked.
    Show,
}

#[derive(Subcommand)]
enum ThemeCommand {
    /// Print the current theme (the default).
    Show,
    /// Switch between light and dark.
    Toggle,
    /// Set the theme explicitly.
    Set {
        #[arg(value_parser = parse_theme)]
        theme: Theme,
    },
}

fn parse_theme(s: &str) -> Result<Theme, String> {
    s.parse()
}

/// Card field flags shared by `scan` and `edit`. An empty value clears the
/// field.
#[derive(Args, Default)]
struct FieldArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    website: Option<String>,
    #[arg(long)]
    social: Option<String>,
    #[arg(long)]
    industry: Option<String>,
}

impl From<FieldArgs> for FieldOverrides {
    fn from(args: FieldArgs) -> Self {
        FieldOverrides {
            name: args.name,
            phone: args.phone,
            email: args.email,
            company: args.company,
            title: args.title,
            address: args.address,
            website: args.website,
            social: args.social,
            industry: args.industry,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "cardex", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_or_default(&cli.config)?;
    logging::init(&cfg.logging.level, cli.verbose);
    tracing::debug!(config = %cli.config.display(), db = %cfg.db.path.display(), "loaded configuration");

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Key { action } => match action {
            KeyAction::Set { key } => credential::run_key_set(&cfg, &key).await?,
            KeyAction::Reset { yes } => credential::run_key_reset(&cfg, yes).await?,
            KeyAction::Show => credential::run_key_show(&cfg).await?,
        },
        Commands::Theme { action } => {
            let action = match action {
                None | Some(ThemeCommand::Show) => ThemeAction::Show,
                Some(ThemeCommand::Toggle) => ThemeAction::Toggle,
                Some(ThemeCommand::Set { theme }) => ThemeAction::Set(theme),
            };
            theme::run_theme(&cfg, action).await?;
        }
        Commands::Scan {
            image,
            fields,
            dry_run,
        } => {
            scan_cmd::run_scan(&cfg, &image, &fields.into(), dry_run).await?;
        }
        Commands::List { search, json } => {
            list::run_list(&cfg, search.as_deref(), json).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Edit { id, fields, image } => {
            edit_cmd::run_edit(&cfg, &id, &fields.into(), image.as_deref()).await?;
        }
        Commands::Delete { id, yes } => {
            edit_cmd::run_delete(&cfg, &id, yes).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
        Commands::Import { file } => {
            import::run_import(&cfg, &file).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
