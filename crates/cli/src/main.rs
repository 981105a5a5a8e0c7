//! Grocer CLI - Database migrations, catalog seeding, and cart tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! grocer-cli migrate
//!
//! # Load products from a YAML catalog
//! grocer-cli seed products catalog.yaml
//!
//! # Inspect or edit a cart (guest by default, `--user` for a signed-in cart)
//! grocer-cli cart show
//! grocer-cli cart add banana --quantity 2
//! grocer-cli cart --user 6f1c2d9e-0c59-4f4e-9d0e-1e2f3a4b5c6d update banana -- -1
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed products` - Upsert catalog products from YAML
//! - `cart` - Show, add, update, remove, or clear cart lines

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use grocer_storefront::config::StorefrontConfig;

mod commands;

use commands::cart::CartAction;

#[derive(Parser)]
#[command(name = "grocer-cli")]
#[command(author, version, about = "Grocer CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Inspect or edit a cart
    Cart {
        /// Act as this signed-in user instead of a guest
        #[arg(short, long, global = true)]
        user: Option<Uuid>,

        #[command(subcommand)]
        action: CartCommand,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Upsert catalog products from a YAML file
    Products {
        /// Path to the catalog YAML file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum CartCommand {
    /// Show the cart
    Show,
    /// Add units of a product
    Add {
        /// Product id
        product_id: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,

        /// Display name, for products missing from the catalog
        #[arg(long)]
        name: Option<String>,

        /// Unit price, for products missing from the catalog
        #[arg(long)]
        price: Option<Decimal>,
    },
    /// Change a line's quantity by a signed amount
    Update {
        /// Product id
        product_id: String,

        /// Quantity change (e.g., 2 or -1)
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },
    /// Remove a line
    Remove {
        /// Product id
        product_id: String,
    },
    /// Empty the cart
    Clear,
}

impl From<CartCommand> for CartAction {
    fn from(command: CartCommand) -> Self {
        match command {
            CartCommand::Show => Self::Show,
            CartCommand::Add {
                product_id,
                quantity,
                name,
                price,
            } => Self::Add {
                product_id,
                quantity,
                name,
                price,
            },
            CartCommand::Update { product_id, delta } => Self::Update { product_id, delta },
            CartCommand::Remove { product_id } => Self::Remove { product_id },
            CartCommand::Clear => Self::Clear,
        }
    }
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = StorefrontConfig::from_env();

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "grocer_cli=info,grocer_storefront=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &StorefrontConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run(config).await?,
        Commands::Seed { target } => match target {
            SeedTarget::Products { file } => commands::seed::products(config, &file).await?,
        },
        Commands::Cart { user, action } => {
            commands::cart::run(config, user, action.into()).await?;
        }
    }
    Ok(())
}
