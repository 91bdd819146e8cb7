//! Storefront cart CLI - drive the cart and session core from a terminal.
//!
//! Every invocation opens one rendering context on the file-backed origin in
//! `STOREFRONT_STORAGE_DIR`, so two shells act like two browser tabs.
//!
//! # Usage
//!
//! ```bash
//! # Add two units of a product, resolving its display data from the catalog
//! storefront-cart cart add tee-black -q 2
//!
//! # Show the cart and its totals
//! storefront-cart cart show
//!
//! # Store a bearer token and confirm it with the backend
//! storefront-cart session login --token "$TOKEN"
//!
//! # Place the order
//! storefront-cart checkout --full-name "Ada Lovelace" --address "12 Analytical Way" \
//!     --city London --postal-code "N1 9GU" --country GB --phone "+44 20 7946 0000"
//! ```
//!
//! # Commands
//!
//! - `cart` - show, add, adjust, set, remove, clear, totals, refresh
//! - `session` - login, logout, whoami
//! - `checkout` - submit the current cart as an order

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_sync::ClientConfig;

mod commands;

#[derive(Parser)]
#[command(name = "storefront-cart")]
#[command(author, version, about = "Storefront cart and session tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and edit the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage the stored session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Submit the cart as an order
    Checkout(ShippingArgs),
}

#[derive(Subcommand)]
enum CartAction {
    /// List cart entries with totals
    Show,
    /// Add a product, resolving its display data from the catalog
    Add {
        /// Product ID
        product_id: String,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Change a product's quantity by a signed amount
    Adjust {
        /// Product ID
        product_id: String,

        /// Units to add (negative to remove)
        #[arg(allow_hyphen_values = true)]
        delta: i64,
    },
    /// Set a product's quantity (minimum 1)
    Set {
        /// Product ID
        product_id: String,

        /// New quantity
        quantity: u32,
    },
    /// Remove a product
    Remove {
        /// Product ID
        product_id: String,
    },
    /// Remove everything
    Clear,
    /// Print nominal, actual and discount totals
    Totals,
    /// Refresh names, prices and images from the catalog
    Refresh,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Store a bearer token and confirm it
    Login {
        /// Bearer token issued by the backend
        #[arg(short, long)]
        token: String,
    },
    /// Remove the stored token and profile
    Logout,
    /// Show who the stored token belongs to
    Whoami,
}

/// Shipping details for checkout.
#[derive(clap::Args)]
struct ShippingArgs {
    #[arg(long)]
    full_name: String,
    #[arg(long)]
    address: String,
    #[arg(long)]
    city: String,
    #[arg(long)]
    postal_code: String,
    #[arg(long)]
    country: String,
    #[arg(long)]
    phone: String,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
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

    // Load configuration from environment (needed for Sentry init)
    let config = ClientConfig::from_env();

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);

    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storefront_sync=info,storefront_sync_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, &config).await {
        tracing::error!(retryable = e.is_retryable(), "Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), commands::CommandError> {
    let ctx = commands::open_context(config)?;

    match cli.command {
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&ctx),
            CartAction::Add {
                product_id,
                quantity,
            } => commands::cart::add(&ctx, &product_id, quantity).await?,
            CartAction::Adjust { product_id, delta } => {
                commands::cart::adjust(&ctx, &product_id, delta);
            }
            CartAction::Set {
                product_id,
                quantity,
            } => commands::cart::set(&ctx, &product_id, quantity),
            CartAction::Remove { product_id } => commands::cart::remove(&ctx, &product_id),
            CartAction::Clear => commands::cart::clear(&ctx),
            CartAction::Totals => commands::cart::totals(&ctx),
            CartAction::Refresh => commands::cart::refresh(&ctx).await,
        },
        Commands::Session { action } => match action {
            SessionAction::Login { token } => commands::session::login(&ctx, &token).await?,
            SessionAction::Logout => commands::session::logout(&ctx),
            SessionAction::Whoami => commands::session::whoami(&ctx).await,
        },
        Commands::Checkout(args) => {
            let shipping = storefront_sync_core::ShippingInfo {
                full_name: args.full_name,
                address: args.address,
                city: args.city,
                postal_code: args.postal_code,
                country: args.country,
                phone: args.phone,
            };
            commands::checkout::submit(&ctx, shipping).await?;
        }
    }
    Ok(())
}
