//! tablecache - offline-capable command-line client for the restaurant
//! directory.
//!
//! Every command runs through the offline worker: API reads are mirrored
//! into the local store, shell assets are served from the cache set, and
//! reads fall back to local data when the network is down.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tablecache_core::store::{restaurant_schema, LocalStore};
use tablecache_core::worker::WorkerState;
use tablecache_core::{
    CacheSet, Config, FetchPolicy, HttpTransport, Mirror, NewReview, OfflineWorker, RecordId,
    RemoteGateway, Request, Restaurant, Review, WorkerMessage,
};

type Worker = OfflineWorker<HttpTransport>;

#[derive(Parser, Debug)]
#[command(name = "tablecache")]
#[command(about = "Restaurant directory client that keeps working offline")]
#[command(version)]
struct Args {
    /// Path to config file (default: $XDG_CONFIG_HOME/tablecache/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed the app-shell cache
    Install {
        /// Activate as soon as the install completes
        #[arg(long)]
        skip_waiting: bool,
    },
    /// Activate an installed worker, evicting stale caches
    Activate,
    /// List restaurants, optionally filtered
    Restaurants {
        #[arg(long)]
        cuisine: Option<String>,
        #[arg(long)]
        neighborhood: Option<String>,
    },
    /// Show one restaurant and its reviews
    Restaurant { id: String },
    /// List distinct neighborhoods
    Neighborhoods,
    /// List distinct cuisines
    Cuisines,
    /// Mark a restaurant as favorite
    Favorite {
        id: String,
        /// Remove the favorite mark instead
        #[arg(long)]
        off: bool,
    },
    /// Add or remove reviews
    Review {
        #[command(subcommand)]
        action: ReviewAction,
    },
    /// Fetch a URL through the offline worker
    Get {
        url: String,
        /// Send as a page navigation rather than a plain fetch
        #[arg(long)]
        navigate: bool,
    },
    /// Drop cached images of restaurants no longer stored
    PruneImages,
    /// List caches and their entries
    Caches,
    /// Delete the local store
    ResetDb,
}

#[derive(Subcommand, Debug)]
enum ReviewAction {
    Add {
        restaurant_id: String,
        #[arg(long)]
        rating: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "")]
        comments: String,
    },
    Remove { id: String },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => Config::load(),
    }
}

/// Everything a command needs, wired the way a page load would be.
struct Session {
    worker: Arc<Worker>,
    gateway: RemoteGateway<Arc<Worker>>,
}

impl Session {
    async fn open(config: &Config) -> Result<Self> {
        let store = if config.store_enabled {
            let dir = config.store_dir()?;
            LocalStore::open_or_recover(&dir, &config.db_name, config.db_version, restaurant_schema)
                .await
        } else {
            LocalStore::unavailable()
        };
        let mirror = Mirror::new(store);

        let caches = CacheSet::open(&config.cache_dir()?).context("Failed to open cache set")?;
        let policy = FetchPolicy::new(config.origin_url()?, config.api_base()?, config.cache_names())
            .with_image_prefixes(config.image_path_prefixes.clone())
            .with_cache_on_fetch(config.cache_on_fetch);
        let worker = Arc::new(
            OfflineWorker::new(policy, &config.precache, HttpTransport::new()?, caches, mirror.clone())
                .context("Invalid precache path")?,
        );
        let gateway = RemoteGateway::new(config.api_base()?, worker.clone(), mirror)?;

        Ok(Self { worker, gateway })
    }

    async fn close(&self) {
        self.gateway.mirror().settle().await;
    }
}

fn print_restaurant(restaurant: &Restaurant) {
    println!(
        "{:>4}  {}{}  ({}, {})",
        restaurant.id,
        restaurant.name,
        if restaurant.is_favorite { " *" } else { "" },
        restaurant.neighborhood.as_deref().unwrap_or("-"),
        restaurant.cuisine_type.as_deref().unwrap_or("-"),
    );
}

fn print_review(review: &Review) {
    println!(
        "  [{}] {}/{} by {}: {}",
        review.id,
        review.rating,
        tablecache_core::models::MAX_RATING,
        review.name,
        review.comments
    );
}

fn reset_db(config: &Config) -> Result<()> {
    let deleted = LocalStore::delete_database(&config.store_dir()?, &config.db_name)?;
    println!("{}", if deleted { "Local store deleted" } else { "No local store" });
    Ok(())
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let session = Session::open(config).await?;
    let worker = &session.worker;
    let gateway = &session.gateway;

    if !matches!(command, Command::Install { .. }) && worker.resume().await? {
        info!("Resumed installed worker");
    }

    match command {
        Command::Install { skip_waiting } => {
            if skip_waiting {
                worker.post_message(WorkerMessage::SkipWaiting).await?;
            }
            let count = worker.install().await?;
            println!("Cached {} shell resources", count);
            if worker.state().await != WorkerState::Activated {
                println!("Worker installed, activates on next run");
            }
        }
        Command::Activate => {
            if worker.state().await == WorkerState::Activated {
                println!("Worker active");
            } else {
                println!("No installed worker; run `tablecache install` first");
            }
        }
        Command::Restaurants {
            cuisine,
            neighborhood,
        } => {
            // "all" is the listing page's name for no filter
            let filter = |v: &Option<String>| v.clone().filter(|v| v.as_str() != "all");
            let (cuisine, neighborhood) = (filter(&cuisine), filter(&neighborhood));
            let restaurants = gateway
                .fetch_restaurants_by_cuisine_and_neighborhood(
                    cuisine.as_deref(),
                    neighborhood.as_deref(),
                )
                .await?;
            for restaurant in &restaurants {
                print_restaurant(restaurant);
            }
        }
        Command::Restaurant { id } => {
            let id = RecordId::parse(&id);
            let restaurant = gateway.fetch_restaurant_by_id(&id).await?;
            print_restaurant(&restaurant);
            if let Some(ref address) = restaurant.address {
                println!("      {}", address);
            }
            if let Some(ref hours) = restaurant.operating_hours {
                for (day, time) in hours {
                    println!("      {:<10} {}", day, time);
                }
            }
            match gateway.fetch_reviews_by_restaurant_id(&id).await {
                Ok(reviews) if reviews.is_empty() => println!("  No reviews yet"),
                Ok(reviews) => reviews.iter().for_each(print_review),
                Err(e) => println!("  Reviews unavailable: {}", e),
            }
        }
        Command::Neighborhoods => {
            for neighborhood in gateway.fetch_neighborhoods().await? {
                println!("{}", neighborhood);
            }
        }
        Command::Cuisines => {
            for cuisine in gateway.fetch_cuisines().await? {
                println!("{}", cuisine);
            }
        }
        Command::Favorite { id, off } => {
            let restaurant = gateway.set_favorite(&RecordId::parse(&id), !off).await?;
            print_restaurant(&restaurant);
        }
        Command::Review { action } => match action {
            ReviewAction::Add {
                restaurant_id,
                rating,
                name,
                comments,
            } => {
                let review = gateway
                    .add_review(&NewReview {
                        restaurant_id: RecordId::parse(&restaurant_id),
                        name,
                        rating,
                        comments,
                    })
                    .await?;
                print_review(&review);
            }
            ReviewAction::Remove { id } => {
                gateway.remove_review(&RecordId::parse(&id)).await?;
                println!("Review {} removed", id);
            }
        },
        Command::Get { url, navigate } => {
            let url = config
                .origin_url()?
                .join(&url)
                .with_context(|| format!("Invalid URL: {}", url))?;
            let request = if navigate {
                Request::navigate(url)
            } else {
                Request::get(url)
            };
            let response = worker.handle_fetch(&request).await?;
            eprintln!("{}", response.status);
            if response.is_json() {
                let value: serde_json::Value = response.json()?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", response.text());
            }
        }
        Command::PruneImages => {
            let removed = worker.prune_images().await?;
            println!("Removed {} cached images", removed);
        }
        Command::Caches => {
            let names = worker.policy().names();
            for name in worker.caches().keys().await {
                let entries = worker.caches().entries(&name).await;
                let owner = if names.is_ours(&name) { "" } else { ", not ours" };
                println!("{} ({} entries{})", name, entries.len(), owner);
                for entry in entries {
                    println!(
                        "  {} {} (cached {}, {} min ago)",
                        entry.status,
                        entry.url,
                        entry.cached_at.format("%Y-%m-%d %H:%M"),
                        entry.age_minutes()
                    );
                }
            }
        }
        Command::ResetDb => reset_db(config)?,
    }

    session.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing();

    let config = load_config(args.config.as_ref())?;
    info!(api = %config.api_base_url, origin = %config.origin, "tablecache starting");

    match args.command {
        // Must not open the store it is about to delete
        Command::ResetDb => reset_db(&config),
        command => run(command, &config).await,
    }
}
