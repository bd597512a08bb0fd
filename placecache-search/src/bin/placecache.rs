//! placecache - inspect and drive the discovery cache over the LMDB stores
//!
//! Usage:
//!   placecache status
//!   placecache clear-venues
//!   placecache clear-tiles
//!   placecache search <lat> <lng> <radius-m> [text]
//!
//! Configuration comes from PLACECACHE_* environment variables and
//! GOOGLE_PLACES_API_KEY. Stores live under PLACECACHE_DATA_DIR.

use std::path::PathBuf;
use std::sync::Arc;

use placecache_core::{Coordinate, DiscoveryConfig, DiscoveryResult, SystemClock};
use placecache_provider::{GooglePlacesConfig, GooglePlacesProvider, PlaceProvider};
use placecache_search::{SearchCoordinator, SearchRequest};
use placecache_storage::{LmdbEntityStore, LmdbTileLedger, DEFAULT_MAP_SIZE_MB};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DATA_DIR: &str = "placecache-data";

enum Command {
    Status,
    ClearVenues,
    ClearTiles,
    Search(SearchRequest),
}

fn usage() -> ! {
    eprintln!("Usage: placecache <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status                              venue and tile counts, mode");
    eprintln!("  clear-venues                        delete every stored venue");
    eprintln!("  clear-tiles                         forget every tile query");
    eprintln!("  search <lat> <lng> <radius-m> [text]");
    std::process::exit(2);
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    match args.first().map(String::as_str) {
        Some("status") => Ok(Command::Status),
        Some("clear-venues") => Ok(Command::ClearVenues),
        Some("clear-tiles") => Ok(Command::ClearTiles),
        Some("search") => {
            if args.len() < 4 {
                return Err("search needs <lat> <lng> <radius-m>".to_string());
            }
            let number = |i: usize, what: &str| -> Result<f64, String> {
                args[i]
                    .parse::<f64>()
                    .map_err(|_| format!("{} must be a number, got {:?}", what, args[i]))
            };
            let mut request = SearchRequest::new(
                Coordinate::new(number(1, "lat")?, number(2, "lng")?),
                number(3, "radius")?,
            );
            if args.len() > 4 {
                request = request.with_text(args[4..].join(" "));
            }
            Ok(Command::Search(request))
        }
        Some(other) => Err(format!("unknown command {:?}", other)),
        None => Err("missing command".to_string()),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("placecache=info,warn"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .try_init();
}

fn build_coordinator() -> DiscoveryResult<SearchCoordinator> {
    let config = DiscoveryConfig::from_env();
    let data_dir = std::env::var("PLACECACHE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

    let store = LmdbEntityStore::open(data_dir.join("venues"), DEFAULT_MAP_SIZE_MB)?;
    let ledger = LmdbTileLedger::open(data_dir.join("tiles"), DEFAULT_MAP_SIZE_MB)?;

    let provider: Option<Arc<dyn PlaceProvider>> = match GooglePlacesConfig::from_env() {
        Ok(provider_config) => Some(Arc::new(GooglePlacesProvider::new(provider_config)?)),
        Err(e) => {
            if !config.local_only {
                tracing::warn!(error = %e, "Google Places not configured");
            }
            None
        }
    };

    SearchCoordinator::new(
        config,
        Arc::new(store),
        Arc::new(ledger),
        provider,
        Arc::new(SystemClock),
    )
}

async fn run(command: Command) -> DiscoveryResult<()> {
    let coordinator = build_coordinator()?;
    match command {
        Command::Status => {
            let status = coordinator.status().await?;
            println!("venues:          {}", status.venue_count);
            println!("cached tiles:    {}", status.cached_tile_count);
            println!("local only:      {}", status.local_only);
            println!(
                "provider:        {}",
                status.provider.as_deref().unwrap_or("not configured")
            );
            println!("tile size (deg): {}", status.tile_size_deg);
            println!("tile ttl (s):    {}", status.tile_ttl_secs);
        }
        Command::ClearVenues => {
            let removed = coordinator.clear_venues().await?;
            println!("removed {} venues", removed);
        }
        Command::ClearTiles => {
            let removed = coordinator.clear_tile_cache().await?;
            println!("removed {} tile records", removed);
        }
        Command::Search(request) => {
            let result = coordinator.search(request).await?;
            match serde_json::to_string_pretty(&result) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to render result: {}", e),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}", message);
            usage();
        }
    };

    init_tracing();

    if let Err(e) = run(command).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_search_with_text() {
        let argv = args(&["search", "40.0", "-73.0", "5000", "iron", "temple"]);
        let Ok(Command::Search(request)) = parse_args(&argv) else {
            panic!("expected search");
        };
        assert_eq!(request.center, Coordinate::new(40.0, -73.0));
        assert_eq!(request.radius_meters, 5000.0);
        assert_eq!(request.text.as_deref(), Some("iron temple"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["search", "40"])).is_err());
        assert!(parse_args(&args(&["search", "north", "0", "1"])).is_err());
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(matches!(parse_args(&args(&["status"])), Ok(Command::Status)));
    }
}
