//! Parcel Enrich entry point.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use parcel_enrich::{CacheStore, GeoKey};
use parcel_enrich_server::config::{self, resolve_cache_path};
use parcel_enrich_server::precache::{self, PrecacheOptions, DEFAULT_SEED};
use parcel_enrich_server::types::ServerError;
use parcel_enrich_server::{EnrichContext, EnrichSettings};

#[derive(Parser)]
#[command(
    name = "parcel-enrich",
    about = "Parcel feature extraction with a persistent, deadline-bounded sidewalk cache",
    version
)]
struct Cli {
    /// Path to the sidewalk cache JSON file.
    #[arg(short, long, global = true)]
    cache: Option<String>,

    /// Overpass interpreter endpoint.
    #[arg(long, global = true)]
    overpass_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check one point for a nearby sidewalk.
    Lookup {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Search radius in meters.
        #[arg(long)]
        radius_m: Option<f64>,

        /// Probe deadline in seconds.
        #[arg(long)]
        timeout_s: Option<f64>,
    },

    /// Print the model features for the parcel containing a point.
    Features {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Parcel GeoJSON file (WGS84).
        /// Also reads from PARCEL_ENRICH_PARCELS env var.
        #[arg(long)]
        parcels: Option<String>,
    },

    /// Add a has_sidewalk column to a CSV of points.
    Precache {
        /// Input CSV with latitude and longitude columns.
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV path.
        #[arg(short, long)]
        output: PathBuf,

        /// Draw this many rows at random instead of processing all rows.
        #[arg(long)]
        sample: Option<usize>,

        /// Seed for the random sample.
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Hide the progress bar.
        #[arg(long)]
        no_progress: bool,
    },

    /// Start the HTTP service.
    #[cfg(feature = "http")]
    Serve {
        /// Listen address (host:port).
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: String,

        /// Parcel GeoJSON file (WGS84) enabling /features.
        /// Also reads from PARCEL_ENRICH_PARCELS env var.
        #[arg(long)]
        parcels: Option<String>,

        /// Browser origin allowed by CORS.
        #[arg(long, default_value = parcel_enrich_server::transport::http::DEFAULT_CORS_ORIGIN)]
        cors_origin: String,
    },

    /// Validate the sidewalk cache file.
    Validate,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   parcel-enrich completions bash > ~/.local/share/bash-completion/completions/parcel-enrich
    ///   parcel-enrich completions zsh > ~/.zfunc/_parcel-enrich
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Lookup {
            lat,
            lon,
            radius_m,
            timeout_s,
        } => {
            config::check_coordinates(lat, lon)?;
            let options = config::lookup_options(radius_m, timeout_s)?;
            let settings =
                EnrichSettings::resolve_cache_only(cli.cache.as_deref(), cli.overpass_url.as_deref());
            let context = EnrichContext::open(&settings)?;

            let has_sidewalk = context.cache().lookup_with(lat, lon, options).await;
            context.shutdown().await?;

            let out = serde_json::json!({
                "key": GeoKey::normalize(lat, lon),
                "has_sidewalk": has_sidewalk,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Commands::Features { lat, lon, parcels } => {
            config::check_coordinates(lat, lon)?;
            let settings = EnrichSettings::resolve(
                cli.cache.as_deref(),
                cli.overpass_url.as_deref(),
                parcels.as_deref(),
            );
            let context = EnrichContext::open(&settings)?;
            let assembler = context.assembler().ok_or(ServerError::ParcelsUnavailable)?;

            let result = assembler.features_at(lat, lon).await;
            context.shutdown().await?;

            match result {
                Ok(features) => println!("{}", serde_json::to_string_pretty(&features)?),
                Err(e) => {
                    let err = ServerError::from(e);
                    println!("{}", serde_json::to_string_pretty(&err.to_json())?);
                    std::process::exit(1);
                }
            }
        }

        Commands::Precache {
            input,
            output,
            sample,
            seed,
            no_progress,
        } => {
            let settings =
                EnrichSettings::resolve_cache_only(cli.cache.as_deref(), cli.overpass_url.as_deref());
            let context = EnrichContext::open(&settings)?;
            let options = PrecacheOptions {
                input,
                output,
                sample,
                seed,
                show_progress: !no_progress,
            };
            let summary = precache::run(context.cache(), &options).await?;
            println!(
                "Enriched {} rows: {} near a sidewalk, {} skipped",
                summary.rows, summary.with_sidewalk, summary.skipped
            );
        }

        #[cfg(feature = "http")]
        Commands::Serve {
            addr,
            parcels,
            cors_origin,
        } => {
            use std::sync::Arc;

            use parcel_enrich_server::HttpTransport;

            let settings = EnrichSettings::resolve(
                cli.cache.as_deref(),
                cli.overpass_url.as_deref(),
                parcels.as_deref(),
            );
            tracing::info!("Parcel Enrich service");
            tracing::info!("Cache: {}", settings.cache_path.display());
            let context = Arc::new(EnrichContext::open(&settings)?);
            let transport = HttpTransport::new(context).with_cors_origin(Some(cors_origin));
            transport.run(&addr).await?;
        }

        Commands::Validate => {
            let cache_path = resolve_cache_path(cli.cache.as_deref());
            match CacheStore::new(&cache_path).load() {
                Ok(records) => {
                    let present = records.values().filter(|v| **v).count();
                    println!("Valid cache file: {}", cache_path.display());
                    println!("  Entries: {}", records.len());
                    println!("  With sidewalk: {present}");
                    println!("  Without sidewalk: {}", records.len() - present);
                }
                Err(e) => {
                    eprintln!("Invalid cache file: {e}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "parcel-enrich", &mut std::io::stdout());
        }
    }

    Ok(())
}
