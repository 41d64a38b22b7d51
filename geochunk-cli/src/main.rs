use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::PyramidArgs;

/// Build and inspect geochunk elevation pyramids
#[derive(Parser)]
#[command(name = "geochunk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    pyramid: PyramidArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the chunk containing a coordinate
    Key {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Zoom level (0 = coarsest)
        #[arg(short, long)]
        zoom: u8,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Decode a numeric chunk key
    Decode {
        /// Packed chunk key
        key: i64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Fetch or build the chunk containing a coordinate
    Resolve {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Zoom level (0 = coarsest)
        #[arg(short, long)]
        zoom: u8,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Build every chunk of one zoom level over a bounding box
    Warm {
        /// Southern boundary latitude
        #[arg(long, allow_hyphen_values = true)]
        min_lat: f64,

        /// Western boundary longitude
        #[arg(long, allow_hyphen_values = true)]
        min_lon: f64,

        /// Northern boundary latitude
        #[arg(long, allow_hyphen_values = true)]
        max_lat: f64,

        /// Eastern boundary longitude
        #[arg(long, allow_hyphen_values = true)]
        max_lon: f64,

        /// Zoom level (0 = coarsest)
        #[arg(short, long)]
        zoom: u8,
    },

    /// List persisted chunks
    List {
        /// Only show chunks of this zoom level
        #[arg(short, long)]
        zoom: Option<u8>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so JSON output stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geochunk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Key {
            lat,
            lon,
            zoom,
            json,
        } => commands::key::run(&cli.pyramid, lat, lon, zoom, json),
        Commands::Decode { key, json } => commands::decode::run(&cli.pyramid, key, json),
        Commands::Resolve {
            lat,
            lon,
            zoom,
            json,
        } => commands::resolve::run(&cli.pyramid, lat, lon, zoom, json).await,
        Commands::Warm {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
            zoom,
        } => {
            commands::warm::run(&cli.pyramid, (min_lat, min_lon, max_lat, max_lon), zoom).await
        }
        Commands::List { zoom } => commands::list::run(&cli.pyramid, zoom).await,
    }
}
