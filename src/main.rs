//! CLI entry point for the gas price sync tool.
//!
//! Provides subcommands to rebuild the per-entity price store from the
//! national feed and OpenStreetMap, and to serve it over HTTP.

use anyhow::Result;
use clap::{Parser, Subcommand};
use gasprice::{
    config::{
        DEFAULT_BIND_ADDRESS, DEFAULT_OVERPASS_URL, DEFAULT_PRICE_FEED_URL,
        DEFAULT_REFERENCE_KEY, DEFAULT_REGION, DEFAULT_TIMEOUT_SECS, PipelineConfig,
    },
    fetch::BasicClient,
    lookup,
    output::print_json,
    pipeline,
};
use std::ffi::OsStr;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gasprice")]
#[command(about = "Publishes fuel prices keyed by OpenStreetMap object", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the price store from the price feed and OpenStreetMap
    Sync {
        /// Directory to publish `node/<id>` and `way/<id>` records into
        #[arg(value_name = "OUTPUT_DIR", env = "GASPRICE_OUTPUT_DIR")]
        output_dir: PathBuf,

        /// Price feed URL or local file (zip, gzip or plain XML)
        #[arg(long, env = "GASPRICE_PRICE_FEED", default_value = DEFAULT_PRICE_FEED_URL)]
        price_feed: String,

        /// OpenStreetMap XML URL or local file; Overpass is queried when absent
        #[arg(long, env = "GASPRICE_GEO_FEED")]
        geo_feed: Option<String>,

        /// Overpass API interpreter endpoint
        #[arg(long, env = "GASPRICE_OVERPASS_URL", default_value = DEFAULT_OVERPASS_URL)]
        overpass_url: String,

        /// Area name the gas stations are selected in
        #[arg(long, env = "GASPRICE_REGION", default_value = DEFAULT_REGION)]
        region: String,

        /// Tag holding the price station id on OpenStreetMap objects
        #[arg(long, env = "GASPRICE_REFERENCE_KEY", default_value = DEFAULT_REFERENCE_KEY)]
        reference_key: String,

        /// CSV file to append unclaimed and shared stations to
        #[arg(long, env = "GASPRICE_REPORT")]
        report: Option<PathBuf>,

        /// Timeout of each HTTP request, in seconds
        #[arg(
            long,
            env = "GASPRICE_TIMEOUT_SECS",
            default_value_t = DEFAULT_TIMEOUT_SECS,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        timeout_secs: u64,
    },
    /// Serve price lookups from previously synced data
    Serve {
        /// Directory holding one folder per synced generation
        #[arg(value_name = "DATA_DIR", env = "GASPRICE_DATA_DIR")]
        data_dir: PathBuf,

        /// Address to listen on
        #[arg(long, env = "GASPRICE_BIND", default_value = DEFAULT_BIND_ADDRESS)]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gasprice.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gasprice.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            output_dir,
            price_feed,
            geo_feed,
            overpass_url,
            region,
            reference_key,
            report,
            timeout_secs,
        } => {
            let config = PipelineConfig {
                price_feed,
                geo_feed,
                overpass_url,
                region,
                reference_key,
                report_path: report,
                timeout: Duration::from_secs(timeout_secs),
                ..PipelineConfig::new(output_dir)
            };
            let client = BasicClient::new(config.timeout)?;

            let stats = pipeline::run(&client, &config).await?;
            print_json(&stats)?;
        }
        Commands::Serve { data_dir, bind } => {
            lookup::serve(data_dir, bind).await?;
        }
    }

    Ok(())
}
