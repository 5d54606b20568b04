//! One complete sync run: fetch, extract, match, reconcile.

use crate::archive::unpack_price_feed;
use crate::config::PipelineConfig;
use crate::error::FeedError;
use crate::extract::extract_price_file;
use crate::fetch::{HttpClient, fetch_source, submit_form};
use crate::matcher::match_osm_file;
use crate::output::write_report;
use crate::parser::find_runtime_error;
use crate::reconcile::{MatchIndex, reconcile};
use crate::stats::RunStats;
use crate::store::{OutputStore, ScratchStore};
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{error, info};

const PRICE_DOWNLOAD_NAME: &str = "data.download";
const OSM_DOWNLOAD_NAME: &str = "osm_gasstations.xml";

/// Runs the whole pipeline against `config`.
///
/// Intermediate files live in a temporary folder removed when the run ends.
/// The output directory is only cleared once both feeds have been obtained
/// and the price feed has been fully extracted, so a failure in any of those
/// steps leaves the previous generation untouched.
#[tracing::instrument(skip_all, fields(output_dir = %config.output_dir.display(), region = %config.region))]
pub async fn run<C: HttpClient>(client: &C, config: &PipelineConfig) -> Result<RunStats> {
    let stats = RunStats::new(&config.region);

    let workspace = tempfile::Builder::new()
        .prefix("gasprice")
        .tempdir()
        .context("failed to create temporary folder")?;
    let work_dir = workspace.path();

    info!(source = %config.price_feed, "Obtaining price feed");
    let download =
        fetch_source(client, &config.price_feed, &work_dir.join(PRICE_DOWNLOAD_NAME)).await?;
    let feed_dir = work_dir.join("feed");
    fs::create_dir_all(&feed_dir)
        .with_context(|| format!("failed to create folder {}", feed_dir.display()))?;
    let feed = unpack_price_feed(&download, &feed_dir)?;

    let scratch = ScratchStore::create(work_dir.join("prices"))?;
    let extracted = extract_price_file(&feed, &scratch)?;

    let osm_path = obtain_geo_feed(client, config, work_dir).await?;

    let output = OutputStore::new(&config.output_dir);
    output.reset()?;

    let mut index = MatchIndex::new();
    let matches = match_osm_file(
        &osm_path,
        &config.reference_key,
        &scratch,
        &output,
        &mut index,
    )?;

    let report = reconcile(&index, &scratch);
    if let Some(path) = &config.report_path {
        match write_report(path, &report) {
            Ok(rows) => info!(path = %path.display(), rows, "Reconciliation report written"),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to write reconciliation report"),
        }
    }

    let stats = stats
        .with_extract(&extracted)
        .with_matches(&matches)
        .with_reconciliation(&index, &report);

    info!(
        stations = stats.stations,
        matched = stats.matched,
        unclaimed = stats.unclaimed_stations,
        coverage_pct = stats.coverage_pct(),
        "Sync run complete"
    );
    Ok(stats)
}

/// Resolves the configured map data, querying Overpass for the stations of
/// the configured region when no feed was given. Data that Overpass flagged
/// with a runtime error is rejected.
async fn obtain_geo_feed<C: HttpClient>(
    client: &C,
    config: &PipelineConfig,
    work_dir: &Path,
) -> Result<PathBuf> {
    let dest = work_dir.join(OSM_DOWNLOAD_NAME);

    let path = match &config.geo_feed {
        Some(source) => {
            info!(source = %source, "Obtaining openstreetmap data");
            fetch_source(client, source, &dest).await?
        }
        None => {
            let query = config.overpass_query();
            info!(url = %config.overpass_url, query = %query, "Querying Overpass for gas stations");
            submit_form(client, &config.overpass_url, &[("data", query.as_str())], &dest)
                .await
                .context("failed to get gas stations from openstreetmap")?;
            dest
        }
    };

    check_geo_feed(&path)?;
    Ok(path)
}

fn check_geo_feed(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| {
        format!(
            "failed to open openstreetmap data file {} for checking",
            path.display()
        )
    })?;
    match find_runtime_error(BufReader::new(file))? {
        Some(remark) => Err(FeedError::IncompleteGeoFeed(remark).into()),
        None => Ok(()),
    }
}
