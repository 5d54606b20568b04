//! Price extraction: national feed → scratch store.

use crate::model::PriceRecord;
use crate::parser::StationReader;
use crate::store::ScratchStore;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Counters of one extraction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    pub stations: usize,
    pub prices: usize,
    pub unknown_gas_types: usize,
    pub missing_updates: usize,
    pub dropped_prices: usize,
}

impl ExtractSummary {
    fn add(&mut self, station: &PriceRecord) {
        self.stations += 1;
        self.prices += station.prices.len();
        self.unknown_gas_types += station.prices.iter().filter(|p| !p.name.is_known()).count();
        self.missing_updates += station.prices.iter().filter(|p| p.update.is_none()).count();
    }
}

/// Streams every station of `source` into `scratch`, writing each record as
/// soon as its element is closed.
///
/// # Errors
///
/// Fails on malformed XML, on a station without id, or when a record cannot
/// be written. Stations read before the failure stay in the scratch store.
#[tracing::instrument(skip_all, fields(scratch = %scratch.dir().display()))]
pub fn extract_prices<R: BufRead>(source: R, scratch: &ScratchStore) -> Result<ExtractSummary> {
    let mut summary = ExtractSummary::default();

    let mut stations = StationReader::new(source);
    for station in stations.by_ref() {
        let station = station?;
        summary.add(&station);
        scratch.write(&station)?;
    }
    summary.dropped_prices = stations.dropped_prices();

    info!(
        stations = summary.stations,
        prices = summary.prices,
        unknown_gas_types = summary.unknown_gas_types,
        missing_updates = summary.missing_updates,
        dropped_prices = summary.dropped_prices,
        "Price feed extracted"
    );
    Ok(summary)
}

/// [`extract_prices`] over a file on disk.
pub fn extract_price_file(path: &Path, scratch: &ScratchStore) -> Result<ExtractSummary> {
    let file = File::open(path)
        .with_context(|| format!("failed to open data file {} for parsing", path.display()))?;
    extract_prices(BufReader::new(file), scratch)
}
