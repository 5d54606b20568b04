use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::extract::ExtractSummary;
use crate::matcher::MatchSummary;
use crate::reconcile::{MatchIndex, Reconciliation};

#[derive(Debug, Default, Serialize)]
pub struct RunStats {
    pub timestamp: DateTime<Utc>,
    pub region: String,

    // price feed
    pub stations: usize,
    pub prices: usize,
    pub unknown_gas_types: usize,
    pub missing_updates: usize,
    pub dropped_prices: usize,

    // geographic feed
    pub entities: usize,
    pub with_reference: usize,
    pub matched: usize,
    pub invalid_references: usize,
    pub skipped_entities: usize,

    // reconciliation
    pub claimed_stations: usize,
    pub unclaimed_stations: usize,
    pub shared_stations: usize,
}

impl RunStats {
    pub fn new(region: &str) -> Self {
        RunStats {
            timestamp: Utc::now(),
            region: region.to_string(),
            ..Default::default()
        }
    }

    pub fn with_extract(mut self, summary: &ExtractSummary) -> Self {
        self.stations = summary.stations;
        self.prices = summary.prices;
        self.unknown_gas_types = summary.unknown_gas_types;
        self.missing_updates = summary.missing_updates;
        self.dropped_prices = summary.dropped_prices;
        self
    }

    pub fn with_matches(mut self, summary: &MatchSummary) -> Self {
        self.entities = summary.entities;
        self.with_reference = summary.with_reference;
        self.matched = summary.matched;
        self.invalid_references = summary.invalid_references;
        self.skipped_entities = summary.skipped;
        self
    }

    pub fn with_reconciliation(mut self, index: &MatchIndex, report: &Reconciliation) -> Self {
        self.claimed_stations = index.len();
        self.unclaimed_stations = report.unclaimed.len();
        self.shared_stations = report.shared.len();
        self
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of price stations claimed by at least one map object.
    pub fn coverage_pct(&self) -> f64 {
        Self::pct(self.claimed_stations, self.stations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(RunStats::pct(10, 0), 0.0);
    }

    #[test]
    fn test_pct_normal_values() {
        assert_eq!(RunStats::pct(50, 100), 50.0);
        assert_eq!(RunStats::pct(1, 4), 25.0);
    }

    #[test]
    fn test_collects_stage_summaries() {
        let extract = ExtractSummary {
            stations: 4,
            prices: 10,
            unknown_gas_types: 1,
            missing_updates: 2,
            dropped_prices: 0,
        };
        let matches = MatchSummary {
            entities: 5,
            with_reference: 4,
            matched: 3,
            invalid_references: 1,
            skipped: 0,
        };
        let mut index = MatchIndex::new();
        index.claim("1", EntityKind::Node, "10");
        index.claim("1", EntityKind::Node, "11");
        index.claim("2", EntityKind::Way, "20");
        let report = Reconciliation {
            unclaimed: vec!["3".to_string(), "4".to_string()],
            shared: index
                .shared()
                .map(|(id, claims)| (id.to_string(), claims.to_vec()))
                .collect(),
        };

        let stats = RunStats::new("France")
            .with_extract(&extract)
            .with_matches(&matches)
            .with_reconciliation(&index, &report);

        assert_eq!(stats.region, "France");
        assert_eq!(stats.stations, 4);
        assert_eq!(stats.matched, 3);
        assert_eq!(stats.claimed_stations, 2);
        assert_eq!(stats.unclaimed_stations, 2);
        assert_eq!(stats.shared_stations, 1);
        assert_eq!(stats.coverage_pct(), 50.0);
    }
}
