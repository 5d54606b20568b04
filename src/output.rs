//! Run summary logging and the reconciliation CSV report.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::reconcile::{Claim, Reconciliation};
use crate::stats::RunStats;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Logs run statistics as pretty-printed JSON.
pub fn print_json(stats: &RunStats) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(stats)?);
    Ok(())
}

/// One line of the reconciliation report.
#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    generated_at: DateTime<Utc>,
    status: &'static str,
    price_id: &'a str,
    claimed_by: String,
}

/// Appends the reconciliation of one run to the CSV file at `path`.
///
/// Unclaimed stations are written with status `unclaimed`, stations claimed
/// by several map objects with status `shared` and the claimants separated by
/// `;`. Creates the file with headers if it does not already exist. Returns
/// the number of rows written.
pub fn write_report(path: &Path, report: &Reconciliation) -> Result<usize> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending reconciliation report");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    let generated_at = Utc::now();
    let mut rows = 0;

    for price_id in &report.unclaimed {
        writer.serialize(ReportRow {
            generated_at,
            status: "unclaimed",
            price_id,
            claimed_by: String::new(),
        })?;
        rows += 1;
    }

    for (price_id, claims) in &report.shared {
        writer.serialize(ReportRow {
            generated_at,
            status: "shared",
            price_id,
            claimed_by: claims.iter().map(Claim::label).collect::<Vec<_>>().join(";"),
        })?;
        rows += 1;
    }

    writer.flush()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;
    use std::fs;

    fn report() -> Reconciliation {
        Reconciliation {
            unclaimed: vec!["67890".to_string()],
            shared: vec![(
                "12345".to_string(),
                vec![
                    Claim {
                        kind: EntityKind::Node,
                        entity_id: "1".to_string(),
                    },
                    Claim {
                        kind: EntityKind::Way,
                        entity_id: "2".to_string(),
                    },
                ],
            )],
        }
    }

    #[test]
    fn test_print_json_does_not_panic() {
        let stats = RunStats::default();
        print_json(&stats).unwrap();
    }

    #[test]
    fn test_write_report_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");

        let rows = write_report(&path, &report()).unwrap();

        assert_eq!(rows, 2);
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "generated_at,status,price_id,claimed_by");
        assert!(lines[1].ends_with(",unclaimed,67890,"));
        assert!(lines[2].ends_with(",shared,12345,node/1;way/2"));
    }

    #[test]
    fn test_write_report_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");

        write_report(&path, &report()).unwrap();
        write_report(&path, &report()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("generated_at")).count();
        assert_eq!(header_count, 1);
        // 1 header + 2 rows per run
        assert_eq!(content.lines().count(), 5);
    }

    #[test]
    fn test_write_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");

        let rows = write_report(&path, &Reconciliation::default()).unwrap();

        assert_eq!(rows, 0);
    }
}
