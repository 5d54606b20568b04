//! Geographic matching: map entities → output store.

use crate::model::{GeoEntity, is_valid_key};
use crate::parser::OsmReader;
use crate::reconcile::MatchIndex;
use crate::store::{OutputStore, ScratchStore};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// Counters of one matching pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchSummary {
    pub entities: usize,
    pub with_reference: usize,
    pub matched: usize,
    pub invalid_references: usize,
    pub skipped: usize,
}

/// Publishes a copy of the referenced price record for every entity whose
/// `reference_key` tag names a record of `scratch`, and records the claim in
/// `index`.
///
/// The `node` and `way` partitions of `output` are created before the first
/// entity is read. Entities without the tag are ignored; a tag naming an
/// unknown record is logged and skipped.
#[tracing::instrument(skip_all, fields(reference_key = %reference_key))]
pub fn match_entities<I>(
    entities: I,
    reference_key: &str,
    scratch: &ScratchStore,
    output: &OutputStore,
    index: &mut MatchIndex,
) -> Result<MatchSummary>
where
    I: IntoIterator<Item = Result<GeoEntity>>,
{
    output.prepare()?;
    let mut summary = MatchSummary::default();

    for entity in entities {
        let entity = entity?;
        summary.entities += 1;

        let Some(price_id) = entity.cross_reference(reference_key) else {
            continue;
        };
        summary.with_reference += 1;

        if !scratch.contains(price_id) {
            warn!(
                kind = %entity.kind,
                entity_id = %entity.id,
                price_id,
                "openstreetmap object with invalid {reference_key}"
            );
            summary.invalid_references += 1;
            continue;
        }

        if !is_valid_key(&entity.id) {
            warn!(
                kind = %entity.kind,
                entity_id = %entity.id,
                price_id,
                "openstreetmap object id cannot be used as a record key"
            );
            summary.skipped += 1;
            continue;
        }

        output.copy_from(scratch, price_id, entity.kind, &entity.id)?;
        index.claim(price_id, entity.kind, &entity.id);
        summary.matched += 1;
    }

    info!(
        entities = summary.entities,
        with_reference = summary.with_reference,
        matched = summary.matched,
        invalid_references = summary.invalid_references,
        "Openstreetmap objects matched"
    );
    Ok(summary)
}

/// [`match_entities`] over an OpenStreetMap XML file.
pub fn match_osm_file(
    path: &Path,
    reference_key: &str,
    scratch: &ScratchStore,
    output: &OutputStore,
    index: &mut MatchIndex,
) -> Result<MatchSummary> {
    let file = File::open(path).with_context(|| {
        format!(
            "failed to open openstreetmap data file {} for parsing",
            path.display()
        )
    })?;
    let entities = OsmReader::new(BufReader::new(file));
    match_entities(entities, reference_key, scratch, output, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, PriceRecord};
    use std::fs;

    const KEY: &str = "ref:FR:prix-carburants";

    struct Fixture {
        _dir: tempfile::TempDir,
        scratch: ScratchStore,
        output: OutputStore,
    }

    fn fixture(price_ids: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchStore::create(dir.path().join("prices")).unwrap();
        for id in price_ids {
            scratch.write(&PriceRecord::new(*id)).unwrap();
        }
        let output = OutputStore::new(dir.path().join("out"));
        Fixture {
            _dir: dir,
            scratch,
            output,
        }
    }

    fn run(f: &Fixture, osm: &[u8], index: &mut MatchIndex) -> MatchSummary {
        match_entities(OsmReader::new(osm), KEY, &f.scratch, &f.output, index).unwrap()
    }

    #[test]
    fn test_matched_node_gets_identical_copy() {
        let f = fixture(&["12345"]);
        let mut index = MatchIndex::new();
        let osm = br#"<osm><node id="98765" lat="46.2" lon="5.2">
  <tag k="ref:FR:prix-carburants" v="12345"/>
</node></osm>"#;

        let summary = run(&f, osm, &mut index);

        assert_eq!(summary.matched, 1);
        assert_eq!(
            fs::read(f.output.record_path(EntityKind::Node, "98765")).unwrap(),
            fs::read(f.scratch.path("12345")).unwrap()
        );
        assert!(index.is_claimed("12345"));
        assert!(f.scratch.contains("12345"));
    }

    #[test]
    fn test_invalid_reference_creates_nothing() {
        let f = fixture(&["12345"]);
        let mut index = MatchIndex::new();
        let osm = br#"<osm><node id="1"><tag k="ref:FR:prix-carburants" v="99999"/></node></osm>"#;

        let summary = run(&f, osm, &mut index);

        assert_eq!(summary.invalid_references, 1);
        assert_eq!(summary.matched, 0);
        assert!(!f.output.record_path(EntityKind::Node, "1").exists());
        assert!(index.is_empty());
    }

    #[test]
    fn test_two_entities_share_one_record() {
        let f = fixture(&["12345"]);
        let mut index = MatchIndex::new();
        let osm = br#"<osm>
  <node id="1"><tag k="ref:FR:prix-carburants" v="12345"/></node>
  <way id="2"><nd ref="1"/><tag k="ref:FR:prix-carburants" v="12345"/></way>
</osm>"#;

        let summary = run(&f, osm, &mut index);

        assert_eq!(summary.matched, 2);
        assert!(f.output.record_path(EntityKind::Node, "1").is_file());
        assert!(f.output.record_path(EntityKind::Way, "2").is_file());
        assert_eq!(index.len(), 1);
        assert_eq!(index.claims("12345").len(), 2);
    }

    #[test]
    fn test_partitions_exist_without_matches() {
        let f = fixture(&[]);
        let mut index = MatchIndex::new();

        let summary = run(&f, b"<osm/>", &mut index);

        assert_eq!(summary.entities, 0);
        assert!(f.output.root().join("node").is_dir());
        assert!(f.output.root().join("way").is_dir());
    }

    #[test]
    fn test_entities_without_reference_are_ignored() {
        let f = fixture(&["12345"]);
        let mut index = MatchIndex::new();
        let osm = br#"<osm>
  <node id="1"><tag k="amenity" v="fuel"/></node>
  <node id="2"><tag k="ref:FR:prix-carburants" v=""/></node>
  <relation id="3"><tag k="ref:FR:prix-carburants" v="12345"/></relation>
</osm>"#;

        let summary = run(&f, osm, &mut index);

        assert_eq!(summary.entities, 2);
        assert_eq!(summary.with_reference, 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_reference_cannot_escape_scratch_store() {
        let f = fixture(&["12345"]);
        let mut index = MatchIndex::new();
        let osm = br#"<osm><node id="1"><tag k="ref:FR:prix-carburants" v="../prices/12345"/></node></osm>"#;

        let summary = run(&f, osm, &mut index);

        assert_eq!(summary.invalid_references, 1);
        assert!(!f.output.record_path(EntityKind::Node, "1").exists());
    }

    #[test]
    fn test_malformed_osm_is_an_error() {
        let f = fixture(&["12345"]);
        let mut index = MatchIndex::new();

        let result = match_entities(
            OsmReader::new(&b"<osm><node id=\"1\"></way></osm>"[..]),
            KEY,
            &f.scratch,
            &f.output,
            &mut index,
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_match_osm_file() {
        let f = fixture(&["12345"]);
        let mut index = MatchIndex::new();
        let path = f.output.root().with_file_name("osm.xml");
        fs::write(
            &path,
            r#"<osm><way id="7"><tag k="ref:FR:prix-carburants" v="12345"/></way></osm>"#,
        )
        .unwrap();

        let summary = match_osm_file(&path, KEY, &f.scratch, &f.output, &mut index).unwrap();

        assert_eq!(summary.matched, 1);
        assert!(f.output.record_path(EntityKind::Way, "7").is_file());
    }
}
