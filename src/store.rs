//! On-disk record stores.
//!
//! Both stores keep one file per record, named after its key:
//! `<scratch>/<price id>` for the run-scoped scratch store and
//! `<output>/<kind>/<entity id>` for the published tree the lookup service
//! reads.

use crate::model::{EntityKind, PriceRecord, is_valid_key};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Price records keyed by their price feed id, valid for one run.
#[derive(Debug, Clone)]
pub struct ScratchStore {
    dir: PathBuf,
}

impl ScratchStore {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create prices folder {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    /// Serializes `record` to its file, replacing any previous record with
    /// the same id.
    pub fn write(&self, record: &PriceRecord) -> Result<()> {
        let data = serde_json::to_vec(record)
            .with_context(|| format!("failed to serialize station {}", record.id))?;
        let path = self.path(&record.id);
        fs::write(&path, data)
            .with_context(|| format!("failed to write station data to file {}", path.display()))
    }

    pub fn contains(&self, id: &str) -> bool {
        is_valid_key(id) && self.path(id).is_file()
    }

    /// Every stored id, sorted.
    pub fn ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list prices folder {}", self.dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// The published `<kind>/<id>` tree.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, kind: EntityKind, id: &str) -> PathBuf {
        self.root.join(kind.as_str()).join(id)
    }

    /// Deletes the previous generation: everything below the root goes, the
    /// root itself is kept (and created when missing).
    pub fn reset(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create output folder {}", self.root.display()))?;

        for entry in fs::read_dir(&self.root).with_context(|| {
            format!(
                "failed to list content of output folder {} for cleaning",
                self.root.display()
            )
        })? {
            let entry = entry?;
            let path = entry.path();
            let removed = if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.with_context(|| format!("failed to remove {}", path.display()))?;
        }

        debug!(root = %self.root.display(), "Output folder cleared");
        Ok(())
    }

    /// Creates one partition per entity kind, so a kind without any match
    /// still shows up as an empty folder.
    pub fn prepare(&self) -> Result<()> {
        for kind in EntityKind::ALL {
            let dir = self.root.join(kind.as_str());
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Copies the scratch record `price_id` to `<kind>/<entity_id>`. The
    /// scratch file stays in place for further claims.
    pub fn copy_from(
        &self,
        scratch: &ScratchStore,
        price_id: &str,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<()> {
        let src = scratch.path(price_id);
        let dst = self.record_path(kind, entity_id);
        fs::copy(&src, &dst)
            .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> PriceRecord {
        PriceRecord::new(id)
    }

    #[test]
    fn test_scratch_write_and_contains() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchStore::create(dir.path().join("prices")).unwrap();

        scratch.write(&record("12345")).unwrap();

        assert!(scratch.contains("12345"));
        assert!(!scratch.contains("99999"));
        assert_eq!(
            fs::read_to_string(scratch.path("12345")).unwrap(),
            r#"{"id":"12345","prices":[]}"#
        );
    }

    #[test]
    fn test_scratch_contains_rejects_paths() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchStore::create(dir.path().join("prices")).unwrap();
        fs::write(dir.path().join("outside"), "{}").unwrap();

        assert!(!scratch.contains("../outside"));
        assert!(!scratch.contains(".."));
        assert!(!scratch.contains(""));
    }

    #[test]
    fn test_scratch_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchStore::create(dir.path()).unwrap();
        let mut second = record("1");
        second.prices.push(crate::model::PriceObservation {
            name: crate::model::GasType::E10,
            value: 1.5,
            update: None,
        });

        scratch.write(&record("1")).unwrap();
        scratch.write(&second).unwrap();

        let stored: PriceRecord =
            serde_json::from_slice(&fs::read(scratch.path("1")).unwrap()).unwrap();
        assert_eq!(stored, second);
    }

    #[test]
    fn test_scratch_ids_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchStore::create(dir.path()).unwrap();
        for id in ["30", "10", "20"] {
            scratch.write(&record(id)).unwrap();
        }

        assert_eq!(scratch.ids().unwrap(), vec!["10", "20", "30"]);
    }

    #[test]
    fn test_output_reset_removes_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputStore::new(dir.path().join("out"));
        output.prepare().unwrap();
        fs::write(output.record_path(EntityKind::Way, "1"), "{}").unwrap();
        fs::write(output.root().join("stray.txt"), "x").unwrap();

        output.reset().unwrap();

        assert!(output.root().is_dir());
        assert_eq!(fs::read_dir(output.root()).unwrap().count(), 0);
    }

    #[test]
    fn test_output_reset_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputStore::new(dir.path().join("new/out"));

        output.reset().unwrap();

        assert!(output.root().is_dir());
    }

    #[test]
    fn test_prepare_creates_both_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputStore::new(dir.path());

        output.prepare().unwrap();

        assert!(dir.path().join("node").is_dir());
        assert!(dir.path().join("way").is_dir());
    }

    #[test]
    fn test_copy_keeps_scratch_record() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchStore::create(dir.path().join("prices")).unwrap();
        let output = OutputStore::new(dir.path().join("out"));
        output.prepare().unwrap();
        scratch.write(&record("12345")).unwrap();

        output
            .copy_from(&scratch, "12345", EntityKind::Node, "1")
            .unwrap();
        output
            .copy_from(&scratch, "12345", EntityKind::Way, "2")
            .unwrap();

        let original = fs::read(scratch.path("12345")).unwrap();
        assert_eq!(
            fs::read(output.record_path(EntityKind::Node, "1")).unwrap(),
            original
        );
        assert_eq!(
            fs::read(output.record_path(EntityKind::Way, "2")).unwrap(),
            original
        );
    }
}
