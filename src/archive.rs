//! Unpacking of the downloaded price feed.
//!
//! The national feed is published as a zip holding a single XML document;
//! mirrors sometimes serve it gzip-compressed or as plain XML. The format is
//! sniffed from the leading bytes rather than trusted from a file name.

use crate::error::FeedError;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const INFLATED_FEED_NAME: &str = "price_feed.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Gzip,
    Plain,
}

/// Identifies the container format of `path` from its magic bytes.
pub fn detect_format(path: &Path) -> Result<ArchiveFormat> {
    let mut head = Vec::with_capacity(ZIP_MAGIC.len());
    File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .take(ZIP_MAGIC.len() as u64)
        .read_to_end(&mut head)?;

    Ok(if head.starts_with(ZIP_MAGIC) {
        ArchiveFormat::Zip
    } else if head.starts_with(GZIP_MAGIC) {
        ArchiveFormat::Gzip
    } else {
        ArchiveFormat::Plain
    })
}

/// Returns the path of the XML price feed contained in `path`, unpacking it
/// into `dest_dir` when it is archived.
#[tracing::instrument(skip_all, fields(path = %path.display(), dest_dir = %dest_dir.display()))]
pub fn unpack_price_feed(path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let format = detect_format(path)?;
    debug!(?format, "Price feed container detected");

    match format {
        ArchiveFormat::Zip => unzip(path, dest_dir)?
            .into_iter()
            .find(|p| is_xml(p))
            .ok_or_else(|| FeedError::NoFeedInArchive(path.display().to_string()).into()),
        ArchiveFormat::Gzip => {
            let target = dest_dir.join(INFLATED_FEED_NAME);
            let mut decoder = GzDecoder::new(
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
            );
            let mut out = File::create(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
            io::copy(&mut decoder, &mut out)
                .with_context(|| format!("failed to inflate {}", path.display()))?;
            Ok(target)
        }
        ArchiveFormat::Plain => Ok(path.to_path_buf()),
    }
}

/// Extracts every entry of the zip at `path` into `dest_dir`.
///
/// All entry names are checked before anything is written: a single entry
/// that would land outside `dest_dir` fails the whole extraction.
pub fn unzip(path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(path).with_context(|| format!("failed to open zip file {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("failed to read zip file {}", path.display()))?;

    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if entry.enclosed_name().is_none() {
            return Err(FeedError::UnsafeArchiveEntry(entry.name().to_string()).into());
        }
    }

    let mut extracted = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(FeedError::UnsafeArchiveEntry(entry.name().to_string()).into());
        };
        let target = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create folder {}", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create folder {}", parent.display()))?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("failed to open file {} for writing", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to extract {}", entry.name()))?;

        extracted.push(target);
    }

    info!(entries = extracted.len(), "Archive extracted");
    Ok(extracted)
}

fn is_xml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xml"))
}
