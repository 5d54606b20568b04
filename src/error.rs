//! Fatal conditions of a sync run.
//!
//! Everything else travels as `anyhow::Error` with context; these variants
//! exist so callers and tests can tell the fatal cases apart by downcasting.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("invalid price feed: <pdv> element without mandatory id attribute")]
    MissingStationId,

    #[error("invalid price feed: station id {0:?} cannot be used as a record key")]
    InvalidStationId(String),

    #[error("request to {url} failed with HTTP status {status}")]
    HttpStatus { url: String, status: StatusCode },

    #[error("archive entry {0:?} would be extracted outside of the destination")]
    UnsafeArchiveEntry(String),

    #[error("archive {0} does not contain any XML document")]
    NoFeedInArchive(String),

    #[error("openstreetmap data is incomplete: {0}")]
    IncompleteGeoFeed(String),
}
