//! Pull-based readers over the two XML feeds.
//!
//! Both readers are iterators driven by `quick-xml` events: one element is
//! assembled, handed to the caller and dropped before the next one is read,
//! so memory stays bounded by a single record whatever the feed size.
//! The encoding declared by the document (or its BOM) is honoured; attribute
//! values are transcoded to UTF-8 before being interpreted.

mod osm;
mod prices;

pub use osm::{OsmReader, find_runtime_error};
pub use prices::StationReader;

use anyhow::Result;
use quick_xml::encoding::Decoder;
use quick_xml::events::BytesStart;

/// Decoded and unescaped value of attribute `name`, if present.
fn attribute(element: &BytesStart<'_>, name: &str, decoder: Decoder) -> Result<Option<String>> {
    match element.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.decode_and_unescape_value(decoder)?.into_owned())),
        None => Ok(None),
    }
}
