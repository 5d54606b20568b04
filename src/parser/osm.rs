use super::attribute;
use crate::model::{EntityKind, GeoEntity};
use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use std::io::BufRead;
use tracing::{debug, warn};

const TAG: &[u8] = b"tag";
const REMARK: &[u8] = b"remark";
const RUNTIME_ERROR: &str = "runtime error";

/// Streams the nodes and ways of an OpenStreetMap XML document, such as an
/// Overpass API response.
///
/// Relations and any other element are skipped together with their tags.
/// When a key appears twice on one element the last value wins.
pub struct OsmReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    current: Option<GeoEntity>,
    in_remark: bool,
    finished: bool,
}

impl<R: BufRead> OsmReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            current: None,
            in_remark: false,
            finished: false,
        }
    }

    fn next_entity(&mut self) -> Result<Option<GeoEntity>> {
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .with_context(|| {
                    format!(
                        "error decoding openstreetmap data near byte {}",
                        self.reader.error_position()
                    )
                })?;
            let decoder = self.reader.decoder();

            match event {
                Event::Start(e) => {
                    if let Some(kind) = EntityKind::from_element(e.name().as_ref()) {
                        self.current = open_entity(&e, kind, decoder)?;
                    } else if e.name().as_ref() == TAG {
                        add_tag(self.current.as_mut(), &e, decoder)?;
                    } else if e.name().as_ref() == REMARK {
                        self.in_remark = true;
                    }
                }
                Event::Empty(e) => {
                    if let Some(kind) = EntityKind::from_element(e.name().as_ref()) {
                        if let Some(entity) = open_entity(&e, kind, decoder)? {
                            return Ok(Some(entity));
                        }
                    } else if e.name().as_ref() == TAG {
                        add_tag(self.current.as_mut(), &e, decoder)?;
                    }
                }
                Event::Text(text) if self.in_remark => {
                    let remark = decoder.decode(&text).unwrap_or_default();
                    warn!(remark = %remark.trim(), "Overpass API remark, results may be incomplete");
                }
                Event::End(e) => {
                    if e.name().as_ref() == REMARK {
                        self.in_remark = false;
                    } else if let Some(kind) = EntityKind::from_element(e.name().as_ref()) {
                        if let Some(entity) = self.current.take() {
                            if entity.kind == kind {
                                return Ok(Some(entity));
                            }
                        }
                    }
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for OsmReader<R> {
    type Item = Result<GeoEntity>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_entity() {
            Ok(Some(entity)) => Some(Ok(entity)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Adds a `<tag k v/>` to the entity being read; tags outside of a node or
/// way are dropped.
fn add_tag(
    entity: Option<&mut GeoEntity>,
    element: &BytesStart<'_>,
    decoder: Decoder,
) -> Result<()> {
    let Some(entity) = entity else {
        return Ok(());
    };
    let Some(key) = attribute(element, "k", decoder)? else {
        return Ok(());
    };
    let value = attribute(element, "v", decoder)?.unwrap_or_default();

    match entity.tags.get(&key) {
        Some(previous) if *previous != value => {
            warn!(
                kind = %entity.kind,
                entity_id = %entity.id,
                key = %key,
                discarded = %previous,
                "Duplicate tag key, keeping the last value"
            );
        }
        _ => {}
    }
    entity.tags.insert(key, value);
    Ok(())
}

fn open_entity(
    element: &BytesStart<'_>,
    kind: EntityKind,
    decoder: Decoder,
) -> Result<Option<GeoEntity>> {
    let Some(id) = attribute(element, "id", decoder)?.filter(|id| !id.is_empty()) else {
        debug!(%kind, "Skipping openstreetmap element without id");
        return Ok(None);
    };

    let lat = attribute(element, "lat", decoder)?.and_then(|v| v.parse::<f64>().ok());
    let lon = attribute(element, "lon", decoder)?.and_then(|v| v.parse::<f64>().ok());

    Ok(Some(GeoEntity {
        id,
        kind,
        coordinates: lat.zip(lon),
        tags: BTreeMap::new(),
    }))
}

/// Scans a whole OpenStreetMap document for an Overpass `<remark>` reporting
/// a runtime error, and returns its text.
///
/// Overpass answers a query that timed out or ran out of memory with
/// `200 OK` and whatever part of the result it had produced, possibly none.
pub fn find_runtime_error<R: BufRead>(source: R) -> Result<Option<String>> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut in_remark = false;

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf).with_context(|| {
            format!(
                "error decoding openstreetmap data near byte {}",
                reader.error_position()
            )
        })?;

        match event {
            Event::Start(e) if e.name().as_ref() == REMARK => in_remark = true,
            Event::End(e) if e.name().as_ref() == REMARK => in_remark = false,
            Event::Text(text) if in_remark => {
                let remark = reader.decoder().decode(&text).unwrap_or_default();
                let remark = remark.trim();
                if remark.starts_with(RUNTIME_ERROR) {
                    return Ok(Some(remark.to_string()));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}
