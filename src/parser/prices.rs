use super::attribute;
use crate::error::FeedError;
use crate::model::{GasType, PriceObservation, PriceRecord, is_valid_key, parse_update};
use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use std::io::BufRead;
use tracing::warn;

const STATION: &[u8] = b"pdv";
const PRICE: &[u8] = b"prix";

/// Streams the stations (`<pdv>`) of the national price feed.
///
/// Yields one [`PriceRecord`] per station, as soon as its closing tag (or the
/// self-closing form) is read. A station without `id` is a fatal
/// [`FeedError::MissingStationId`] and ends the iteration.
pub struct StationReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    current: Option<PriceRecord>,
    dropped: usize,
    finished: bool,
}

impl<R: BufRead> StationReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            current: None,
            dropped: 0,
            finished: false,
        }
    }

    /// Number of `<prix>` elements discarded so far for lack of a usable value.
    pub fn dropped_prices(&self) -> usize {
        self.dropped
    }

    fn next_station(&mut self) -> Result<Option<PriceRecord>> {
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .with_context(|| {
                    format!(
                        "error decoding price feed near byte {}",
                        self.reader.error_position()
                    )
                })?;
            let decoder = self.reader.decoder();

            match event {
                Event::Start(e) if e.name().as_ref() == STATION => {
                    self.current = Some(open_station(&e, decoder)?);
                }
                Event::Empty(e) if e.name().as_ref() == STATION => {
                    return open_station(&e, decoder).map(Some);
                }
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == PRICE => {
                    if let Some(station) = self.current.as_mut() {
                        match read_price(&e, decoder, &station.id)? {
                            Some(price) => station.prices.push(price),
                            None => self.dropped += 1,
                        }
                    }
                }
                Event::End(e) if e.name().as_ref() == STATION => {
                    if let Some(station) = self.current.take() {
                        return Ok(Some(station));
                    }
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for StationReader<R> {
    type Item = Result<PriceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_station() {
            Ok(Some(station)) => Some(Ok(station)),
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

fn open_station(element: &BytesStart<'_>, decoder: Decoder) -> Result<PriceRecord> {
    let id = attribute(element, "id", decoder)?
        .filter(|id| !id.is_empty())
        .ok_or(FeedError::MissingStationId)?;
    if !is_valid_key(&id) {
        return Err(FeedError::InvalidStationId(id).into());
    }
    Ok(PriceRecord::new(id))
}

/// Reads one `<prix>` element. Returns `None` when the price has no usable
/// value; an unknown label or timestamp only degrades the observation.
fn read_price(
    element: &BytesStart<'_>,
    decoder: Decoder,
    station_id: &str,
) -> Result<Option<PriceObservation>> {
    let label = attribute(element, "nom", decoder)?.unwrap_or_default();

    let raw_value = attribute(element, "valeur", decoder)?;
    let Some(value) = raw_value
        .as_deref()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
    else {
        warn!(
            station_id,
            label = %label,
            value = raw_value.as_deref().unwrap_or(""),
            "Dropping price without a valid value"
        );
        return Ok(None);
    };

    let name = GasType::from_label(&label);
    if !name.is_known() {
        warn!(station_id, label = %label, "Unknown gas type");
    }

    let raw_update = attribute(element, "maj", decoder)?;
    let update = raw_update.as_deref().and_then(parse_update);
    if update.is_none() {
        warn!(
            station_id,
            label = %label,
            update = raw_update.as_deref().unwrap_or(""),
            "Invalid price timestamp"
        );
    }

    Ok(Some(PriceObservation { name, value, update }))
}
