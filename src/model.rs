//! Records shared by the extraction and matching stages.
//!
//! A [`PriceRecord`] is what ends up on disk, once in the scratch store under
//! the price feed id and once per claiming map entity in the output store.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp layouts found in the `maj` attribute of the price feed.
const UPDATE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Fuel grade of a price observation.
///
/// Labels outside the known vocabulary are kept as [`GasType::Unknown`] and
/// serialized as `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GasType {
    Diesel,
    E10,
    E85,
    Octane95,
    Octane98,
    Lpg,
    Unknown(String),
}

impl GasType {
    /// Resolves a label as written in the price feed (`Gazole`, `SP95`, ...).
    pub fn from_label(label: &str) -> Self {
        match label {
            "Gazole" => Self::Diesel,
            "E10" => Self::E10,
            "E85" => Self::E85,
            "SP95" => Self::Octane95,
            "SP98" => Self::Octane98,
            "GPLc" => Self::Lpg,
            other => Self::Unknown(other.to_string()),
        }
    }

    fn from_canonical(name: &str) -> Self {
        match name {
            "diesel" => Self::Diesel,
            "e10" => Self::E10,
            "e85" => Self::E85,
            "octane_95" => Self::Octane95,
            "octane_98" => Self::Octane98,
            "lpg" => Self::Lpg,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn canonical_name(&self) -> &'static str {
        match self {
            Self::Diesel => "diesel",
            Self::E10 => "e10",
            Self::E85 => "e85",
            Self::Octane95 => "octane_95",
            Self::Octane98 => "octane_98",
            Self::Lpg => "lpg",
            Self::Unknown(_) => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl Serialize for GasType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.canonical_name())
    }
}

impl<'de> Deserialize<'de> for GasType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_canonical(&name))
    }
}

/// One fuel price of a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub name: GasType,
    pub value: f64,
    pub update: Option<NaiveDateTime>,
}

/// All prices published for one station of the price feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub id: String,
    pub prices: Vec<PriceObservation>,
}

impl PriceRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prices: Vec::new(),
        }
    }
}

/// Parses a `maj` timestamp, returning `None` when no known layout matches.
pub fn parse_update(raw: &str) -> Option<NaiveDateTime> {
    UPDATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw.trim(), format).ok())
}

/// OpenStreetMap element types that can carry a price cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Node,
    Way,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Node, EntityKind::Way];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
        }
    }

    /// Maps an XML element name to a kind; other elements are not entities.
    pub fn from_element(name: &[u8]) -> Option<Self> {
        match name {
            b"node" => Some(Self::Node),
            b"way" => Some(Self::Way),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A map feature read from the geographic feed.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoEntity {
    pub id: String,
    pub kind: EntityKind,
    /// `(lat, lon)`; ways returned without geometry have none.
    pub coordinates: Option<(f64, f64)>,
    pub tags: BTreeMap<String, String>,
}

impl GeoEntity {
    /// Value of the cross-reference tag `key`, if present and non-empty.
    pub fn cross_reference(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Whether `key` can be used as a single file name inside a store.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key != "." && key != ".." && !key.contains(['/', '\\', '\0'])
}
