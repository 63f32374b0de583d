use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

mod region;

pub use region::{Region, RegionError};

/// TrackedEntity is one positioned vessel as delivered by either transport.
///
/// Entities are immutable snapshots: a new batch replaces the previous list
/// wholesale, nothing is patched in place. Coordinates are tolerated in any
/// shape the backend sends (number, numeric string, null, garbage) and decode
/// to `None` when unusable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntity {
    /// Stable identifier (string or number on the wire)
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub latitude: Option<f64>,

    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub longitude: Option<f64>,

    /// Vessel category (e.g. "tanker", "lng_carrier")
    #[serde(
        default,
        rename = "type",
        alias = "vesselType",
        alias = "vessel_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cargo: Option<String>,

    /// Remaining descriptive metadata (speed, destination, imo, ...)
    #[serde(flatten, default)]
    pub extra: Map<String, Value>,
}

/// Validated geographic position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    /// Returns a position only for finite, in-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }
}

impl TrackedEntity {
    /// Create an entity with just an id and coordinates.
    pub fn new(id: impl Into<String>, latitude: Option<f64>, longitude: Option<f64>) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
            category: None,
            name: None,
            flag: None,
            cargo: None,
            extra: Map::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Map-ready position, if the entity has one.
    pub fn position(&self) -> Option<Position> {
        Position::new(self.latitude?, self.longitude?)
    }

    /// Category used for grouping; entities without one fall under "unknown".
    pub fn category_or_unknown(&self) -> &str {
        self.category.as_deref().unwrap_or("unknown")
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "entity id must be a string or number, got {}",
            other
        ))),
    }
}

fn lenient_coordinate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}
