//! Core data types shared between the map subsystem and its collaborators.
//!
//! Location records and country summaries are produced by the dataset
//! collaborator and consumed read-only. Navigation requests flow the other
//! way, from the map to the router.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier of a location record.
///
/// Datasets use both string and numeric ids; numeric ids are kept as their
/// decimal representation so that equality stays exact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LocationId(String);

impl LocationId {
    /// Creates a new location id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LocationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl<'de> Deserialize<'de> for LocationId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Integer(i64),
            Float(f64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Self(s),
            RawId::Integer(n) => Self(n.to_string()),
            RawId::Float(n) => Self(n.to_string()),
        })
    }
}

/// Geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Builds a position from a GeoJSON-ordered `[lng, lat]` pair.
    pub fn from_lng_lat(lng: f64, lat: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.4}, {:.4}]", self.lat, self.lng)
    }
}

/// A location as supplied by the dataset collaborator.
///
/// `coordinates` is kept as raw JSON because datasets disagree on its shape:
/// either a `[lng, lat]` pair or an object with latitude/longitude under one
/// of several field names. The marker layer resolves it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub id: LocationId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub coordinates: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl LocationRecord {
    /// Creates a record with only an id and raw coordinates.
    pub fn new(id: impl Into<LocationId>, coordinates: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            coordinates,
            ..Default::default()
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the brand.
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// The field used for brand detection: the first non-empty of brand,
    /// restaurant, source, provider, falling back to the id.
    pub fn brand_hint(&self) -> &str {
        [&self.brand, &self.restaurant, &self.source, &self.provider]
            .into_iter()
            .flatten()
            .map(|s| s.as_str())
            .find(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.id.as_str())
    }
}

/// External hint naming the marker that should receive focus.
///
/// Either a bare id or any object carrying an `id` field (typically the
/// selected record itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectionId {
    Id(LocationId),
    Record { id: LocationId },
}

impl SelectionId {
    /// The location id this selection refers to.
    pub fn location_id(&self) -> &LocationId {
        match self {
            SelectionId::Id(id) | SelectionId::Record { id } => id,
        }
    }

    /// Exact id equality, regardless of which form the selection took.
    pub fn matches(&self, id: &LocationId) -> bool {
        self.location_id() == id
    }
}

impl From<&str> for SelectionId {
    fn from(s: &str) -> Self {
        SelectionId::Id(LocationId::from(s))
    }
}

impl From<LocationId> for SelectionId {
    fn from(id: LocationId) -> Self {
        SelectionId::Id(id)
    }
}

impl From<&LocationRecord> for SelectionId {
    fn from(record: &LocationRecord) -> Self {
        SelectionId::Record {
            id: record.id.clone(),
        }
    }
}

/// Pre-processed per-country summary used for the secondary marker set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountrySummary {
    /// Short id used for routing (`usa`, `uk`, `india`)
    pub id: String,

    /// Display name (`United States`)
    #[serde(alias = "country")]
    pub name: String,

    #[serde(default)]
    pub total_items: u32,

    /// Item counts keyed by menu category
    #[serde(default)]
    pub categories: BTreeMap<String, u32>,

    /// Optional `[lng, lat]` marker position; derived from the boundary
    /// overlay when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,
}

impl CountrySummary {
    pub fn center(&self) -> Option<LatLng> {
        self.center
            .map(|[lng, lat]| LatLng::from_lng_lat(lng, lat))
            .filter(LatLng::is_finite)
    }
}

/// Request emitted to the router when a popup call-to-action is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NavigationRequest {
    /// Open the detail view of a single location
    Location { location_id: LocationId },
    /// Open the menu analysis of a country
    CountryAnalysis { country_id: String },
}

impl NavigationRequest {
    /// Router path for this request.
    pub fn route(&self) -> String {
        match self {
            NavigationRequest::Location { location_id } => format!("/locations/{}", location_id),
            NavigationRequest::CountryAnalysis { country_id } => {
                format!("/analysis/{}", country_id.to_lowercase())
            }
        }
    }
}
