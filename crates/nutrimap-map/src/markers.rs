//! Marker layer built from the location dataset.
//!
//! The layer is rebuilt in full whenever the locations or the selection
//! change: cleared, refilled with one marker per location whose coordinates
//! resolve, and then focused on the selected marker if there is one. There is
//! no incremental diffing, so identical inputs always converge to the same
//! layer.

use crate::bridge::{NavigationBridge, PopupKey};
use crate::surface::{LayerId, LayerKind, MapSurface, MarkerId, SurfaceHandle};
use nutrimap_core::{LatLng, LocationId, LocationRecord, MapError, SelectionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

const LATITUDE_KEYS: [&str; 3] = ["lat", "latitude", "y"];
const LONGITUDE_KEYS: [&str; 4] = ["lng", "lon", "longitude", "x"];

/// Restaurant brands with dedicated marker artwork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Brand {
    McDonalds,
    BurgerKing,
    Kfc,
    Wendys,
}

impl Brand {
    /// Detection order matters: the first brand with a matching pattern wins.
    const ALL: [Brand; 4] = [Brand::McDonalds, Brand::BurgerKing, Brand::Kfc, Brand::Wendys];

    fn patterns(self) -> &'static [&'static str] {
        match self {
            Brand::McDonalds => &["mcdonald", "mcd"],
            Brand::BurgerKing => &["burger king", "burger-king", "burgerking", "bk"],
            Brand::Kfc => &["kfc"],
            Brand::Wendys => &["wendy"],
        }
    }

    /// Short id used for asset names.
    pub fn id(self) -> &'static str {
        match self {
            Brand::McDonalds => "mcd",
            Brand::BurgerKing => "bk",
            Brand::Kfc => "kfc",
            Brand::Wendys => "wendys",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Brand::McDonalds => "McDonald's",
            Brand::BurgerKing => "Burger King",
            Brand::Kfc => "KFC",
            Brand::Wendys => "Wendy's",
        }
    }

    pub fn image_path(self) -> String {
        format!("/images/{}.png", self.id())
    }

    /// Substring match on the lower-cased hint.
    pub fn detect(hint: &str) -> Option<Brand> {
        let hint = hint.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|brand| brand.patterns().iter().any(|p| hint.contains(p)))
    }
}

/// Visual representation of a marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Icon {
    /// Brand artwork
    Brand {
        brand: Brand,
        image: String,
        size: [u32; 2],
    },
    /// Generic coloured pin
    Glyph { color: String },
}

impl Icon {
    pub fn brand(brand: Brand) -> Self {
        Icon::Brand {
            brand,
            image: brand.image_path(),
            size: [36, 36],
        }
    }

    pub fn glyph(color: impl Into<String>) -> Self {
        Icon::Glyph {
            color: color.into(),
        }
    }
}

/// Call-to-action control embedded in a popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupAction {
    pub label: String,
    /// Identifies the control; the bridge binding uses the same key
    pub key: PopupKey,
}

/// Structured popup content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupContent {
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<PopupAction>,
}

/// One marker as handed to the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub key: PopupKey,
    pub position: LatLng,
    pub icon: Icon,
    pub popup: PopupContent,
}

impl MarkerRecord {
    /// The location this marker was derived from, for location markers.
    pub fn location_id(&self) -> Option<&LocationId> {
        match &self.key {
            PopupKey::Location(id) => Some(id),
            PopupKey::Country(_) => None,
        }
    }
}

/// Summary of one rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildOutcome {
    pub rendered: usize,
    pub skipped: usize,
    pub focused: Option<LocationId>,
}

fn coerce(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn first_present<'a>(object: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| object.get(*k))
        .find(|v| !v.is_null())
}

/// Resolves a record's coordinates to a finite position.
///
/// Accepts a `[lng, lat]` pair or an object with latitude under `lat`,
/// `latitude` or `y` and longitude under `lng`, `lon`, `longitude` or `x`.
/// Numeric strings are coerced.
pub fn resolve_position(record: &LocationRecord) -> Result<LatLng, MapError> {
    let invalid = |reason: &str| MapError::invalid_coordinates(record.id.as_str(), reason);

    let (lng, lat) = match &record.coordinates {
        Value::Array(pair) if pair.len() >= 2 => (coerce(&pair[0]), coerce(&pair[1])),
        Value::Array(_) => return Err(invalid("coordinate pair needs two values")),
        Value::Object(object) => (
            first_present(object, &LONGITUDE_KEYS).and_then(coerce),
            first_present(object, &LATITUDE_KEYS).and_then(coerce),
        ),
        Value::Null => return Err(invalid("missing coordinates")),
        _ => return Err(invalid("unsupported coordinate shape")),
    };

    match (lat, lng) {
        (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Ok(LatLng::new(lat, lng)),
        _ => Err(invalid("latitude or longitude is not a finite number")),
    }
}

/// Popup for a location marker.
pub fn location_popup(record: &LocationRecord) -> PopupContent {
    let title = record
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| record.id.to_string());

    PopupContent {
        title,
        lines: record.description.iter().cloned().collect(),
        action: Some(PopupAction {
            label: "View nutrition".to_string(),
            key: PopupKey::Location(record.id.clone()),
        }),
    }
}

#[derive(Debug)]
struct PlacedMarker {
    id: MarkerId,
    record: MarkerRecord,
}

/// Owns the location marker layer on the surface.
pub struct MarkerLayerManager {
    surface: SurfaceHandle,
    bridge: NavigationBridge,
    glyph_color: String,
    layer: Option<LayerId>,
    placed: Vec<PlacedMarker>,
    locations: Vec<LocationRecord>,
    selection: Option<SelectionId>,
}

impl MarkerLayerManager {
    pub fn new(surface: SurfaceHandle, bridge: NavigationBridge, glyph_color: impl Into<String>) -> Self {
        Self {
            surface,
            bridge,
            glyph_color: glyph_color.into(),
            layer: None,
            placed: Vec::new(),
            locations: Vec::new(),
            selection: None,
        }
    }

    /// Replaces the location dataset and rebuilds.
    pub fn set_locations(&mut self, locations: Vec<LocationRecord>) -> Option<RebuildOutcome> {
        self.locations = locations;
        self.rebuild()
    }

    /// Replaces the selection and rebuilds.
    pub fn set_selection(&mut self, selection: Option<SelectionId>) -> Option<RebuildOutcome> {
        self.selection = selection;
        self.rebuild()
    }

    pub fn locations(&self) -> &[LocationRecord] {
        &self.locations
    }

    pub fn selection(&self) -> Option<&SelectionId> {
        self.selection.as_ref()
    }

    /// Number of markers currently on the layer.
    pub fn marker_count(&self) -> usize {
        self.placed.len()
    }

    /// Markers currently on the layer, in dataset order.
    pub fn markers(&self) -> impl Iterator<Item = &MarkerRecord> {
        self.placed.iter().map(|p| &p.record)
    }

    /// Icon for a record: brand artwork when the brand hint matches, the
    /// generic glyph otherwise.
    pub fn icon_for(&self, record: &LocationRecord) -> Icon {
        match Brand::detect(record.brand_hint()) {
            Some(brand) => Icon::brand(brand),
            None => Icon::glyph(self.glyph_color.clone()),
        }
    }

    /// Rebuilds the whole layer from the current inputs.
    ///
    /// Returns `None` without touching anything when no surface is live.
    pub fn rebuild(&mut self) -> Option<RebuildOutcome> {
        let surface = self.surface.clone();
        let outcome = surface.with(|s| self.rebuild_on(s));
        if outcome.is_none() {
            trace!("Marker rebuild skipped: no surface");
        }
        outcome
    }

    fn rebuild_on(&mut self, surface: &mut dyn MapSurface) -> RebuildOutcome {
        let layer = match self.layer {
            Some(layer) => {
                surface.clear_layer(layer);
                layer
            }
            None => {
                let layer = surface.add_layer_group(LayerKind::Markers);
                self.layer = Some(layer);
                layer
            }
        };

        self.placed.clear();
        self.bridge.release_where(PopupKey::is_location);

        let mut outcome = RebuildOutcome::default();

        for record in &self.locations {
            let position = match resolve_position(record) {
                Ok(position) => position,
                Err(e) => {
                    debug!(error = %e, "Skipping location");
                    outcome.skipped += 1;
                    continue;
                }
            };

            let marker = MarkerRecord {
                key: PopupKey::Location(record.id.clone()),
                position,
                icon: self.icon_for(record),
                popup: location_popup(record),
            };

            let request = marker.popup.action.as_ref().map(|a| a.key.navigation_request());
            self.bridge.register(marker.key.clone(), request);

            let id = surface.add_marker(layer, &marker);
            self.placed.push(PlacedMarker { id, record: marker });
            outcome.rendered += 1;
        }

        if let Some(selection) = &self.selection {
            match self
                .placed
                .iter()
                .find(|p| p.record.location_id().is_some_and(|id| selection.matches(id)))
            {
                Some(placed) => {
                    surface.open_popup(placed.id);
                    self.bridge.popup_opened_quiet(&placed.record.key);
                    surface.pan_to(placed.record.position);
                    outcome.focused = Some(selection.location_id().clone());
                }
                None => {
                    debug!(selection = %selection.location_id(), "Selection has no marker");
                }
            }
        }

        surface.invalidate_size();

        debug!(
            rendered = outcome.rendered,
            skipped = outcome.skipped,
            "Marker layer rebuilt"
        );
        outcome
    }

    /// Forwards a popup-open reported by the surface to the bridge.
    pub fn popup_opened(&self, key: &PopupKey) {
        if !self.placed.iter().any(|p| &p.record.key == key) {
            debug!(popup = %key, "Popup opened for a marker not on the layer");
            return;
        }
        self.bridge.popup_opened_quiet(key);
    }

    /// Forgets the layer; called when the surface is torn down.
    pub fn detach(&mut self) {
        self.layer = None;
        self.placed.clear();
        self.bridge.release_where(PopupKey::is_location);
    }
}
