//! Country boundary overlay.
//!
//! One fetch of a GeoJSON FeatureCollection per surface. Each feature is
//! styled by whether its normalized name is in the [`HighlightSet`], and the
//! styled overlay is placed at the bottom of the overlay pane: above tiles,
//! below markers. Any failure abandons the overlay and leaves the rest of the
//! map alone.

use crate::bridge::NavigationBridge;
use crate::summary::{self, SummarySource};
use crate::surface::{LayerId, LayerKind, SurfaceHandle};
use async_trait::async_trait;
use geojson::{FeatureCollection, GeoJson, Geometry, JsonObject};
use nutrimap_core::error::OverlayError;
use nutrimap_core::LatLng;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Property keys checked, in order, for a feature's display name.
pub const NAME_PROPERTIES: [&str; 3] = ["ADMIN", "NAME", "name"];

/// Normalizes a country name for highlight matching.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalized country names that receive highlighted styling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightSet(HashSet<String>);

impl HighlightSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(names.into_iter().map(|n| normalize_name(n.as_ref())).collect())
    }

    /// Membership after normalizing `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Stroke and fill of one boundary polygon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureStyle {
    pub color: &'static str,
    pub weight: f32,
    pub fill_color: &'static str,
    pub fill_opacity: f32,
    pub interactive: bool,
}

impl FeatureStyle {
    pub const HIGHLIGHTED: FeatureStyle = FeatureStyle {
        color: "#b30000",
        weight: 1.2,
        fill_color: "#d9534f",
        fill_opacity: 0.28,
        interactive: false,
    };

    pub const DEFAULT: FeatureStyle = FeatureStyle {
        color: "#666",
        weight: 0.6,
        fill_color: "#000000",
        fill_opacity: 0.0,
        interactive: false,
    };
}

/// A boundary feature with its resolved style.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledFeature {
    pub name: Option<String>,
    pub highlighted: bool,
    pub style: FeatureStyle,
    pub geometry: Geometry,
}

/// The styled overlay handed to the surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyledOverlay {
    pub features: Vec<StyledFeature>,
}

impl StyledOverlay {
    pub fn highlighted_names(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter(|f| f.highlighted)
            .filter_map(|f| f.name.as_deref())
            .collect()
    }

    /// The feature whose normalized name equals `name`.
    pub fn find(&self, name: &str) -> Option<&StyledFeature> {
        let needle = normalize_name(name);
        self.features
            .iter()
            .find(|f| f.name.as_deref().map(normalize_name).as_deref() == Some(needle.as_str()))
    }
}

/// Display name of a feature: the first present of `ADMIN`, `NAME`, `name`.
pub fn feature_name(properties: Option<&JsonObject>) -> Option<String> {
    let properties = properties?;
    NAME_PROPERTIES.iter().find_map(|key| match properties.get(*key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Styling decision for one feature name.
pub fn style_for(name: Option<&str>, highlight: &HighlightSet) -> (bool, FeatureStyle) {
    let highlighted = name.map(|n| highlight.contains(n)).unwrap_or(false);
    let style = if highlighted {
        FeatureStyle::HIGHLIGHTED
    } else {
        FeatureStyle::DEFAULT
    };
    (highlighted, style)
}

/// Styles every feature of a collection.
///
/// Features without a geometry cannot be drawn and are skipped.
pub fn style_features(collection: FeatureCollection, highlight: &HighlightSet) -> StyledOverlay {
    let features = collection
        .features
        .into_iter()
        .enumerate()
        .filter_map(|(index, feature)| {
            let name = feature_name(feature.properties.as_ref());
            let Some(geometry) = feature.geometry else {
                debug!(index, name = ?name, "Skipping boundary feature without geometry");
                return None;
            };
            let (highlighted, style) = style_for(name.as_deref(), highlight);
            Some(StyledFeature {
                name,
                highlighted,
                style,
                geometry,
            })
        })
        .collect();

    StyledOverlay { features }
}

/// Parses a boundary dataset.
pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection, OverlayError> {
    match text.parse::<GeoJson>() {
        Ok(GeoJson::FeatureCollection(fc)) => Ok(fc),
        Ok(GeoJson::Feature(_)) => Err(OverlayError::NotAFeatureCollection {
            found: "Feature".to_string(),
        }),
        Ok(GeoJson::Geometry(_)) => Err(OverlayError::NotAFeatureCollection {
            found: "Geometry".to_string(),
        }),
        Err(e) => Err(OverlayError::malformed(e.to_string())),
    }
}

/// Center of the bounding box of a polygon geometry.
pub fn bbox_center(geometry: &Geometry) -> Option<LatLng> {
    fn visit(value: &geojson::Value, out: &mut Vec<(f64, f64)>) {
        let mut push_ring = |ring: &Vec<Vec<f64>>| {
            out.extend(ring.iter().filter(|p| p.len() >= 2).map(|p| (p[0], p[1])));
        };
        match value {
            geojson::Value::Polygon(rings) => rings.iter().for_each(&mut push_ring),
            geojson::Value::MultiPolygon(polygons) => {
                polygons.iter().flatten().for_each(&mut push_ring)
            }
            geojson::Value::GeometryCollection(geometries) => {
                for g in geometries {
                    visit(&g.value, out);
                }
            }
            _ => {}
        }
    }

    let mut points = Vec::new();
    visit(&geometry.value, &mut points);

    let (first_lng, first_lat) = *points.first()?;
    let (min_lng, max_lng, min_lat, max_lat) = points.iter().fold(
        (first_lng, first_lng, first_lat, first_lat),
        |(min_lng, max_lng, min_lat, max_lat), &(lng, lat)| {
            (min_lng.min(lng), max_lng.max(lng), min_lat.min(lat), max_lat.max(lat))
        },
    );

    Some(LatLng::new((min_lat + max_lat) / 2.0, (min_lng + max_lng) / 2.0)).filter(LatLng::is_finite)
}

/// Source of the boundary dataset.
#[async_trait]
pub trait BoundarySource: Send + Sync {
    /// Fetches the FeatureCollection.
    async fn fetch(&self) -> Result<FeatureCollection, OverlayError>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// Fetches boundaries over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBoundarySource {
    client: reqwest::Client,
    url: String,
}

impl HttpBoundarySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Uses a preconfigured client (proxies, user agent).
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl BoundarySource for HttpBoundarySource {
    async fn fetch(&self) -> Result<FeatureCollection, OverlayError> {
        let fetch_err = |e: reqwest::Error| OverlayError::Fetch {
            url: self.url.clone(),
            reason: e.to_string(),
        };

        let response = self.client.get(&self.url).send().await.map_err(fetch_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(OverlayError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(fetch_err)?;
        parse_feature_collection(&body)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Progress of the overlay for one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPhase {
    /// Not started or still loading
    Pending,
    /// Boundaries are on the surface
    Attached,
    /// Given up; the map works without boundaries
    Abandoned,
    /// The surface went away before the overlay could be attached
    Cancelled,
}

impl OverlayPhase {
    pub fn is_settled(self) -> bool {
        !matches!(self, OverlayPhase::Pending)
    }
}

#[derive(Debug, Default)]
struct OverlayLayers {
    boundaries: Option<LayerId>,
    summaries: Option<LayerId>,
    overlay: Option<StyledOverlay>,
}

/// Layers owned by the overlay loader, shared with the controller so it can
/// remove them before tearing the surface down.
#[derive(Debug, Clone)]
pub struct OverlaySlot {
    layers: Arc<Mutex<OverlayLayers>>,
    phase: Arc<watch::Sender<OverlayPhase>>,
}

impl Default for OverlaySlot {
    fn default() -> Self {
        let (phase, _) = watch::channel(OverlayPhase::Pending);
        Self {
            layers: Arc::new(Mutex::new(OverlayLayers::default())),
            phase: Arc::new(phase),
        }
    }
}

impl OverlaySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> OverlayPhase {
        *self.phase.borrow()
    }

    /// Waits until the overlay has attached, been abandoned or cancelled.
    pub async fn settled(&self) -> OverlayPhase {
        let mut rx = self.phase.subscribe();
        let settled = rx.wait_for(|phase| phase.is_settled()).await.map(|phase| *phase);
        settled.unwrap_or_else(|_| self.phase())
    }

    pub fn boundaries(&self) -> Option<LayerId> {
        self.layers.lock().boundaries
    }

    pub fn summaries(&self) -> Option<LayerId> {
        self.layers.lock().summaries
    }

    /// The overlay currently on the surface, if any.
    pub fn styled(&self) -> Option<StyledOverlay> {
        self.layers.lock().overlay.clone()
    }

    pub(crate) fn set_phase(&self, phase: OverlayPhase) {
        self.phase.send_replace(phase);
    }

    /// Removes and returns the owned layers (summaries first).
    pub(crate) fn take_layers(&self) -> Vec<LayerId> {
        let mut layers = self.layers.lock();
        layers.overlay = None;
        let taken = [layers.summaries.take(), layers.boundaries.take()];
        taken.into_iter().flatten().collect()
    }

    pub(crate) fn mark_cancelled(&self) {
        if !self.phase().is_settled() {
            self.set_phase(OverlayPhase::Cancelled);
        }
    }
}

/// What the loader achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayReport {
    pub features: usize,
    pub highlighted: usize,
    pub summary_markers: usize,
}

/// Fetches, styles and attaches the boundary overlay for one surface.
pub struct OverlayLoader {
    surface: SurfaceHandle,
    slot: OverlaySlot,
    cancel: CancellationToken,
    source: Arc<dyn BoundarySource>,
    highlight: HighlightSet,
    timeout: Duration,
    summaries: Option<Arc<dyn SummarySource>>,
    bridge: NavigationBridge,
    glyph_color: String,
}

impl OverlayLoader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        surface: SurfaceHandle,
        slot: OverlaySlot,
        cancel: CancellationToken,
        source: Arc<dyn BoundarySource>,
        highlight: HighlightSet,
        timeout: Duration,
        bridge: NavigationBridge,
        glyph_color: impl Into<String>,
    ) -> Self {
        Self {
            surface,
            slot,
            cancel,
            source,
            highlight,
            timeout,
            summaries: None,
            bridge,
            glyph_color: glyph_color.into(),
        }
    }

    /// Adds the secondary per-country summary markers after the overlay.
    pub fn with_summaries(mut self, summaries: Option<Arc<dyn SummarySource>>) -> Self {
        self.summaries = summaries;
        self
    }

    /// Runs the loader in the background. Failures are logged, never raised.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let origin = self.source.describe();
            let slot = self.slot.clone();
            match self.load().await {
                Ok(Some(report)) => {
                    info!(
                        source = %origin,
                        features = report.features,
                        highlighted = report.highlighted,
                        summary_markers = report.summary_markers,
                        "Boundary overlay attached"
                    );
                }
                Ok(None) => {
                    slot.mark_cancelled();
                    debug!(source = %origin, "Boundary overlay cancelled");
                }
                Err(e) => {
                    slot.set_phase(OverlayPhase::Abandoned);
                    debug!(source = %origin, error = %e, "Boundary overlay unavailable, continuing without it");
                }
            }
        })
    }

    /// Loads the overlay. `Ok(None)` means the surface was disposed first.
    pub async fn load(self) -> Result<Option<OverlayReport>, OverlayError> {
        if self.slot.boundaries().is_some() {
            debug!("Boundary overlay already attached");
            return Ok(None);
        }

        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(None),
            result = tokio::time::timeout(self.timeout, self.source.fetch()) => result,
        };
        let collection = fetched.map_err(|_| OverlayError::Timeout {
            timeout_ms: self.timeout.as_millis() as u64,
        })??;

        let overlay = style_features(collection, &self.highlight);
        let features = overlay.features.len();
        let highlighted = overlay.features.iter().filter(|f| f.highlighted).count();

        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let attached = self.surface.with(|s| {
            let layer = s.add_overlay(overlay.clone());
            s.bring_to_back(layer);
            layer
        });
        let Some(layer) = attached else {
            return Ok(None);
        };

        {
            let mut layers = self.slot.layers.lock();
            layers.boundaries = Some(layer);
            layers.overlay = Some(overlay.clone());
        }

        let summary_markers = match &self.summaries {
            Some(source) => self.attach_summaries(source.as_ref(), &overlay).await,
            None => 0,
        };
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        self.slot.set_phase(OverlayPhase::Attached);

        Ok(Some(OverlayReport {
            features,
            highlighted,
            summary_markers,
        }))
    }

    async fn attach_summaries(&self, source: &dyn SummarySource, overlay: &StyledOverlay) -> usize {
        let loaded = tokio::select! {
            _ = self.cancel.cancelled() => return 0,
            result = source.load() => result,
        };

        let summaries = match loaded {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!(error = %e, "Country summaries unavailable");
                return 0;
            }
        };

        let markers = summary::build_markers(&summaries, overlay, &self.glyph_color);
        if self.cancel.is_cancelled() {
            return 0;
        }

        let layer = self.surface.with(|s| {
            let layer = s.add_layer_group(LayerKind::Markers);
            for marker in &markers {
                s.add_marker(layer, marker);
            }
            layer
        });

        match layer {
            Some(layer) => {
                for marker in &markers {
                    let request = marker.popup.action.as_ref().map(|a| a.key.navigation_request());
                    self.bridge.register(marker.key.clone(), request);
                }
                self.slot.layers.lock().summaries = Some(layer);
                markers.len()
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collection(names: &[&str]) -> FeatureCollection {
        let features: Vec<_> = names
            .iter()
            .map(|name| {
                json!({
                    "type": "Feature",
                    "properties": {"name": name},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [10.0, 0.0], [10.0, 20.0], [0.0, 0.0]]]
                    }
                })
            })
            .collect();
        let text = json!({"type": "FeatureCollection", "features": features}).to_string();
        parse_feature_collection(&text).unwrap()
    }

    #[test]
    fn test_highlight_normalization() {
        let set = HighlightSet::new(["  United Kingdom ", "INDIA"]);
        assert!(set.contains("united kingdom"));
        assert!(set.contains(" India"));
        assert!(!set.contains("France"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_feature_name_precedence() {
        let props: JsonObject = serde_json::from_value(json!({
            "name": "lower",
            "NAME": "upper",
            "ADMIN": "admin"
        }))
        .unwrap();
        assert_eq!(feature_name(Some(&props)).as_deref(), Some("admin"));

        let props: JsonObject = serde_json::from_value(json!({"NAME": "Mexico"})).unwrap();
        assert_eq!(feature_name(Some(&props)).as_deref(), Some("Mexico"));

        let props: JsonObject = serde_json::from_value(json!({"ADMIN": null, "name": "India"})).unwrap();
        assert_eq!(feature_name(Some(&props)).as_deref(), Some("India"));

        assert_eq!(feature_name(None), None);
    }

    #[test]
    fn test_style_iff_member() {
        let set = HighlightSet::new(["mexico"]);
        assert_eq!(style_for(Some(" MEXICO "), &set), (true, FeatureStyle::HIGHLIGHTED));
        assert_eq!(style_for(Some("Canada"), &set), (false, FeatureStyle::DEFAULT));
        assert_eq!(style_for(None, &set), (false, FeatureStyle::DEFAULT));
    }

    #[test]
    fn test_style_features() {
        let set = HighlightSet::new(["india", "united kingdom"]);
        let overlay = style_features(collection(&["India", "France", "United Kingdom"]), &set);

        assert_eq!(overlay.features.len(), 3);
        assert_eq!(overlay.highlighted_names(), vec!["India", "United Kingdom"]);
        assert!(overlay.features.iter().all(|f| !f.style.interactive));
        assert!(overlay.find("france").is_some());
    }

    #[test]
    fn test_feature_without_geometry_is_skipped() {
        let polygon = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
        });
        let text = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"name": "India"}, "geometry": polygon},
                {"type": "Feature", "properties": {"name": "Nowhere"}, "geometry": null},
                {"type": "Feature", "properties": {"name": "Mexico"}, "geometry": polygon}
            ]
        })
        .to_string();
        let fc = parse_feature_collection(&text).unwrap();

        let overlay = style_features(fc, &HighlightSet::new(["india", "mexico"]));

        assert_eq!(overlay.features.len(), 2);
        assert_eq!(overlay.highlighted_names(), vec!["India", "Mexico"]);
        assert!(overlay.find("nowhere").is_none());
    }

    #[test]
    fn test_parse_rejects_non_collections() {
        assert!(matches!(
            parse_feature_collection("not json"),
            Err(OverlayError::Malformed { .. })
        ));

        let geometry = json!({"type": "Point", "coordinates": [0.0, 0.0]}).to_string();
        assert!(matches!(
            parse_feature_collection(&geometry),
            Err(OverlayError::NotAFeatureCollection { .. })
        ));
    }

    #[test]
    fn test_bbox_center() {
        let fc = collection(&["Box"]);
        let geometry = fc.features[0].geometry.as_ref().unwrap();
        assert_eq!(bbox_center(geometry), Some(LatLng::new(10.0, 5.0)));

        let point = Geometry::new(geojson::Value::Point(vec![1.0, 2.0]));
        assert_eq!(bbox_center(&point), None);
    }

    #[tokio::test]
    async fn test_slot_settles() {
        let slot = OverlaySlot::new();
        assert_eq!(slot.phase(), OverlayPhase::Pending);

        let waiter = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.settled().await })
        };
        slot.set_phase(OverlayPhase::Abandoned);
        assert_eq!(waiter.await.unwrap(), OverlayPhase::Abandoned);

        slot.mark_cancelled();
        assert_eq!(slot.phase(), OverlayPhase::Abandoned);
    }
}
