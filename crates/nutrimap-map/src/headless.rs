//! In-memory rendering surface.
//!
//! [`HeadlessSurface`] records everything done to it in a state shared with
//! the [`HeadlessFactory`] that created it, so callers can inspect the map
//! through [`HeadlessFactory::snapshot`] after handing the surface to a
//! controller.

use crate::markers::MarkerRecord;
use crate::overlay::StyledOverlay;
use crate::surface::{
    Container, ContainerSize, LayerId, LayerKind, MapSurface, MarkerId, SurfaceFactory,
};
use crate::tiles::TileProviderConfig;
use nutrimap_core::error::SurfaceError;
use nutrimap_core::LatLng;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Container whose size is set by the caller.
#[derive(Debug, Default)]
pub struct HeadlessContainer {
    size: Mutex<Option<ContainerSize>>,
    /// Checks answered with `None` before `size` is reported
    hidden_for: u32,
    checks: AtomicU32,
}

impl HeadlessContainer {
    /// A container that is laid out at the given size.
    pub fn sized(width: u32, height: u32) -> Self {
        Self::with_size(Some(ContainerSize::new(width, height)))
    }

    /// A container that exists but has not been laid out yet.
    pub fn zero_sized() -> Self {
        Self::with_size(Some(ContainerSize::default()))
    }

    /// A container element that never appears.
    pub fn missing() -> Self {
        Self::with_size(None)
    }

    /// A container that is absent for the first `checks` checks and laid out
    /// at the given size afterwards.
    pub fn appearing_after(checks: u32, width: u32, height: u32) -> Self {
        Self {
            hidden_for: checks,
            ..Self::sized(width, height)
        }
    }

    fn with_size(size: Option<ContainerSize>) -> Self {
        Self {
            size: Mutex::new(size),
            hidden_for: 0,
            checks: AtomicU32::new(0),
        }
    }

    /// Changes the reported size, as a layout pass would.
    pub fn set_size(&self, size: Option<ContainerSize>) {
        *self.size.lock() = size;
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.set_size(Some(ContainerSize::new(width, height)));
    }

    /// How many times the size has been read.
    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }
}

impl Container for HeadlessContainer {
    fn size(&self) -> Option<ContainerSize> {
        let seen = self.checks.fetch_add(1, Ordering::SeqCst);
        if seen < self.hidden_for {
            return None;
        }
        *self.size.lock()
    }
}

/// Camera position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewState {
    pub center: LatLng,
    pub zoom: f64,
}

/// Boundary overlay as seen on the surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlaySummary {
    pub features: usize,
    pub highlighted: Vec<String>,
}

/// One layer, bottom to top.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub id: LayerId,
    pub kind: LayerKind,
    pub markers: usize,
}

/// A layer taken off the surface with [`MapSurface::remove_layer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerRemoval {
    pub kind: LayerKind,
    /// Whether the surface itself was still live at the time
    pub while_live: bool,
}

/// Point-in-time copy of the headless surface state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SurfaceSnapshot {
    /// Surfaces created by the factory so far
    pub created: u32,
    /// Surfaces removed so far
    pub removed: u32,
    pub live: bool,
    pub container: Option<ContainerSize>,
    pub view: Option<ViewState>,
    pub tile_provider: Option<TileProviderConfig>,
    pub scale_control: bool,
    /// Layers in rendering order, bottom first
    pub layers: Vec<LayerSummary>,
    /// Explicit layer removals, oldest first
    pub removed_layers: Vec<LayerRemoval>,
    pub overlay: Option<OverlaySummary>,
    /// Markers of every layer, in rendering order
    pub markers: Vec<MarkerRecord>,
    pub open_popup: Option<String>,
    pub pans: Vec<LatLng>,
    pub invalidations: u32,
}

impl SurfaceSnapshot {
    /// Popup keys of all markers, in rendering order.
    pub fn marker_keys(&self) -> Vec<String> {
        self.markers.iter().map(|m| m.key.to_string()).collect()
    }

    /// Panes of all layers, bottom first.
    pub fn z_order(&self) -> Vec<LayerKind> {
        self.layers.iter().map(|l| l.kind).collect()
    }
}

/// Failures the factory injects into the surfaces it creates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessFaults {
    pub create: bool,
    pub tile_layer: bool,
    pub scale_control: bool,
}

#[derive(Debug)]
struct HeadlessLayer {
    id: LayerId,
    kind: LayerKind,
    markers: Vec<(MarkerId, MarkerRecord)>,
    overlay: Option<StyledOverlay>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    created: u32,
    removed: u32,
    live: bool,
    container: Option<ContainerSize>,
    view: Option<ViewState>,
    tile_provider: Option<TileProviderConfig>,
    scale_control: bool,
    /// Insertion order; rendering order is derived per pane
    layers: Vec<HeadlessLayer>,
    removed_layers: Vec<LayerRemoval>,
    open_popup: Option<MarkerId>,
    pans: Vec<LatLng>,
    invalidations: u32,
    next_id: u64,
}

impl HeadlessState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn layer_mut(&mut self, id: LayerId) -> Option<&mut HeadlessLayer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    fn ordered(&self) -> Vec<&HeadlessLayer> {
        let mut layers: Vec<_> = self.layers.iter().collect();
        layers.sort_by_key(|l| l.kind);
        layers
    }

    fn close_popup_if_gone(&mut self) {
        if let Some(open) = self.open_popup {
            let present = self
                .layers
                .iter()
                .any(|l| l.markers.iter().any(|(id, _)| *id == open));
            if !present {
                self.open_popup = None;
            }
        }
    }

    fn marker(&self, id: MarkerId) -> Option<&MarkerRecord> {
        self.layers
            .iter()
            .flat_map(|l| l.markers.iter())
            .find(|(marker, _)| *marker == id)
            .map(|(_, record)| record)
    }

    fn snapshot(&self) -> SurfaceSnapshot {
        let ordered = self.ordered();

        SurfaceSnapshot {
            created: self.created,
            removed: self.removed,
            live: self.live,
            container: self.container,
            view: self.view,
            tile_provider: self.tile_provider.clone(),
            scale_control: self.scale_control,
            layers: ordered
                .iter()
                .map(|l| LayerSummary {
                    id: l.id,
                    kind: l.kind,
                    markers: l.markers.len(),
                })
                .collect(),
            removed_layers: self.removed_layers.clone(),
            overlay: ordered
                .iter()
                .find_map(|l| l.overlay.as_ref())
                .map(|o| OverlaySummary {
                    features: o.features.len(),
                    highlighted: o.highlighted_names().into_iter().map(String::from).collect(),
                }),
            markers: ordered
                .iter()
                .flat_map(|l| l.markers.iter().map(|(_, record)| record.clone()))
                .collect(),
            open_popup: self
                .open_popup
                .and_then(|id| self.marker(id))
                .map(|m| m.key.to_string()),
            pans: self.pans.clone(),
            invalidations: self.invalidations,
        }
    }
}

/// Creates [`HeadlessSurface`]s that all report into one shared state.
#[derive(Debug, Clone, Default)]
pub struct HeadlessFactory {
    state: Arc<Mutex<HeadlessState>>,
    faults: HeadlessFaults,
}

impl HeadlessFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose surfaces fail in the given ways.
    pub fn with_faults(faults: HeadlessFaults) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    /// State of the most recently created surface.
    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.state.lock().snapshot()
    }
}

impl SurfaceFactory for HeadlessFactory {
    fn create(&self, container: &dyn Container) -> Result<Box<dyn MapSurface>, SurfaceError> {
        if self.faults.create {
            return Err(SurfaceError::create_failed("injected creation failure"));
        }

        let mut state = self.state.lock();
        let created = state.created + 1;
        let removed = state.removed;
        *state = HeadlessState {
            created,
            removed,
            live: true,
            container: container.size(),
            next_id: state.next_id,
            ..HeadlessState::default()
        };

        Ok(Box::new(HeadlessSurface {
            state: Arc::clone(&self.state),
            faults: self.faults,
            removed: false,
        }))
    }
}

/// Surface that records operations instead of drawing.
#[derive(Debug)]
pub struct HeadlessSurface {
    state: Arc<Mutex<HeadlessState>>,
    faults: HeadlessFaults,
    removed: bool,
}

impl HeadlessSurface {
    fn add_layer(&mut self, kind: LayerKind, overlay: Option<StyledOverlay>) -> LayerId {
        let mut state = self.state.lock();
        let id = LayerId(state.next_id());
        state.layers.push(HeadlessLayer {
            id,
            kind,
            markers: Vec::new(),
            overlay,
        });
        id
    }
}

impl MapSurface for HeadlessSurface {
    fn set_view(&mut self, center: LatLng, zoom: f64) {
        self.state.lock().view = Some(ViewState { center, zoom });
    }

    fn add_tile_layer(&mut self, provider: &TileProviderConfig) -> Result<LayerId, SurfaceError> {
        if self.faults.tile_layer {
            return Err(SurfaceError::TileLayerFailed {
                url_template: provider.url_template.clone(),
                reason: "injected tile failure".to_string(),
            });
        }
        let id = self.add_layer(LayerKind::Tiles, None);
        self.state.lock().tile_provider = Some(provider.clone());
        Ok(id)
    }

    fn add_scale_control(&mut self) -> Result<(), SurfaceError> {
        if self.faults.scale_control {
            return Err(SurfaceError::ControlFailed {
                control: "scale".to_string(),
                reason: "injected control failure".to_string(),
            });
        }
        self.state.lock().scale_control = true;
        Ok(())
    }

    fn add_layer_group(&mut self, kind: LayerKind) -> LayerId {
        self.add_layer(kind, None)
    }

    fn clear_layer(&mut self, layer: LayerId) {
        let mut state = self.state.lock();
        if let Some(layer) = state.layer_mut(layer) {
            layer.markers.clear();
        }
        state.close_popup_if_gone();
    }

    fn add_marker(&mut self, layer: LayerId, marker: &MarkerRecord) -> MarkerId {
        let mut state = self.state.lock();
        let id = MarkerId(state.next_id());
        if let Some(layer) = state.layer_mut(layer) {
            layer.markers.push((id, marker.clone()));
        }
        id
    }

    fn add_overlay(&mut self, overlay: StyledOverlay) -> LayerId {
        self.add_layer(LayerKind::Overlay, Some(overlay))
    }

    fn bring_to_back(&mut self, layer: LayerId) {
        let mut state = self.state.lock();
        if let Some(index) = state.layers.iter().position(|l| l.id == layer) {
            let moved = state.layers.remove(index);
            state.layers.insert(0, moved);
        }
    }

    fn remove_layer(&mut self, layer: LayerId) {
        let mut state = self.state.lock();
        let Some(index) = state.layers.iter().position(|l| l.id == layer) else {
            return;
        };
        let removed = state.layers.remove(index);
        let while_live = state.live;
        state.removed_layers.push(LayerRemoval {
            kind: removed.kind,
            while_live,
        });
        state.close_popup_if_gone();
    }

    fn open_popup(&mut self, marker: MarkerId) {
        let mut state = self.state.lock();
        if state.marker(marker).is_some() {
            state.open_popup = Some(marker);
        }
    }

    fn pan_to(&mut self, position: LatLng) {
        let mut state = self.state.lock();
        state.pans.push(position);
        if let Some(view) = state.view.as_mut() {
            view.center = position;
        }
    }

    fn invalidate_size(&mut self) {
        self.state.lock().invalidations += 1;
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;

        let mut state = self.state.lock();
        state.removed += 1;
        state.live = false;
        state.layers.clear();
        state.open_popup = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::PopupKey;
    use crate::markers::{Icon, PopupContent};
    use crate::tiles::select_provider;

    fn marker(id: &str) -> MarkerRecord {
        MarkerRecord {
            key: PopupKey::location(id),
            position: LatLng::new(1.0, 2.0),
            icon: Icon::glyph("#000"),
            popup: PopupContent {
                title: id.to_string(),
                lines: Vec::new(),
                action: None,
            },
        }
    }

    #[test]
    fn test_container_appears_later() {
        let container = HeadlessContainer::appearing_after(2, 300, 200);
        assert_eq!(container.size(), None);
        assert_eq!(container.size(), None);
        assert_eq!(container.size(), Some(ContainerSize::new(300, 200)));
        assert_eq!(container.checks(), 3);

        assert_eq!(HeadlessContainer::missing().size(), None);
        assert_eq!(HeadlessContainer::zero_sized().size(), Some(ContainerSize::new(0, 0)));
    }

    #[test]
    fn test_pane_order_independent_of_insertion() {
        let factory = HeadlessFactory::new();
        let mut surface = factory.create(&HeadlessContainer::sized(10, 10)).unwrap();

        let markers = surface.add_layer_group(LayerKind::Markers);
        surface.add_marker(markers, &marker("a"));
        surface.add_tile_layer(&select_provider(None)).unwrap();
        let overlay = surface.add_overlay(StyledOverlay::default());
        surface.bring_to_back(overlay);

        let snapshot = factory.snapshot();
        assert_eq!(
            snapshot.z_order(),
            vec![LayerKind::Tiles, LayerKind::Overlay, LayerKind::Markers]
        );
        assert_eq!(snapshot.overlay.map(|o| o.features), Some(0));
    }

    #[test]
    fn test_clear_closes_popup() {
        let factory = HeadlessFactory::new();
        let mut surface = factory.create(&HeadlessContainer::sized(10, 10)).unwrap();
        let layer = surface.add_layer_group(LayerKind::Markers);
        let id = surface.add_marker(layer, &marker("a"));

        surface.open_popup(id);
        assert_eq!(factory.snapshot().open_popup.as_deref(), Some("a"));

        surface.clear_layer(layer);
        let snapshot = factory.snapshot();
        assert_eq!(snapshot.open_popup, None);
        assert!(snapshot.markers.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let factory = HeadlessFactory::new();
        let mut surface = factory.create(&HeadlessContainer::sized(10, 10)).unwrap();
        surface.add_layer_group(LayerKind::Markers);

        surface.remove();
        surface.remove();

        let snapshot = factory.snapshot();
        assert_eq!(snapshot.created, 1);
        assert_eq!(snapshot.removed, 1);
        assert!(!snapshot.live);
        assert!(snapshot.layers.is_empty());
        assert!(snapshot.removed_layers.is_empty());
    }

    #[test]
    fn test_remove_layer_is_recorded() {
        let factory = HeadlessFactory::new();
        let mut surface = factory.create(&HeadlessContainer::sized(10, 10)).unwrap();
        let overlay = surface.add_overlay(StyledOverlay::default());
        surface.add_layer_group(LayerKind::Markers);

        surface.remove_layer(overlay);
        surface.remove_layer(overlay);

        let snapshot = factory.snapshot();
        assert_eq!(snapshot.z_order(), vec![LayerKind::Markers]);
        assert_eq!(
            snapshot.removed_layers,
            vec![LayerRemoval {
                kind: LayerKind::Overlay,
                while_live: true
            }]
        );
    }

    #[test]
    fn test_injected_faults() {
        let factory = HeadlessFactory::with_faults(HeadlessFaults {
            create: true,
            ..Default::default()
        });
        assert!(factory.create(&HeadlessContainer::sized(10, 10)).is_err());

        let factory = HeadlessFactory::with_faults(HeadlessFaults {
            tile_layer: true,
            scale_control: true,
            ..Default::default()
        });
        let mut surface = factory.create(&HeadlessContainer::sized(10, 10)).unwrap();
        assert!(surface.add_tile_layer(&select_provider(None)).is_err());
        assert!(surface.add_scale_control().is_err());
    }
}
