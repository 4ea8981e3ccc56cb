//! Rendering surface abstraction.
//!
//! A [`MapSurface`] is the live map bound to one container. The controller
//! creates it through a [`SurfaceFactory`] once the [`Container`] reports a
//! usable size and keeps it in a [`SurfaceHandle`]. Every other component
//! reaches the surface only through the handle, which turns any mutation of a
//! disposed surface into a no-op.

use crate::markers::MarkerRecord;
use crate::overlay::StyledOverlay;
use crate::tiles::TileProviderConfig;
use nutrimap_core::error::SurfaceError;
use nutrimap_core::LatLng;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Rendered size of the hosting container, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerSize {
    pub width: u32,
    pub height: u32,
}

impl ContainerSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both dimensions are nonzero.
    pub fn is_usable(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl fmt::Display for ContainerSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Layout element that hosts the surface.
pub trait Container: Send + Sync {
    /// Current size, or `None` while the element does not exist yet.
    fn size(&self) -> Option<ContainerSize>;
}

/// Identifier of a layer on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(pub u64);

/// Identifier of a marker on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerId(pub u64);

/// Rendering pane a layer belongs to.
///
/// Panes stack in declaration order: tile imagery at the bottom, boundary
/// overlays above it, markers on top. Reordering only happens within a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Tiles,
    Overlay,
    Markers,
}

/// A live map bound to one container.
pub trait MapSurface: Send {
    /// Sets the camera center and zoom.
    fn set_view(&mut self, center: LatLng, zoom: f64);

    /// Attaches the basemap tile layer.
    fn add_tile_layer(&mut self, provider: &TileProviderConfig) -> Result<LayerId, SurfaceError>;

    /// Adds a metric scale control.
    fn add_scale_control(&mut self) -> Result<(), SurfaceError>;

    /// Creates an empty layer group in the given pane.
    fn add_layer_group(&mut self, kind: LayerKind) -> LayerId;

    /// Removes every marker from a layer group.
    fn clear_layer(&mut self, layer: LayerId);

    /// Adds a marker to a layer group.
    fn add_marker(&mut self, layer: LayerId, marker: &MarkerRecord) -> MarkerId;

    /// Adds a styled boundary overlay to the overlay pane.
    fn add_overlay(&mut self, overlay: StyledOverlay) -> LayerId;

    /// Moves a layer to the bottom of its pane.
    fn bring_to_back(&mut self, layer: LayerId);

    /// Removes a layer and everything on it.
    fn remove_layer(&mut self, layer: LayerId);

    /// Opens the popup of a marker, closing any other open popup.
    fn open_popup(&mut self, marker: MarkerId);

    /// Pans the camera to a position, keeping the zoom.
    fn pan_to(&mut self, position: LatLng);

    /// Re-reads the container size and re-renders.
    fn invalidate_size(&mut self);

    /// Destroys the surface.
    fn remove(&mut self);
}

/// Creates surfaces inside containers.
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, container: &dyn Container) -> Result<Box<dyn MapSurface>, SurfaceError>;
}

/// Shared slot holding the live surface.
///
/// Empty before creation and after disposal. Components hold clones of the
/// handle and mutate the surface only through [`SurfaceHandle::with`].
#[derive(Clone, Default)]
pub struct SurfaceHandle {
    inner: Arc<Mutex<Option<Box<dyn MapSurface>>>>,
}

impl SurfaceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a surface is currently installed.
    pub fn is_live(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Runs `f` against the live surface; returns `None` without calling it
    /// when there is none.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn MapSurface) -> R) -> Option<R> {
        let mut guard = self.inner.lock();
        guard.as_mut().map(|surface| f(surface.as_mut()))
    }

    pub(crate) fn install(&self, surface: Box<dyn MapSurface>) {
        *self.inner.lock() = Some(surface);
    }

    pub(crate) fn take(&self) -> Option<Box<dyn MapSurface>> {
        self.inner.lock().take()
    }
}

impl fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceHandle")
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessFactory;
    use crate::headless::HeadlessContainer;

    #[test]
    fn test_container_size_usable() {
        assert!(ContainerSize::new(800, 600).is_usable());
        assert!(!ContainerSize::new(0, 600).is_usable());
        assert!(!ContainerSize::new(800, 0).is_usable());
        assert_eq!(ContainerSize::new(800, 600).to_string(), "800x600");
    }

    #[test]
    fn test_pane_order() {
        assert!(LayerKind::Tiles < LayerKind::Overlay);
        assert!(LayerKind::Overlay < LayerKind::Markers);
    }

    #[test]
    fn test_handle_noop_when_empty() {
        let handle = SurfaceHandle::new();
        assert!(!handle.is_live());
        assert_eq!(handle.with(|s| s.invalidate_size()), None);
    }

    #[test]
    fn test_handle_install_and_take() {
        let factory = HeadlessFactory::new();
        let container = HeadlessContainer::sized(640, 480);
        let handle = SurfaceHandle::new();

        handle.install(factory.create(&container).unwrap());
        assert!(handle.is_live());
        assert_eq!(handle.with(|s| s.invalidate_size()), Some(()));
        assert_eq!(factory.snapshot().invalidations, 1);

        let surface = handle.take();
        assert!(surface.is_some());
        assert!(!handle.is_live());
        assert_eq!(handle.with(|s| s.invalidate_size()), None);
    }
}
