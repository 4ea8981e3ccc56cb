//! # NutriMap Map
//!
//! The interactive map subsystem: a lifecycle controller that waits for its
//! hosting container, creates a rendering surface, attaches a basemap, loads a
//! country boundary overlay in the background and keeps a marker layer in sync
//! with a mutable location dataset.
//!
//! The subsystem is host-agnostic. Rendering goes through the [`MapSurface`]
//! trait, container measurements through [`Container`], and remote data
//! through [`BoundarySource`] and [`SummarySource`]. A [`HeadlessSurface`] is
//! included for tests and command line use.
//!
//! ## Components
//!
//! - [`tiles`]: basemap provider selection
//! - [`readiness`]: bounded, cancellable wait for a sized container
//! - [`overlay`]: boundary fetch, highlight styling, overlay attachment
//! - [`summary`]: secondary per-country markers, gated on the overlay
//! - [`markers`]: marker layer rebuilds and selection focus
//! - [`bridge`]: popup call-to-action to navigation request
//! - [`controller`]: owns the surface and orchestrates everything above
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use nutrimap_core::config::AppConfig;
//! use nutrimap_map::{HeadlessContainer, HeadlessFactory, MapController, MapSettings};
//!
//! # async fn run() {
//! let settings = MapSettings::from_config(&AppConfig::default());
//! let factory = HeadlessFactory::new();
//! let (controller, navigation) = MapController::builder(settings, Arc::new(factory)).build();
//!
//! controller.mount(&HeadlessContainer::sized(1024, 768), None).await;
//! # drop(navigation);
//! controller.dispose();
//! # }
//! ```

pub mod bridge;
pub mod controller;
pub mod headless;
pub mod markers;
pub mod overlay;
pub mod readiness;
pub mod state;
pub mod summary;
pub mod surface;
pub mod tiles;

pub use bridge::{NavigationBridge, NavigationReceiver, PopupKey};
pub use controller::{MapController, MapControllerBuilder, MapSettings};
pub use headless::{
    HeadlessContainer, HeadlessFactory, HeadlessFaults, HeadlessSurface, LayerRemoval, SurfaceSnapshot,
};
pub use markers::{Brand, Icon, MarkerLayerManager, MarkerRecord, PopupContent, RebuildOutcome};
pub use overlay::{BoundarySource, HighlightSet, HttpBoundarySource, OverlayPhase, StyledOverlay};
pub use readiness::{Readiness, ReadinessPolicy};
pub use state::{ControllerMetrics, ControllerState, ControllerStatus, MetricsSnapshot};
pub use summary::{JsonFileSummarySource, StaticSummarySource, SummarySource};
pub use surface::{Container, ContainerSize, LayerId, LayerKind, MapSurface, MarkerId, SurfaceFactory, SurfaceHandle};
pub use tiles::{select_provider, ProviderKind, TileProviderConfig};
