//! Map lifecycle controller.
//!
//! The controller owns the rendering surface from creation to disposal:
//!
//! 1. **Polling**: wait for the container to report a nonzero size
//! 2. **Ready / Degraded**: create the surface, set the initial view, attach
//!    the basemap and scale control, start the overlay loader, schedule size
//!    re-validations and listen for resize events
//! 3. **Disposed**: cancel everything still pending, remove owned layers and
//!    destroy the surface
//!
//! Marker updates may arrive at any time; before the surface exists they are
//! stored and applied once it does.

use crate::bridge::{NavigationBridge, NavigationReceiver, PopupKey};
use crate::markers::{MarkerLayerManager, RebuildOutcome};
use crate::overlay::{
    BoundarySource, HighlightSet, HttpBoundarySource, OverlayLoader, OverlayPhase, OverlaySlot,
    StyledOverlay,
};
use crate::readiness::{wait_for_container, Readiness, ReadinessPolicy};
use crate::state::{ControllerState, ControllerStatus};
use crate::summary::{JsonFileSummarySource, SummarySource};
use crate::surface::{Container, MapSurface, SurfaceFactory, SurfaceHandle};
use crate::tiles::{select_provider, TileProviderConfig};
use nutrimap_core::config::AppConfig;
use nutrimap_core::error::SurfaceError;
use nutrimap_core::{LatLng, LocationRecord, MapError, NavigationRequest, SelectionId};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything a controller needs to know up front.
#[derive(Debug, Clone)]
pub struct MapSettings {
    /// Raw access token for the branded tile provider
    pub access_token: Option<String>,
    pub initial_center: LatLng,
    pub initial_zoom: f64,
    pub marker_color: String,
    pub scale_control: bool,
    pub readiness: ReadinessPolicy,
    /// Create the surface even if the container never reported a size
    pub proceed_when_unsized: bool,
    pub revalidation_delays: Vec<Duration>,
    pub revalidate_on_resize: bool,
    pub overlay_enabled: bool,
    pub overlay_url: String,
    pub highlight: HighlightSet,
    pub fetch_timeout: Duration,
    pub summaries_path: Option<PathBuf>,
}

impl MapSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let [lat, lng] = config.map.initial_center;
        Self {
            access_token: config.map.access_token.clone(),
            initial_center: LatLng::new(lat, lng),
            initial_zoom: config.map.initial_zoom,
            marker_color: config.map.marker_color.clone(),
            scale_control: config.map.scale_control,
            readiness: ReadinessPolicy::from(&config.readiness),
            proceed_when_unsized: config.readiness.proceed_when_unsized,
            revalidation_delays: config.revalidation.delays().collect(),
            revalidate_on_resize: config.revalidation.on_resize,
            overlay_enabled: config.overlay.enabled,
            overlay_url: config.overlay.url.clone(),
            highlight: HighlightSet::new(&config.overlay.highlight),
            fetch_timeout: config.overlay.fetch_timeout(),
            summaries_path: config.overlay.summaries.clone(),
        }
    }

    /// The basemap this controller will attach.
    pub fn tile_provider(&self) -> TileProviderConfig {
        select_provider(self.access_token.as_deref())
    }
}

impl Default for MapSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Builder for [`MapController`].
pub struct MapControllerBuilder {
    settings: MapSettings,
    factory: Arc<dyn SurfaceFactory>,
    boundaries: Option<Arc<dyn BoundarySource>>,
    summaries: Option<Arc<dyn SummarySource>>,
}

impl MapControllerBuilder {
    /// Replaces the HTTP boundary source.
    pub fn boundaries(mut self, source: Arc<dyn BoundarySource>) -> Self {
        self.boundaries = Some(source);
        self
    }

    /// Disables the boundary overlay (and with it the summary markers).
    pub fn without_overlay(mut self) -> Self {
        self.settings.overlay_enabled = false;
        self.boundaries = None;
        self
    }

    /// Replaces the summary source.
    pub fn summaries(mut self, source: Arc<dyn SummarySource>) -> Self {
        self.summaries = Some(source);
        self
    }

    /// Builds the controller and the receiver the router should listen on.
    pub fn build(self) -> (MapController, NavigationReceiver) {
        let MapControllerBuilder {
            settings,
            factory,
            boundaries,
            summaries,
        } = self;

        let boundaries = match boundaries {
            Some(source) => Some(source),
            None if settings.overlay_enabled => {
                Some(Arc::new(HttpBoundarySource::new(settings.overlay_url.clone()))
                    as Arc<dyn BoundarySource>)
            }
            None => None,
        };

        let summaries = summaries.or_else(|| {
            settings
                .summaries_path
                .clone()
                .map(|path| Arc::new(JsonFileSummarySource::new(path)) as Arc<dyn SummarySource>)
        });

        let (bridge, navigation) = NavigationBridge::channel();
        let surface = SurfaceHandle::new();
        let markers = MarkerLayerManager::new(surface.clone(), bridge.clone(), settings.marker_color.clone());

        let controller = MapController {
            settings,
            factory,
            boundaries,
            summaries,
            surface,
            bridge,
            markers: Mutex::new(markers),
            overlay: OverlaySlot::new(),
            status: ControllerStatus::new(),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            mounted: AtomicBool::new(false),
        };

        (controller, navigation)
    }
}

/// Owns one map surface and everything attached to it.
pub struct MapController {
    settings: MapSettings,
    factory: Arc<dyn SurfaceFactory>,
    boundaries: Option<Arc<dyn BoundarySource>>,
    summaries: Option<Arc<dyn SummarySource>>,
    surface: SurfaceHandle,
    bridge: NavigationBridge,
    markers: Mutex<MarkerLayerManager>,
    overlay: OverlaySlot,
    status: ControllerStatus,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    mounted: AtomicBool,
}

impl MapController {
    pub fn builder(settings: MapSettings, factory: Arc<dyn SurfaceFactory>) -> MapControllerBuilder {
        MapControllerBuilder {
            settings,
            factory,
            boundaries: None,
            summaries: None,
        }
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    pub fn state(&self) -> ControllerState {
        self.status.state()
    }

    pub fn status(&self) -> &ControllerStatus {
        &self.status
    }

    /// The surface slot; empty before creation and after disposal.
    pub fn surface(&self) -> &SurfaceHandle {
        &self.surface
    }

    pub fn bridge(&self) -> &NavigationBridge {
        &self.bridge
    }

    pub fn overlay_phase(&self) -> OverlayPhase {
        self.overlay.phase()
    }

    /// Waits until the overlay has attached, been abandoned or cancelled.
    pub async fn overlay_settled(&self) -> OverlayPhase {
        self.overlay.settled().await
    }

    /// The styled overlay currently on the surface.
    pub fn overlay(&self) -> Option<StyledOverlay> {
        self.overlay.styled()
    }

    /// Mounts the map into `container`.
    ///
    /// Waits for the container, then creates and initializes the surface.
    /// Only the first call does anything. Returns the resulting state.
    pub async fn mount(
        &self,
        container: &dyn Container,
        resize: Option<broadcast::Receiver<()>>,
    ) -> ControllerState {
        if self.mounted.swap(true, Ordering::SeqCst) {
            warn!("Map already mounted");
            return self.state();
        }
        if !self.status.set_state(ControllerState::Polling) {
            return self.state();
        }

        let readiness = wait_for_container(container, &self.settings.readiness, &self.cancel).await;

        let target = match readiness {
            Readiness::Cancelled => {
                debug!("Mount cancelled while waiting for the container");
                return self.state();
            }
            Readiness::Ready { size, attempts } => {
                self.status.metrics().record_readiness_checks(attempts);
                debug!(%size, attempts, "Container ready");
                ControllerState::Ready
            }
            Readiness::Unsized { last, attempts } => {
                self.status.metrics().record_readiness_checks(attempts);
                let message = readiness.error().map(|e| e.to_string()).unwrap_or_default();
                if !self.settings.proceed_when_unsized {
                    warn!(width = last.width, height = last.height, attempts, "Container never sized, not creating map");
                    self.status.set_error(message);
                    return self.state();
                }
                warn!(width = last.width, height = last.height, attempts, "Container never sized, creating map anyway");
                self.status.set_warning(message);
                ControllerState::Degraded
            }
            Readiness::Missing { attempts } => {
                self.status.metrics().record_readiness_checks(attempts);
                warn!(attempts, "Map container not found");
                self.status
                    .set_error(MapError::ContainerMissing { attempts }.to_string());
                return self.state();
            }
        };

        let surface = match self.create_surface(container) {
            Ok(surface) => surface,
            Err(e) => {
                error!(error = %e, "Failed to initialize map");
                self.status.set_error(e.to_string());
                return self.state();
            }
        };

        self.surface.install(surface);
        if self.cancel.is_cancelled() || !self.status.set_state(target) {
            // Disposed while the surface was being built
            if let Some(mut surface) = self.surface.take() {
                surface.remove();
            }
            return self.state();
        }

        self.start_overlay();

        self.surface.with(|s| s.invalidate_size());
        self.schedule_revalidations();
        if let Some(resize) = resize.filter(|_| self.settings.revalidate_on_resize) {
            self.listen_for_resize(resize);
        }

        if let Some(outcome) = self.markers.lock().rebuild() {
            self.status.metrics().record_rebuild();
            debug!(rendered = outcome.rendered, "Initial markers placed");
        }

        info!(state = %target, "Map mounted");
        target
    }

    fn create_surface(&self, container: &dyn Container) -> Result<Box<dyn MapSurface>, SurfaceError> {
        let mut surface = self.factory.create(container)?;

        surface.set_view(self.settings.initial_center, self.settings.initial_zoom);

        let provider = self.settings.tile_provider();
        if let Err(e) = surface.add_tile_layer(&provider) {
            surface.remove();
            return Err(e);
        }
        debug!(provider = ?provider.kind, "Basemap attached");

        if self.settings.scale_control {
            if let Err(e) = surface.add_scale_control() {
                debug!(error = %e, "Scale control unavailable");
            }
        }

        Ok(surface)
    }

    fn spawn_task(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    fn start_overlay(&self) {
        let Some(source) = self.boundaries.clone() else {
            debug!("Boundary overlay disabled");
            self.overlay.set_phase(OverlayPhase::Abandoned);
            return;
        };

        let loader = OverlayLoader::new(
            self.surface.clone(),
            self.overlay.clone(),
            self.cancel.child_token(),
            source,
            self.settings.highlight.clone(),
            self.settings.fetch_timeout,
            self.bridge.clone(),
            self.settings.marker_color.clone(),
        )
        .with_summaries(self.summaries.clone());

        self.spawn_task(loader.spawn());
    }

    fn schedule_revalidations(&self) {
        for delay in self.settings.revalidation_delays.clone() {
            let surface = self.surface.clone();
            let cancel = self.cancel.clone();
            let metrics = self.status.metrics().clone();

            self.spawn_task(tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        if surface.with(|s| s.invalidate_size()).is_some() {
                            metrics.record_revalidation();
                        }
                    }
                }
            }));
        }
    }

    fn listen_for_resize(&self, mut resize: broadcast::Receiver<()>) {
        let surface = self.surface.clone();
        let cancel = self.cancel.clone();
        let metrics = self.status.metrics().clone();

        self.spawn_task(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = resize.recv() => match event {
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            if surface.with(|s| s.invalidate_size()).is_some() {
                                metrics.record_revalidation();
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Resize listener detached");
        }));
    }

    /// Replaces the location dataset. Returns `None` while no surface exists.
    pub fn set_locations(&self, locations: Vec<LocationRecord>) -> Option<RebuildOutcome> {
        let outcome = self.markers.lock().set_locations(locations);
        if outcome.is_some() {
            self.status.metrics().record_rebuild();
        }
        outcome
    }

    /// Replaces the selection. Returns `None` while no surface exists.
    pub fn set_selection(&self, selection: Option<SelectionId>) -> Option<RebuildOutcome> {
        let outcome = self.markers.lock().set_selection(selection);
        if outcome.is_some() {
            self.status.metrics().record_rebuild();
        }
        outcome
    }

    /// Number of location markers on the surface.
    pub fn marker_count(&self) -> usize {
        self.markers.lock().marker_count()
    }

    /// Reports that the surface opened the popup of `key`.
    pub fn popup_opened(&self, key: &PopupKey) {
        if !self.surface.is_live() {
            return;
        }
        match key {
            PopupKey::Location(_) => self.markers.lock().popup_opened(key),
            PopupKey::Country(_) => self.bridge.popup_opened_quiet(key),
        }
    }

    /// Reports a click on the call-to-action of `key`'s popup.
    ///
    /// Returns the request sent to the router, if any.
    pub fn popup_action(&self, key: &PopupKey) -> Option<NavigationRequest> {
        if !self.surface.is_live() {
            return None;
        }
        let request = self.bridge.activate_quiet(key)?;
        self.status.metrics().record_navigation();
        Some(request)
    }

    /// Tears the map down. Safe to call any number of times.
    pub fn dispose(&self) {
        if self.status.is_disposed() {
            return;
        }

        self.cancel.cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        self.overlay.mark_cancelled();
        let owned = self.overlay.take_layers();
        self.surface.with(|s| {
            for layer in owned {
                s.remove_layer(layer);
            }
        });

        self.markers.lock().detach();

        let had_surface = match self.surface.take() {
            Some(mut surface) => {
                surface.remove();
                true
            }
            None => false,
        };

        self.bridge.clear();
        self.status.set_state(ControllerState::Disposed);
        info!(had_surface, "Map disposed");
    }
}

impl Drop for MapController {
    fn drop(&mut self) {
        self.dispose();
    }
}
