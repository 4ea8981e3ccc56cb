//! Common test utilities and fake data sources for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use geojson::FeatureCollection;
use nutrimap_core::config::AppConfig;
use nutrimap_core::error::OverlayError;
use nutrimap_core::LocationRecord;
use nutrimap_map::overlay::parse_feature_collection;
use nutrimap_map::{
    BoundarySource, HeadlessFactory, MapController, MapSettings, NavigationReceiver,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Get the path to test fixtures
pub fn fixtures_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir).join("tests").join("fixtures")
}

pub fn summaries_fixture() -> PathBuf {
    fixtures_dir().join("country_summaries.json")
}

/// Load the boundary fixture
pub fn load_boundaries() -> FeatureCollection {
    let path = fixtures_dir().join("boundaries.geo.json");
    let content = std::fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("Failed to read boundaries from {:?}", path));
    parse_feature_collection(&content).expect("Failed to parse boundaries fixture")
}

/// The three-location dataset used throughout: `a` and `c` resolve, `b` does not.
pub fn scenario_locations() -> Vec<LocationRecord> {
    vec![
        LocationRecord::new("a", json!([-73.9, 40.7])),
        LocationRecord::new("b", json!([f64::NAN, 40.7])),
        LocationRecord::new("c", json!({"lat": 51.5, "lng": -0.1})),
    ]
}

/// Settings with the default timings and no summaries file
pub fn settings() -> MapSettings {
    MapSettings::from_config(&AppConfig::default())
}

/// Serves the boundary fixture, optionally after a delay
#[derive(Debug, Default)]
pub struct FixtureBoundarySource {
    delay: Option<Duration>,
    fetches: AtomicU32,
}

impl FixtureBoundarySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BoundarySource for FixtureBoundarySource {
    async fn fetch(&self) -> Result<FeatureCollection, OverlayError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(load_boundaries())
    }

    fn describe(&self) -> String {
        "fixture".to_string()
    }
}

/// Serves a dataset given inline as GeoJSON text
#[derive(Debug)]
pub struct InlineBoundarySource(String);

impl InlineBoundarySource {
    pub fn new(geojson: serde_json::Value) -> Self {
        Self(geojson.to_string())
    }
}

#[async_trait]
impl BoundarySource for InlineBoundarySource {
    async fn fetch(&self) -> Result<FeatureCollection, OverlayError> {
        parse_feature_collection(&self.0)
    }

    fn describe(&self) -> String {
        "inline".to_string()
    }
}

/// Always fails like an unreachable host
#[derive(Debug, Default)]
pub struct UnreachableBoundarySource;

#[async_trait]
impl BoundarySource for UnreachableBoundarySource {
    async fn fetch(&self) -> Result<FeatureCollection, OverlayError> {
        Err(OverlayError::Fetch {
            url: "https://boundaries.invalid/world.geo.json".to_string(),
            reason: "connection refused".to_string(),
        })
    }

    fn describe(&self) -> String {
        "unreachable".to_string()
    }
}

/// Never answers
#[derive(Debug, Default)]
pub struct HangingBoundarySource;

#[async_trait]
impl BoundarySource for HangingBoundarySource {
    async fn fetch(&self) -> Result<FeatureCollection, OverlayError> {
        std::future::pending().await
    }

    fn describe(&self) -> String {
        "hanging".to_string()
    }
}

/// Builds a controller on a fresh headless factory
pub fn controller(
    settings: MapSettings,
    boundaries: Arc<dyn BoundarySource>,
) -> (Arc<MapController>, HeadlessFactory, NavigationReceiver) {
    let factory = HeadlessFactory::new();
    let (controller, navigation) = MapController::builder(settings, Arc::new(factory.clone()))
        .boundaries(boundaries)
        .build();
    (Arc::new(controller), factory, navigation)
}
