//! The configuration and datasets shipped with the workspace must stay loadable

use nutrimap_core::config::{AppConfig, LogFormat};
use nutrimap_core::{CountrySummary, LocationRecord};
use std::path::PathBuf;

fn workspace_file(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(relative)
}

#[test]
fn test_shipped_config_is_valid() {
    let config = AppConfig::from_file(workspace_file("config/nutrimap.yaml"))
        .expect("Failed to load shipped config");

    config.validate().expect("Shipped config should validate");
    assert_eq!(config.map.effective_token(), None);
    assert_eq!(config.readiness.max_attempts, 20);
    assert!(config.readiness.proceed_when_unsized);
    assert_eq!(config.revalidation.delays_ms, vec![100, 500, 1000, 2000, 4000]);
    assert_eq!(config.overlay.highlight.len(), 8);
    assert_eq!(config.logging.format, LogFormat::Text);
}

#[test]
fn test_shipped_locations_parse() {
    let content = std::fs::read_to_string(workspace_file("data/locations.json"))
        .expect("Failed to read locations");
    let locations: Vec<LocationRecord> =
        serde_json::from_str(&content).expect("Failed to parse locations");

    assert_eq!(locations.len(), 9);
    assert!(locations.iter().any(|l| l.id.as_str() == "9001"));
    assert_eq!(locations[2].brand_hint(), "McDonald's");
}

#[test]
fn test_shipped_summaries_parse() {
    let content = std::fs::read_to_string(workspace_file("data/country_summaries.json"))
        .expect("Failed to read summaries");
    let summaries: Vec<CountrySummary> =
        serde_json::from_str(&content).expect("Failed to parse summaries");

    assert_eq!(summaries.len(), 5);
    assert!(summaries[0].center().is_some());
    assert!(summaries[1].center().is_none());
}
