//! Secondary per-country summary markers.
//!
//! Built only after the boundary overlay is attached, because summaries
//! without an explicit center are positioned on their country's polygon.

use crate::bridge::PopupKey;
use crate::markers::{Icon, MarkerRecord, PopupAction, PopupContent};
use crate::overlay::{bbox_center, StyledOverlay};
use async_trait::async_trait;
use nutrimap_core::error::OverlayError;
use nutrimap_core::CountrySummary;
use std::path::PathBuf;
use tracing::debug;

/// Source of per-country summaries.
#[async_trait]
pub trait SummarySource: Send + Sync {
    async fn load(&self) -> Result<Vec<CountrySummary>, OverlayError>;
}

/// Reads summaries from a JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSummarySource {
    path: PathBuf,
}

impl JsonFileSummarySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn error(&self, reason: impl ToString) -> OverlayError {
        OverlayError::Summaries {
            source_name: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl SummarySource for JsonFileSummarySource {
    async fn load(&self) -> Result<Vec<CountrySummary>, OverlayError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.error(e))?;
        serde_json::from_str(&text).map_err(|e| self.error(e))
    }
}

/// Fixed in-memory summaries.
#[derive(Debug, Clone, Default)]
pub struct StaticSummarySource(Vec<CountrySummary>);

impl StaticSummarySource {
    pub fn new(summaries: Vec<CountrySummary>) -> Self {
        Self(summaries)
    }
}

#[async_trait]
impl SummarySource for StaticSummarySource {
    async fn load(&self) -> Result<Vec<CountrySummary>, OverlayError> {
        Ok(self.0.clone())
    }
}

/// Popup for a summary marker.
pub fn summary_popup(summary: &CountrySummary) -> PopupContent {
    let mut lines = vec![format!("{} menu items", summary.total_items)];
    lines.extend(
        summary
            .categories
            .iter()
            .map(|(category, count)| format!("{}: {}", category, count)),
    );

    PopupContent {
        title: summary.name.clone(),
        lines,
        action: Some(PopupAction {
            label: "View analysis".to_string(),
            key: PopupKey::country(summary.id.clone()),
        }),
    }
}

/// One marker per summary that can be positioned, in input order.
///
/// The position is the summary's own center, or else the bounding box center
/// of the overlay feature named like the summary's id or name.
pub fn build_markers(
    summaries: &[CountrySummary],
    overlay: &StyledOverlay,
    color: &str,
) -> Vec<MarkerRecord> {
    summaries
        .iter()
        .filter_map(|summary| {
            let position = summary.center().or_else(|| {
                [summary.id.as_str(), summary.name.as_str()]
                    .into_iter()
                    .filter_map(|name| overlay.find(name))
                    .find_map(|feature| bbox_center(&feature.geometry))
            });

            let Some(position) = position else {
                debug!(country = %summary.id, "No position for country summary");
                return None;
            };

            Some(MarkerRecord {
                key: PopupKey::country(summary.id.clone()),
                position,
                icon: Icon::glyph(color),
                popup: summary_popup(summary),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{style_features, HighlightSet};
    use nutrimap_core::LatLng;
    use serde_json::json;

    fn summary(id: &str, name: &str, center: Option<[f64; 2]>) -> CountrySummary {
        CountrySummary {
            id: id.to_string(),
            name: name.to_string(),
            total_items: 3,
            categories: [("Burgers".to_string(), 2), ("Sides".to_string(), 1)]
                .into_iter()
                .collect(),
            center,
        }
    }

    fn overlay() -> StyledOverlay {
        let text = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"ADMIN": "India"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[70.0, 10.0], [90.0, 10.0], [90.0, 30.0], [70.0, 10.0]]]
                }
            }]
        })
        .to_string();
        let fc = crate::overlay::parse_feature_collection(&text).unwrap();
        style_features(fc, &HighlightSet::default())
    }

    #[test]
    fn test_positions() {
        let summaries = vec![
            summary("uk", "United Kingdom", Some([-2.0, 54.0])),
            summary("india", "India", None),
            summary("atlantis", "Atlantis", None),
        ];

        let markers = build_markers(&summaries, &overlay(), "#b30000");

        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].position, LatLng::new(54.0, -2.0));
        assert_eq!(markers[1].position, LatLng::new(20.0, 80.0));
        assert_eq!(markers[1].key, PopupKey::country("india"));
    }

    #[test]
    fn test_popup_lists_categories() {
        let popup = summary_popup(&summary("uk", "United Kingdom", None));
        assert_eq!(popup.title, "United Kingdom");
        assert_eq!(
            popup.lines,
            vec!["3 menu items", "Burgers: 2", "Sides: 1"]
        );
        assert_eq!(
            popup.action.unwrap().key.navigation_request().route(),
            "/analysis/uk"
        );
    }

    #[tokio::test]
    async fn test_missing_file() {
        let source = JsonFileSummarySource::new("/nonexistent/summaries.json");
        assert!(matches!(
            source.load().await,
            Err(OverlayError::Summaries { .. })
        ));
    }
}
