//! Basemap tile provider selection.

use nutrimap_core::config::usable_token;
use serde::{Deserialize, Serialize};

/// Which kind of provider was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Token-authenticated styled tiles
    Branded,
    /// Open tiles that need no token
    Fallback,
}

/// Descriptor of a basemap tile source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileProviderConfig {
    pub kind: ProviderKind,
    pub url_template: String,
    pub max_zoom: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_offset: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomains: Option<String>,
    pub attribution: String,
}

const OSM_ATTRIBUTION: &str =
    "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors";

/// Picks the basemap for a surface.
///
/// `token` is the raw configured access token. Absent, blank, or placeholder
/// tokens select the open fallback; anything else selects the branded provider
/// with 512px tiles, which need a zoom offset of -1 to line up with the
/// 256px tile grid.
pub fn select_provider(token: Option<&str>) -> TileProviderConfig {
    match usable_token(token) {
        Some(token) => TileProviderConfig {
            kind: ProviderKind::Branded,
            url_template: format!(
                "https://api.mapbox.com/styles/v1/mapbox/light-v11/tiles/{{z}}/{{x}}/{{y}}?access_token={}",
                token
            ),
            max_zoom: 20,
            tile_size: Some(512),
            zoom_offset: Some(-1),
            subdomains: None,
            attribution: format!(
                "&copy; <a href=\"https://www.mapbox.com/about/maps/\">Mapbox</a> {}",
                OSM_ATTRIBUTION
            ),
        },
        None => TileProviderConfig {
            kind: ProviderKind::Fallback,
            url_template: "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png"
                .to_string(),
            max_zoom: 19,
            tile_size: None,
            zoom_offset: None,
            subdomains: Some("abcd".to_string()),
            attribution: format!(
                "{} &copy; <a href=\"https://carto.com/attributions\">CARTO</a>",
                OSM_ATTRIBUTION
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_token_selects_fallback() {
        let provider = select_provider(None);
        assert_eq!(provider.kind, ProviderKind::Fallback);
        assert!(provider.url_template.contains("cartocdn"));
        assert_eq!(provider.zoom_offset, None);
        assert_eq!(provider.subdomains.as_deref(), Some("abcd"));
    }

    #[test]
    fn test_placeholder_and_blank_tokens() {
        assert_eq!(
            select_provider(Some("REPLACE_WITH_TOKEN")).kind,
            ProviderKind::Fallback
        );
        assert_eq!(select_provider(Some("")).kind, ProviderKind::Fallback);
        assert_eq!(select_provider(Some("  ")).kind, ProviderKind::Fallback);
    }

    #[test]
    fn test_real_token_selects_branded() {
        let provider = select_provider(Some("abc123"));
        assert_eq!(provider.kind, ProviderKind::Branded);
        assert!(provider.url_template.ends_with("access_token=abc123"));
        assert!(provider.url_template.contains("{z}/{x}/{y}"));
        assert_eq!(provider.tile_size, Some(512));
        assert_eq!(provider.zoom_offset, Some(-1));
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(select_provider(Some("abc123")), select_provider(Some("abc123")));
        assert_eq!(select_provider(None), select_provider(None));
    }
}
