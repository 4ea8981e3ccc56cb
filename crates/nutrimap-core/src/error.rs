//! Error types for the NutriMap map subsystem.
//!
//! Every failure mode of the map is represented here, but none of them is
//! fatal to the hosting application: the controller logs them and degrades.
//! The variants exist so that components can report *what* went wrong to the
//! log and to tests, not so that hosts have to handle them.

use thiserror::Error;

/// Result type alias using MapError as the error type.
pub type Result<T> = std::result::Result<T, MapError>;

/// Top-level error type for all map operations.
#[derive(Debug, Error)]
pub enum MapError {
    /// The container never reached a nonzero size within the retry budget
    #[error("Container not ready after {attempts} attempts (last size {width}x{height})")]
    InitializationTimeout {
        attempts: u32,
        width: u32,
        height: u32,
    },

    /// The container reference never became available
    #[error("Container not found after {attempts} attempts")]
    ContainerMissing { attempts: u32 },

    /// Surface or basemap creation failed
    #[error("Surface initialization failed: {0}")]
    SurfaceInit(#[from] SurfaceError),

    /// Boundary overlay could not be loaded or styled
    #[error("Overlay error: {0}")]
    Overlay(#[from] OverlayError),

    /// A location's coordinates could not be resolved
    #[error("Invalid coordinates for location '{location_id}': {reason}")]
    MarkerCoordinateInvalid { location_id: String, reason: String },

    /// Popup action binding failed
    #[error("Popup binding error: {0}")]
    PopupBinding(#[from] BindingError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl MapError {
    /// Creates a coordinate error for a location.
    pub fn invalid_coordinates(location_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MarkerCoordinateInvalid {
            location_id: location_id.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by a rendering surface implementation.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The surface could not be created inside the container
    #[error("Failed to create surface: {reason}")]
    CreateFailed { reason: String },

    /// The basemap tile layer could not be attached
    #[error("Failed to attach tile layer '{url_template}': {reason}")]
    TileLayerFailed { url_template: String, reason: String },

    /// A control (scale bar, zoom buttons) could not be added
    #[error("Failed to add control '{control}': {reason}")]
    ControlFailed { control: String, reason: String },
}

impl SurfaceError {
    /// Creates a surface creation error.
    pub fn create_failed(reason: impl Into<String>) -> Self {
        Self::CreateFailed {
            reason: reason.into(),
        }
    }
}

/// Errors while fetching, parsing or styling the boundary overlay.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Network-level failure
    #[error("Failed to fetch boundaries from {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Server responded with a non-success status
    #[error("Boundary request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Response body is not valid GeoJSON
    #[error("Malformed boundary dataset: {reason}")]
    Malformed { reason: String },

    /// GeoJSON parsed but is not a FeatureCollection
    #[error("Expected a FeatureCollection, got {found}")]
    NotAFeatureCollection { found: String },

    /// The fetch did not complete within the configured timeout
    #[error("Boundary fetch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Country summary dataset could not be loaded
    #[error("Failed to load country summaries from {source_name}: {reason}")]
    Summaries { source_name: String, reason: String },
}

impl OverlayError {
    /// Creates a malformed-dataset error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Errors while binding or firing a popup call-to-action.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingError {
    /// No marker with that key exists in the current layers
    #[error("No popup registered for '{key}'")]
    UnknownPopup { key: String },

    /// The popup has no call-to-action control
    #[error("Popup '{key}' has no action control")]
    MissingControl { key: String },

    /// The action fired without a preceding popup-open
    #[error("Popup '{key}' is not open")]
    NotArmed { key: String },

    /// The navigation receiver has gone away
    #[error("Navigation dispatch failed for '{key}': receiver closed")]
    DispatchFailed { key: String },
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = MapError::InitializationTimeout {
            attempts: 20,
            width: 0,
            height: 0,
        };
        let display = err.to_string();
        assert!(display.contains("20 attempts"));
        assert!(display.contains("0x0"));
    }

    #[test]
    fn test_overlay_error_conversion() {
        let err: MapError = OverlayError::malformed("unexpected token").into();
        assert!(matches!(err, MapError::Overlay(OverlayError::Malformed { .. })));
        assert!(err.to_string().contains("unexpected token"));
    }

    #[test]
    fn test_surface_error_conversion() {
        let err: MapError = SurfaceError::create_failed("no canvas").into();
        assert!(matches!(err, MapError::SurfaceInit(_)));
    }

    #[test]
    fn test_invalid_coordinates_helper() {
        let err = MapError::invalid_coordinates("b", "latitude is not finite");
        assert!(matches!(err, MapError::MarkerCoordinateInvalid { .. }));
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn test_binding_error_display() {
        let err = BindingError::MissingControl {
            key: "loc-1".to_string(),
        };
        assert_eq!(err.to_string(), "Popup 'loc-1' has no action control");
    }
}
