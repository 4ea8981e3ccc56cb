//! # NutriMap Core
//!
//! Core types, error handling, and configuration for the NutriMap world map.
//!
//! This crate provides the foundational building blocks shared by the map
//! subsystem and the command line front end:
//!
//! - **Types**: location records as supplied by the dataset collaborator,
//!   selection hints, per-country summaries and navigation requests.
//! - **Errors**: the failure taxonomy of the map subsystem, built with `thiserror`.
//! - **Configuration**: YAML files with `NUTRIMAP__` environment overrides and
//!   validation.
//!
//! ## Example
//!
//! ```
//! use nutrimap_core::types::{LocationRecord, SelectionId};
//!
//! let record: LocationRecord = serde_json::from_str(
//!     r#"{"id": "loc-ldn-1", "title": "Riverside Grill", "coordinates": [-0.1276, 51.5074]}"#,
//! )
//! .unwrap();
//!
//! let selection = SelectionId::from("loc-ldn-1");
//! assert_eq!(selection.location_id(), &record.id);
//! ```

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use error::{MapError, Result};
pub use types::{
    CountrySummary, LatLng, LocationId, LocationRecord, NavigationRequest, SelectionId,
};
