//! seagrass: emerged-area and eelgrass classification of Landsat scene series
//!
//! Decades of Landsat surface-reflectance scenes over an intertidal area are
//! scaled, gated on cloud-free and emerged coverage, segmented into patches
//! and classified per patch into two self-masked bands, `emerged` and
//! `eelgrass`.

pub mod types;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    Band, LabelMap, RawBand, RawScene, Scene, SceneError, SceneId, SceneMetadata, SceneResult,
    SceneSeries, SelectionFlags, Sensor,
};

pub use io::{CatalogFilter, InMemorySource, MetadataReader, SceneSource};
pub use crate::core::{Pipeline, PipelineConfig, PipelineOutput, Region};
