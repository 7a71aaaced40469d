//! Per-scene classification stages and their orchestration

pub mod region;
pub mod scale;
pub mod quality;
pub mod smoothing;
pub mod segmentation;
pub mod labeling;
pub mod zonal;
pub mod classify;
pub mod selection;
pub mod pipeline;

// Re-export main types
pub use region::Region;
pub use scale::{normalized_difference, scale_band, Preprocessor};
pub use quality::{cloud_free_mask, count_valid, CloudAssessment, CloudGateParams, LandGateParams};
pub use smoothing::{gaussian_smooth, SmoothingParams};
pub use segmentation::{SegmentationParams, Segmenter, Snic};
pub use labeling::{ConnectedComponents, Patches};
pub use zonal::{patch_mean, patch_means};
pub use classify::{class_mask, ClassThresholds, Classifier};
pub use selection::{retain_passed, ExclusionList, SceneSelection, ISLE_VERTE_EXCLUSIONS};
pub use pipeline::{
    LoggingObserver, NoopObserver, Pipeline, PipelineConfig, PipelineObserver, PipelineOutput, Stage,
};
