//! Scene viability gates: cloud-free coverage and emerged-land coverage
//!
//! The cloud gate runs right after preprocessing; the land gate can only run
//! once the emerged class exists, so the two checks sit at different points
//! of the pipeline.

use crate::types::{Band, RawBand, Scene, SceneResult, EMERGED};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// QA_PIXEL bits signalling cloud presence (CFMASK dilated cloud and cloud)
pub const CLOUD_BITS: [u32; 2] = [1, 3];

/// Cloud gate thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudGateParams {
    /// Post-mask valid pixels must exceed this count
    pub min_valid_pixels: usize,
    /// Post/pre valid ratio must exceed this fraction
    pub min_valid_fraction: f64,
    /// Band whose valid pixels are counted
    pub reference_band: String,
}

impl Default for CloudGateParams {
    fn default() -> Self {
        Self {
            min_valid_pixels: 20_000,
            min_valid_fraction: 0.5,
            reference_band: "red".to_string(),
        }
    }
}

/// Land gate threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandGateParams {
    /// Emerged pixels must exceed this count
    pub min_land_pixels: usize,
}

impl Default for LandGateParams {
    fn default() -> Self {
        Self {
            min_land_pixels: 20_000,
        }
    }
}

/// Outcome of the cloud gate for one scene
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloudAssessment {
    pub pre_mask_count: usize,
    pub post_mask_count: usize,
    /// `post / pre`, or 0 when the scene had no valid pixels at all
    pub valid_fraction: f64,
    pub passed: bool,
}

impl CloudGateParams {
    /// Both conditions use strict comparisons
    pub fn evaluate(&self, pre_mask_count: usize, post_mask_count: usize) -> CloudAssessment {
        let valid_fraction = if pre_mask_count == 0 {
            0.0
        } else {
            post_mask_count as f64 / pre_mask_count as f64
        };
        let passed =
            post_mask_count > self.min_valid_pixels && valid_fraction > self.min_valid_fraction;

        CloudAssessment {
            pre_mask_count,
            post_mask_count,
            valid_fraction,
            passed,
        }
    }

    /// Mask cloudy pixels on every band and evaluate the gate
    ///
    /// The scene must already be clipped to the region of interest, so the
    /// valid counts are counts within that region.
    pub fn assess(&self, scene: &Scene) -> SceneResult<(Scene, CloudAssessment)> {
        let pre = count_valid(scene.band(&self.reference_band)?);
        let clear = cloud_free_mask(scene.quality());
        let masked = scene.masked(&clear)?;
        let post = count_valid(masked.band(&self.reference_band)?);

        let assessment = self.evaluate(pre, post);
        log::debug!(
            "Cloud gate {}: pre={} post={} fraction={:.3} passed={}",
            scene.id(),
            pre,
            post,
            assessment.valid_fraction,
            assessment.passed
        );
        Ok((masked, assessment))
    }
}

impl LandGateParams {
    pub fn evaluate(&self, land_pixels: usize) -> bool {
        land_pixels > self.min_land_pixels
    }

    /// Count emerged pixels of a classified scene and evaluate the gate
    pub fn assess(&self, scene: &Scene) -> SceneResult<(usize, bool)> {
        let land = count_valid(scene.band(EMERGED)?);
        let passed = self.evaluate(land);
        log::debug!("Land gate {}: emerged={} passed={}", scene.id(), land, passed);
        Ok((land, passed))
    }
}

/// `true` where none of the cloud bits is set
pub fn cloud_free_mask(quality: &RawBand) -> Array2<bool> {
    let cloud_bits = CLOUD_BITS.iter().fold(0u16, |acc, bit| acc | (1u16 << bit));
    quality.mapv(|qa| qa & cloud_bits == 0)
}

/// Number of non-masked pixels
pub fn count_valid(band: &Band) -> usize {
    band.iter().filter(|v| v.is_finite()).count()
}
