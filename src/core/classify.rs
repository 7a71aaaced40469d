use crate::types::{Band, BandValue, SceneError, SceneResult};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Value written to a self-masked class band where the class holds
pub const CLASS_PRESENT: BandValue = 1.0;

/// Patch-mean thresholds for the emerged and eelgrass classes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassThresholds {
    /// Minimum mean NIR reflectance of an emerged patch
    pub nircut: f32,
    /// Minimum mean NDVI of an eelgrass patch
    pub ndvicut: f32,
    /// Maximum mean red reflectance of an eelgrass patch
    pub redcut: f32,
    /// Minimum mean NDMI of an eelgrass patch
    pub ndmicut: f32,
}

impl Default for ClassThresholds {
    fn default() -> Self {
        Self {
            nircut: 0.05,
            ndvicut: 0.4,
            redcut: 0.04,
            ndmicut: 0.4,
        }
    }
}

/// Threshold classifier over zonally averaged bands
///
/// Outputs are self-masked: `1.0` where the rule holds, NaN elsewhere
/// (including wherever an input is masked).
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    thresholds: ClassThresholds,
}

impl Classifier {
    pub fn new(thresholds: ClassThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ClassThresholds {
        &self.thresholds
    }

    /// `mean_nir >= nircut`
    pub fn emerged(&self, mean_nir: &Band) -> Band {
        let cut = self.thresholds.nircut;
        mean_nir.mapv(|nir| if nir >= cut { CLASS_PRESENT } else { BandValue::NAN })
    }

    /// `ndvi >= ndvicut && red <= redcut && ndmi >= ndmicut`
    pub fn eelgrass(&self, mean_ndvi: &Band, mean_red: &Band, mean_ndmi: &Band) -> SceneResult<Band> {
        let dim = mean_ndvi.dim();
        if mean_red.dim() != dim || mean_ndmi.dim() != dim {
            return Err(SceneError::Processing(format!(
                "Eelgrass inputs differ in shape: NDVI {:?}, red {:?}, NDMI {:?}",
                dim,
                mean_red.dim(),
                mean_ndmi.dim()
            )));
        }

        let t = self.thresholds;
        Ok(Zip::from(mean_ndvi)
            .and(mean_red)
            .and(mean_ndmi)
            .map_collect(|&ndvi, &red, &ndmi| {
                // NaN fails every comparison, so masked inputs stay masked
                if ndvi >= t.ndvicut && red <= t.redcut && ndmi >= t.ndmicut {
                    CLASS_PRESENT
                } else {
                    BandValue::NAN
                }
            }))
    }
}

/// Pixels retained by a self-masked class band
pub fn class_mask(band: &Band) -> Array2<bool> {
    band.mapv(|v| v.is_finite())
}
