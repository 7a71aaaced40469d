use crate::core::region::Region;
use crate::types::{
    Band, BandValue, RawBand, RawScene, Scene, SceneError, SceneResult, FILL_VALUE, NDMI, NDVI,
    OPTICAL_BANDS,
};
use ndarray::{Array2, Zip};
use num_traits::Float;
use std::collections::BTreeMap;

/// Converts raw digital numbers to surface reflectance and derives spectral indices
#[derive(Debug, Clone, Default)]
pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Scale the optical bands, mask outside `region` and append NDVI / NDMI
    pub fn preprocess(&self, raw: &RawScene, region: &Region) -> SceneResult<Scene> {
        let scene = self.scale_optical(raw, region)?;
        log::debug!("Deriving spectral indices for {}", scene.id());

        let ndvi = normalized_difference(scene.band("nir")?, scene.band("red")?);
        let ndmi = normalized_difference(scene.band("nir")?, scene.band("swir1")?);

        scene.with_band(NDVI, ndvi)?.with_band(NDMI, ndmi)
    }

    /// Scale the optical bands and mask outside `region`; raw bands are not retained
    pub fn scale_optical(&self, raw: &RawScene, region: &Region) -> SceneResult<Scene> {
        let resolved = resolve_optical_bands(raw)?;
        let dim = raw.quality.dim();
        let inside = region.rasterize(dim, &raw.geo_transform);
        if !inside.iter().any(|&keep| keep) {
            log::warn!(
                "Region does not overlap the grid of {}; every pixel is masked",
                raw.metadata.id
            );
        }
        let (slope, bias) = raw.metadata.sensor.reflectance_scale();

        let mut bands = BTreeMap::new();
        for (name, band) in OPTICAL_BANDS.iter().zip(resolved) {
            let mut scaled = scale_band(band, slope, bias);
            Zip::from(&mut scaled).and(&inside).for_each(|v, &keep| {
                if !keep {
                    *v = BandValue::NAN;
                }
            });
            bands.insert(name.to_string(), scaled);
        }

        log::debug!(
            "Scaled {} ({}) with slope {} bias {}",
            raw.metadata.id,
            raw.metadata.sensor,
            slope,
            bias
        );

        Scene::new(raw.metadata.clone(), bands, raw.quality.clone(), raw.geo_transform)
    }
}

/// Look up the six optical bands by common name, falling back to native keys
fn resolve_optical_bands(raw: &RawScene) -> SceneResult<Vec<&RawBand>> {
    let native = raw.metadata.sensor.native_band_keys();
    let expected = raw.quality.dim();
    let mut out = Vec::with_capacity(OPTICAL_BANDS.len());

    for (common, key) in OPTICAL_BANDS.iter().zip(native) {
        let band = raw
            .bands
            .get(*common)
            .or_else(|| raw.bands.get(key))
            .ok_or_else(|| SceneError::MissingBand {
                scene: raw.metadata.id.to_string(),
                band: format!("{} ({})", common, key),
            })?;
        if band.dim() != expected {
            return Err(SceneError::ShapeMismatch {
                scene: raw.metadata.id.to_string(),
                band: common.to_string(),
                expected,
                found: band.dim(),
            });
        }
        out.push(band);
    }
    Ok(out)
}

/// `value * slope + bias`; fill pixels become NaN
pub fn scale_band(raw: &RawBand, slope: f32, bias: f32) -> Band {
    raw.mapv(|dn| {
        if dn == FILL_VALUE {
            BandValue::NAN
        } else {
            dn as f32 * slope + bias
        }
    })
}

/// `(a - b) / (a + b)`, clamped to [-1, 1]
///
/// Pixels where either input is masked or the denominator is exactly zero
/// are NaN. Reflectances can be slightly negative after the bias is applied,
/// which would otherwise push the ratio outside the index range.
pub fn normalized_difference<T: Float>(a: &Array2<T>, b: &Array2<T>) -> Array2<T> {
    Zip::from(a).and(b).map_collect(|&a, &b| {
        let sum = a + b;
        if a.is_nan() || b.is_nan() || sum == T::zero() {
            T::nan()
        } else {
            ((a - b) / sum).max(-T::one()).min(T::one())
        }
    })
}
