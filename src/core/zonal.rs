//! Per-patch mean aggregation broadcast back onto the pixel grid

use crate::core::labeling::Patches;
use crate::types::{Band, BandValue, SceneError, SceneResult};

/// Mean of `values` over each patch, written back to every pixel of the patch
///
/// Masked values do not contribute to a patch mean. Unlabeled pixels, and
/// patches whose pixels are all masked in `values`, come out masked.
pub fn patch_mean(patches: &Patches, values: &Band) -> SceneResult<Band> {
    if patches.labels.dim() != values.dim() {
        return Err(SceneError::Processing(format!(
            "Label map {:?} and value band {:?} differ in shape",
            patches.labels.dim(),
            values.dim()
        )));
    }

    let mut sums = vec![0.0f64; patches.count + 1];
    let mut counts = vec![0usize; patches.count + 1];

    for (&label, &v) in patches.labels.iter().zip(values.iter()) {
        if label == 0 || !v.is_finite() {
            continue;
        }
        let idx = label as usize;
        if idx > patches.count {
            return Err(SceneError::Processing(format!(
                "Patch id {} exceeds patch count {}",
                label, patches.count
            )));
        }
        sums[idx] += v as f64;
        counts[idx] += 1;
    }

    let means: Vec<BandValue> = sums
        .iter()
        .zip(&counts)
        .map(|(&sum, &n)| {
            if n == 0 {
                BandValue::NAN
            } else {
                (sum / n as f64) as BandValue
            }
        })
        .collect();

    Ok(patches.labels.mapv(|label| {
        if label == 0 {
            BandValue::NAN
        } else {
            means[label as usize]
        }
    }))
}

/// [`patch_mean`] over several bands; bands are independent so they run in parallel
pub fn patch_means<'b>(
    patches: &Patches,
    bands: &[(&'b str, &Band)],
) -> SceneResult<Vec<(&'b str, Band)>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        bands
            .par_iter()
            .map(|&(name, band)| Ok((name, patch_mean(patches, band)?)))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        bands
            .iter()
            .map(|&(name, band)| Ok((name, patch_mean(patches, band)?)))
            .collect()
    }
}
