use crate::types::{Band, SceneError, SceneResult};
use serde::{Deserialize, Serialize};

/// Gaussian smoothing parameters (pixels)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingParams {
    pub radius: usize,
    pub sigma: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            radius: 3,
            sigma: 1.0,
        }
    }
}

impl SmoothingParams {
    pub fn validate(&self) -> SceneResult<()> {
        if !(self.sigma > 0.0) || !self.sigma.is_finite() {
            return Err(SceneError::Config(format!(
                "Gaussian sigma must be positive, got {}",
                self.sigma
            )));
        }
        Ok(())
    }

    /// Normalized 1-D kernel of length `2 * radius + 1`
    fn kernel(&self) -> Vec<f64> {
        let r = self.radius as isize;
        let weights: Vec<f64> = (-r..=r)
            .map(|i| {
                let x = i as f64;
                (-x * x / (2.0 * self.sigma * self.sigma)).exp()
            })
            .collect();
        let total: f64 = weights.iter().sum();
        weights.into_iter().map(|w| w / total).collect()
    }
}

/// Separable Gaussian convolution that ignores masked pixels
///
/// Weights are renormalized over the valid neighbours, and masked pixels stay
/// masked in the output.
pub fn gaussian_smooth(band: &Band, params: &SmoothingParams) -> SceneResult<Band> {
    params.validate()?;
    if params.radius == 0 {
        return Ok(band.clone());
    }

    let kernel = params.kernel();
    let radius = params.radius as isize;
    let (rows, cols) = band.dim();

    // Horizontal pass
    let mut tmp = band.clone();
    for r in 0..rows {
        for c in 0..cols {
            if band[[r, c]].is_nan() {
                continue;
            }
            let mut sum = 0.0;
            let mut wsum = 0.0;
            for (ki, d) in (-radius..=radius).enumerate() {
                let cc = c as isize + d;
                if cc < 0 || cc >= cols as isize {
                    continue;
                }
                let v = band[[r, cc as usize]];
                if v.is_finite() {
                    sum += v as f64 * kernel[ki];
                    wsum += kernel[ki];
                }
            }
            if wsum > 0.0 {
                tmp[[r, c]] = (sum / wsum) as f32;
            }
        }
    }

    // Vertical pass
    let mut out = tmp.clone();
    for r in 0..rows {
        for c in 0..cols {
            if tmp[[r, c]].is_nan() {
                continue;
            }
            let mut sum = 0.0;
            let mut wsum = 0.0;
            for (ki, d) in (-radius..=radius).enumerate() {
                let rr = r as isize + d;
                if rr < 0 || rr >= rows as isize {
                    continue;
                }
                let v = tmp[[rr as usize, c]];
                if v.is_finite() {
                    sum += v as f64 * kernel[ki];
                    wsum += kernel[ki];
                }
            }
            if wsum > 0.0 {
                out[[r, c]] = (sum / wsum) as f32;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    #[test]
    fn test_constant_image_unchanged() {
        let band = Array2::from_elem((9, 9), 0.25f32);
        let smoothed = gaussian_smooth(&band, &SmoothingParams::default()).unwrap();
        for v in smoothed.iter() {
            assert_abs_diff_eq!(*v, 0.25, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_masked_pixels_preserved_and_ignored() {
        let mut band = Array2::from_elem((7, 7), 1.0f32);
        band[[3, 3]] = f32::NAN;
        band[[0, 6]] = 100.0;
        let smoothed = gaussian_smooth(&band, &SmoothingParams::default()).unwrap();

        assert!(smoothed[[3, 3]].is_nan());
        // the neighbour of the hole only sees ones
        assert_abs_diff_eq!(smoothed[[3, 2]], 1.0, epsilon = 1e-6);
        assert!(smoothed[[0, 6]] < 100.0);
        assert!(smoothed[[0, 5]] > 1.0);
    }

    #[test]
    fn test_kernel_normalized() {
        let kernel = SmoothingParams::default().kernel();
        assert_eq!(kernel.len(), 7);
        assert_abs_diff_eq!(kernel.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_sigma() {
        let params = SmoothingParams { radius: 3, sigma: 0.0 };
        assert!(gaussian_smooth(&Array2::zeros((3, 3)), &params).is_err());
    }
}
