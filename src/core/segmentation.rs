//! Seed-grown superpixel segmentation
//!
//! [`Segmenter`] is the strategy seam: anything that turns a band stack into a
//! cluster map can replace [`Snic`] without touching the rest of the pipeline.

use crate::types::{LabelMap, SceneError, SceneResult};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Turns a stack of co-registered bands into a cluster-label image
pub trait Segmenter: Send + Sync {
    /// Cluster id per pixel, `0` where any input band is masked
    fn segment(&self, bands: &[ArrayView2<'_, f32>]) -> SceneResult<LabelMap>;

    fn name(&self) -> &'static str;
}

/// Segmentation and patch-labeling parameters for one classification pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationParams {
    /// Distance between grid seeds (pixels)
    pub seed_spacing: usize,
    /// Maximum reach of a cluster from its seed (pixels)
    pub neighborhood_size: usize,
    /// Weight of spatial distance; 0 clusters on value similarity only
    pub compactness: f64,
    /// Largest connected patch emitted by the labeler (pixels)
    pub max_patch_size: usize,
}

impl SegmentationParams {
    /// Coarse grid used for the emerged-area pass
    pub fn emerged() -> Self {
        Self {
            seed_spacing: 11,
            neighborhood_size: 22,
            compactness: 0.0,
            max_patch_size: 128,
        }
    }

    /// Finer grid used for the eelgrass pass
    pub fn eelgrass() -> Self {
        Self {
            seed_spacing: 8,
            neighborhood_size: 16,
            ..Self::emerged()
        }
    }

    pub fn validate(&self) -> SceneResult<()> {
        if self.seed_spacing == 0 {
            return Err(SceneError::Config("Seed spacing must be positive".to_string()));
        }
        if self.neighborhood_size < self.seed_spacing {
            return Err(SceneError::Config(format!(
                "Neighborhood size {} is smaller than seed spacing {}",
                self.neighborhood_size, self.seed_spacing
            )));
        }
        if !(self.compactness >= 0.0) {
            return Err(SceneError::Config(format!(
                "Compactness must be non-negative, got {}",
                self.compactness
            )));
        }
        if self.max_patch_size == 0 {
            return Err(SceneError::Config("Maximum patch size must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self::emerged()
    }
}

/// Simple Non-Iterative Clustering over a regular seed grid, 4-connected
#[derive(Debug, Clone)]
pub struct Snic {
    seed_spacing: usize,
    neighborhood_size: usize,
    compactness: f64,
}

impl Snic {
    pub fn new(params: &SegmentationParams) -> SceneResult<Self> {
        params.validate()?;
        Ok(Self {
            seed_spacing: params.seed_spacing,
            neighborhood_size: params.neighborhood_size,
            compactness: params.compactness,
        })
    }

    /// Seed positions: grid centred in each `spacing x spacing` cell
    fn seed_grid(&self, rows: usize, cols: usize) -> Vec<(usize, usize)> {
        let offset = self.seed_spacing / 2;
        let mut seeds = Vec::new();
        for r in (offset..rows).step_by(self.seed_spacing) {
            for c in (offset..cols).step_by(self.seed_spacing) {
                seeds.push((r, c));
            }
        }
        seeds
    }
}

/// Running centroid of one cluster
struct Cluster {
    seed: (usize, usize),
    feature_sum: Vec<f64>,
    row_sum: f64,
    col_sum: f64,
    count: usize,
}

impl Cluster {
    fn new(seed: (usize, usize), bands: usize) -> Self {
        Self {
            seed,
            feature_sum: vec![0.0; bands],
            row_sum: 0.0,
            col_sum: 0.0,
            count: 0,
        }
    }

    fn add(&mut self, row: usize, col: usize, features: &[f64]) {
        for (sum, f) in self.feature_sum.iter_mut().zip(features) {
            *sum += f;
        }
        self.row_sum += row as f64;
        self.col_sum += col as f64;
        self.count += 1;
    }

    fn within_reach(&self, row: usize, col: usize, reach: usize) -> bool {
        row.abs_diff(self.seed.0) <= reach && col.abs_diff(self.seed.1) <= reach
    }
}

/// Queue element; ties on distance resolve in insertion order
struct Candidate {
    distance: f64,
    order: u64,
    row: usize,
    col: usize,
    cluster: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.order.cmp(&other.order))
    }
}

/// Band values of every pixel in one contiguous buffer, pixel-major
struct FeatureStack {
    values: Vec<f64>,
    valid: Array2<bool>,
    bands: usize,
    cols: usize,
}

impl FeatureStack {
    fn new(bands: &[ArrayView2<'_, f32>], dim: (usize, usize)) -> Self {
        let (rows, cols) = dim;
        let mut values = Vec::with_capacity(rows * cols * bands.len());
        let mut valid = Array2::from_elem(dim, true);
        for r in 0..rows {
            for c in 0..cols {
                for band in bands {
                    let v = band[[r, c]] as f64;
                    if !v.is_finite() {
                        valid[[r, c]] = false;
                    }
                    values.push(v);
                }
            }
        }
        Self {
            values,
            valid,
            bands: bands.len(),
            cols,
        }
    }

    /// Feature slice at `(row, col)`; None where any band is masked
    fn get(&self, row: usize, col: usize) -> Option<&[f64]> {
        if !self.valid[[row, col]] {
            return None;
        }
        let start = (row * self.cols + col) * self.bands;
        Some(&self.values[start..start + self.bands])
    }

    fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid[[row, col]]
    }
}

struct Growth<'a> {
    features: &'a FeatureStack,
    labels: LabelMap,
    clusters: Vec<Cluster>,
    heap: BinaryHeap<Reverse<Candidate>>,
    order: u64,
    spatial_weight: f64,
    reach: usize,
}

impl<'a> Growth<'a> {
    fn push(&mut self, row: usize, col: usize, cluster: u32, distance: f64) {
        self.heap.push(Reverse(Candidate {
            distance,
            order: self.order,
            row,
            col,
            cluster,
        }));
        self.order += 1;
    }

    fn seed(&mut self, row: usize, col: usize) {
        self.clusters.push(Cluster::new((row, col), self.features.bands));
        let id = self.clusters.len() as u32;
        self.push(row, col, id, 0.0);
    }

    fn distance(&self, cluster: &Cluster, row: usize, col: usize, features: &[f64]) -> f64 {
        let n = cluster.count as f64;
        let value: f64 = cluster
            .feature_sum
            .iter()
            .zip(features)
            .map(|(sum, f)| {
                let d = f - sum / n;
                d * d
            })
            .sum();
        if self.spatial_weight == 0.0 {
            return value;
        }
        let dr = row as f64 - cluster.row_sum / n;
        let dc = col as f64 - cluster.col_sum / n;
        value + self.spatial_weight * (dr * dr + dc * dc)
    }

    fn grow(&mut self) {
        let (rows, cols) = self.labels.dim();
        let features = self.features;
        while let Some(Reverse(candidate)) = self.heap.pop() {
            let (r, c) = (candidate.row, candidate.col);
            if self.labels[[r, c]] != 0 {
                continue;
            }
            let Some(values) = features.get(r, c) else {
                continue;
            };
            let k = candidate.cluster;
            self.labels[[r, c]] = k;
            self.clusters[(k - 1) as usize].add(r, c, values);

            let neighbors = [
                (r.wrapping_sub(1), c),
                (r + 1, c),
                (r, c.wrapping_sub(1)),
                (r, c + 1),
            ];
            for (nr, nc) in neighbors {
                if nr >= rows || nc >= cols || self.labels[[nr, nc]] != 0 {
                    continue;
                }
                let Some(nf) = features.get(nr, nc) else {
                    continue;
                };
                let cluster = &self.clusters[(k - 1) as usize];
                if !cluster.within_reach(nr, nc, self.reach) {
                    continue;
                }
                let d = self.distance(cluster, nr, nc, nf);
                self.push(nr, nc, k, d);
            }
        }
    }
}

impl Segmenter for Snic {
    fn segment(&self, bands: &[ArrayView2<'_, f32>]) -> SceneResult<LabelMap> {
        let first = bands
            .first()
            .ok_or_else(|| SceneError::Processing("Segmentation needs at least one band".to_string()))?;
        let dim = first.dim();
        if let Some(bad) = bands.iter().find(|b| b.dim() != dim) {
            return Err(SceneError::Processing(format!(
                "Segmentation bands differ in shape: {:?} vs {:?}",
                dim,
                bad.dim()
            )));
        }

        let features = FeatureStack::new(bands, dim);

        let spacing = self.seed_spacing as f64;
        let mut growth = Growth {
            features: &features,
            labels: Array2::zeros(dim),
            clusters: Vec::new(),
            heap: BinaryHeap::new(),
            order: 0,
            spatial_weight: self.compactness / (spacing * spacing),
            reach: self.neighborhood_size,
        };

        for (r, c) in self.seed_grid(dim.0, dim.1) {
            if features.is_valid(r, c) {
                growth.seed(r, c);
            }
        }
        let grid_clusters = growth.clusters.len();
        growth.grow();

        // Valid pixels no grid cluster could reach start clusters of their own
        for r in 0..dim.0 {
            for c in 0..dim.1 {
                if growth.labels[[r, c]] == 0 && features.is_valid(r, c) {
                    growth.seed(r, c);
                    growth.grow();
                }
            }
        }

        log::debug!(
            "SNIC: {} grid clusters, {} extra clusters on {}x{} grid",
            grid_clusters,
            growth.clusters.len() - grid_clusters,
            dim.0,
            dim.1
        );
        Ok(growth.labels)
    }

    fn name(&self) -> &'static str {
        "snic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_halves(rows: usize, cols: usize) -> Array2<f32> {
        Array2::from_shape_fn((rows, cols), |(_, c)| if c < cols / 2 { 0.1 } else { 0.9 })
    }

    #[test]
    fn test_every_valid_pixel_clustered() {
        let mut image = two_halves(23, 31);
        image[[5, 5]] = f32::NAN;
        let snic = Snic::new(&SegmentationParams::emerged()).unwrap();
        let labels = snic.segment(&[image.view()]).unwrap();

        assert_eq!(labels.dim(), (23, 31));
        assert_eq!(labels[[5, 5]], 0);
        let unlabeled = labels.iter().filter(|&&l| l == 0).count();
        assert_eq!(unlabeled, 1);
    }

    #[test]
    fn test_clusters_respect_value_edges() {
        let image = two_halves(16, 32);
        let snic = Snic::new(&SegmentationParams::eelgrass()).unwrap();
        let labels = snic.segment(&[image.view()]).unwrap();

        for r in 0..16 {
            for c in 0..16 {
                for c2 in 16..32 {
                    assert_ne!(labels[[r, c]], labels[[r, c2]]);
                }
            }
        }
    }

    #[test]
    fn test_isolated_region_gets_own_cluster() {
        // a valid island surrounded by masked pixels, away from every seed
        let mut image = Array2::from_elem((20, 20), f32::NAN);
        image[[0, 0]] = 0.3;
        image[[0, 1]] = 0.3;
        let snic = Snic::new(&SegmentationParams::eelgrass()).unwrap();
        let labels = snic.segment(&[image.view()]).unwrap();

        assert_ne!(labels[[0, 0]], 0);
        assert_eq!(labels[[0, 0]], labels[[0, 1]]);
    }

    #[test]
    fn test_feature_stack_layout() {
        let a = Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) as f32);
        let mut b = Array2::from_shape_fn((3, 4), |(r, c)| -((r * 4 + c) as f32));
        b[[1, 2]] = f32::NAN;
        let stack = FeatureStack::new(&[a.view(), b.view()], (3, 4));

        assert_eq!(stack.values.len(), 3 * 4 * 2);
        assert_eq!(stack.get(2, 3), Some(&[11.0, -11.0][..]));
        assert_eq!(stack.get(0, 1), Some(&[1.0, -1.0][..]));
        assert!(stack.get(1, 2).is_none());
        assert!(!stack.is_valid(1, 2));
        assert_eq!(stack.valid.iter().filter(|&&v| !v).count(), 1);
    }

    #[test]
    fn test_multiband_stack_splits_on_any_band() {
        // first band is flat; only the second band carries the edge
        let flat = Array2::from_elem((16, 32), 0.5f32);
        let mut edge = two_halves(16, 32);
        edge[[3, 20]] = f32::NAN;
        let snic = Snic::new(&SegmentationParams::eelgrass()).unwrap();
        let labels = snic.segment(&[flat.view(), edge.view()]).unwrap();

        assert_eq!(labels[[3, 20]], 0);
        assert_eq!(labels.iter().filter(|&&l| l == 0).count(), 1);
        for r in 0..16 {
            assert_ne!(labels[[r, 15]], labels[[r, 16]]);
        }
    }

    #[test]
    fn test_deterministic() {
        let image = Array2::from_shape_fn((30, 30), |(r, c)| ((r * 7 + c * 13) % 11) as f32 / 11.0);
        let snic = Snic::new(&SegmentationParams::emerged()).unwrap();
        let a = snic.segment(&[image.view()]).unwrap();
        let b = snic.segment(&[image.view()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_params() {
        let params = SegmentationParams {
            seed_spacing: 10,
            neighborhood_size: 5,
            ..SegmentationParams::emerged()
        };
        assert!(Snic::new(&params).is_err());

        let snic = Snic::new(&SegmentationParams::emerged()).unwrap();
        let a = Array2::<f32>::zeros((4, 4));
        let b = Array2::<f32>::zeros((4, 5));
        assert!(snic.segment(&[a.view(), b.view()]).is_err());
        assert!(snic.segment(&[]).is_err());
    }
}
