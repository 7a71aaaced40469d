//! Connected-component labeling of segmentation clusters with a size cap

use crate::types::{LabelMap, SceneError, SceneResult};
use ndarray::Array2;
use std::collections::VecDeque;

/// Default largest patch, in pixels
pub const DEFAULT_MAX_PATCH_SIZE: usize = 128;

/// 4-connected ("plus" kernel) offsets
const PLUS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Labeled patch map
#[derive(Debug, Clone, PartialEq)]
pub struct Patches {
    /// Patch id per pixel (1..=count), 0 where unlabeled
    pub labels: LabelMap,
    pub count: usize,
}

impl Patches {
    /// Pixel count of every patch, indexed by patch id (index 0 is unused)
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.count + 1];
        for &l in self.labels.iter() {
            if l != 0 {
                sizes[l as usize] += 1;
            }
        }
        sizes
    }
}

/// Assigns unique ids to 4-connected groups of equal cluster values
///
/// Groups larger than `max_size` are split in scan order: a breadth-first
/// fill stops once the patch is full and the leftover pixels start new
/// patches later in the scan. Every emitted patch is connected and no
/// larger than the cap.
#[derive(Debug, Clone)]
pub struct ConnectedComponents {
    max_size: usize,
}

impl ConnectedComponents {
    pub fn new(max_size: usize) -> SceneResult<Self> {
        if max_size == 0 {
            return Err(SceneError::Config("Maximum patch size must be positive".to_string()));
        }
        Ok(Self { max_size })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Label a cluster map; cluster value 0 is treated as masked
    pub fn label(&self, clusters: &LabelMap) -> Patches {
        let (rows, cols) = clusters.dim();
        let mut labels: LabelMap = Array2::zeros((rows, cols));
        let mut queue = VecDeque::new();
        let mut count: u32 = 0;

        for r0 in 0..rows {
            for c0 in 0..cols {
                let cluster = clusters[[r0, c0]];
                if cluster == 0 || labels[[r0, c0]] != 0 {
                    continue;
                }

                count += 1;
                labels[[r0, c0]] = count;
                let mut size = 1;
                queue.clear();
                queue.push_back((r0, c0));

                while let Some((r, c)) = queue.pop_front() {
                    for (dr, dc) in PLUS {
                        if size >= self.max_size {
                            break;
                        }
                        let nr = r as isize + dr;
                        let nc = c as isize + dc;
                        if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                            continue;
                        }
                        let (nr, nc) = (nr as usize, nc as usize);
                        if labels[[nr, nc]] == 0 && clusters[[nr, nc]] == cluster {
                            labels[[nr, nc]] = count;
                            size += 1;
                            queue.push_back((nr, nc));
                        }
                    }
                }
            }
        }

        log::debug!(
            "Labeled {} patches (max size {}) on {}x{} grid",
            count,
            self.max_size,
            rows,
            cols
        );
        Patches {
            labels,
            count: count as usize,
        }
    }
}

impl Default for ConnectedComponents {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_PATCH_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_connected(labels: &LabelMap, id: u32) -> bool {
        let pixels: Vec<(usize, usize)> = labels
            .indexed_iter()
            .filter(|&(_, &l)| l == id)
            .map(|(p, _)| p)
            .collect();
        let Some(&start) = pixels.first() else {
            return true;
        };
        let (rows, cols) = labels.dim();
        let mut seen = Array2::from_elem((rows, cols), false);
        let mut queue = VecDeque::from([start]);
        seen[start] = true;
        let mut reached = 1;
        while let Some((r, c)) = queue.pop_front() {
            for (dr, dc) in PLUS {
                let nr = r as isize + dr;
                let nc = c as isize + dc;
                if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                    continue;
                }
                let p = (nr as usize, nc as usize);
                if !seen[p] && labels[p] == id {
                    seen[p] = true;
                    reached += 1;
                    queue.push_back(p);
                }
            }
        }
        reached == pixels.len()
    }

    #[test]
    fn test_diagonal_pixels_not_connected() {
        let clusters = Array2::from_shape_vec((2, 2), vec![1u32, 2, 2, 1]).unwrap();
        let patches = ConnectedComponents::default().label(&clusters);
        assert_eq!(patches.count, 4);
    }

    #[test]
    fn test_same_cluster_split_by_gap() {
        let clusters = Array2::from_shape_vec((1, 5), vec![3u32, 3, 0, 3, 3]).unwrap();
        let patches = ConnectedComponents::default().label(&clusters);

        assert_eq!(patches.count, 2);
        assert_eq!(patches.labels[[0, 2]], 0);
        assert_eq!(patches.labels[[0, 0]], patches.labels[[0, 1]]);
        assert_ne!(patches.labels[[0, 0]], patches.labels[[0, 3]]);
    }

    #[test]
    fn test_size_cap_enforced() {
        let clusters = Array2::from_elem((40, 40), 7u32);
        let labeler = ConnectedComponents::default();
        let patches = labeler.label(&clusters);

        let sizes = patches.sizes();
        assert!(sizes.iter().all(|&s| s <= 128));
        assert_eq!(sizes.iter().sum::<usize>(), 1600);
        assert!(patches.count >= 1600 / 128);
        assert!(patches.labels.iter().all(|&l| l != 0));
        for id in 1..=patches.count as u32 {
            assert!(is_connected(&patches.labels, id));
        }
    }

    #[test]
    fn test_deterministic_split() {
        let clusters = Array2::from_shape_fn((20, 20), |(r, c)| ((r / 5) * 4 + c / 5) as u32 + 1);
        let labeler = ConnectedComponents::new(10).unwrap();
        assert_eq!(labeler.label(&clusters), labeler.label(&clusters));
    }

    #[test]
    fn test_zero_cap_rejected() {
        assert!(ConnectedComponents::new(0).is_err());
    }
}
