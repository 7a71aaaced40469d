//! Region-of-interest geometry and its rasterisation onto scene grids

use crate::types::{GeoTransform, SceneError, SceneResult};
use geo::{BoundingRect, Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use ndarray::Array2;

/// Multipolygon area in map coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    area: MultiPolygon<f64>,
}

impl Region {
    /// Build a region from exterior rings; rings are closed automatically
    pub fn from_rings(rings: Vec<Vec<(f64, f64)>>) -> SceneResult<Self> {
        let mut polygons = Vec::with_capacity(rings.len());
        for (i, ring) in rings.into_iter().enumerate() {
            if ring.len() < 3 {
                return Err(SceneError::Config(format!(
                    "Region ring {} has {} vertices, at least 3 required",
                    i,
                    ring.len()
                )));
            }
            let exterior: LineString<f64> = ring.into_iter().map(|(x, y)| Coord { x, y }).collect();
            polygons.push(Polygon::new(exterior, vec![]));
        }
        if polygons.is_empty() {
            return Err(SceneError::Config("Region has no polygons".to_string()));
        }
        Ok(Self {
            area: MultiPolygon::new(polygons),
        })
    }

    /// Axis-aligned rectangle
    pub fn from_bbox(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> SceneResult<Self> {
        if !(min_x < max_x && min_y < max_y) {
            return Err(SceneError::Config(format!(
                "Degenerate bounding box ({}, {}) - ({}, {})",
                min_x, min_y, max_x, max_y
            )));
        }
        Self::from_rings(vec![vec![
            (min_x, max_y),
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
        ]])
    }

    /// Expanded context area around L'Isle-Verte (lon/lat)
    pub fn isle_verte_expanded_area() -> Self {
        let ring = vec![
            (-69.5306067947779, 48.11395348073427),
            (-69.5306067947779, 47.93945100234268),
            (-69.25320200962165, 47.93945100234268),
            (-69.25320200962165, 48.11395348073427),
        ];
        let exterior: LineString<f64> = ring.into_iter().map(|(x, y)| Coord { x, y }).collect();
        Self {
            area: MultiPolygon::new(vec![Polygon::new(exterior, vec![])]),
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.area.contains(&Point::new(x, y))
    }

    /// Inside-mask for a `rows x cols` grid, tested at pixel centres
    pub fn rasterize(&self, dim: (usize, usize), transform: &GeoTransform) -> Array2<bool> {
        let bounds = self.area.bounding_rect();
        Array2::from_shape_fn(dim, |(row, col)| {
            let (x, y) = transform.pixel_center(row, col);
            match bounds {
                Some(rect)
                    if x < rect.min().x
                        || x > rect.max().x
                        || y < rect.min().y
                        || y > rect.max().y =>
                {
                    false
                }
                Some(_) => self.contains(x, y),
                None => false,
            }
        })
    }
}
