use chrono::{DateTime, Datelike, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Raw surface-reflectance digital number
pub type RawValue = u16;

/// Real-valued band data (reflectance or derived index); NaN marks a masked pixel
pub type BandValue = f32;

/// 2D raw band (rows x cols)
pub type RawBand = Array2<RawValue>;

/// 2D real band (rows x cols)
pub type Band = Array2<BandValue>;

/// 2D patch label map; 0 marks an unlabeled pixel
pub type LabelMap = Array2<u32>;

/// Fill value of Collection 2 surface-reflectance products
pub const FILL_VALUE: RawValue = 0;

/// Common names of the optical bands, in sensor order
pub const OPTICAL_BANDS: [&str; 6] = ["blue", "green", "red", "nir", "swir1", "swir2"];

/// Derived index band names
pub const NDVI: &str = "NDVI";
pub const NDMI: &str = "NDMI";

/// Classification band names
pub const EMERGED: &str = "emerged";
pub const EELGRASS: &str = "eelgrass";

/// Landsat sensors covered by the scene catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sensor {
    Landsat4Tm,
    Landsat5Tm,
    Landsat7Etm,
    Landsat8Oli,
    Landsat9Oli,
}

impl Sensor {
    pub const ALL: [Sensor; 5] = [
        Sensor::Landsat4Tm,
        Sensor::Landsat5Tm,
        Sensor::Landsat7Etm,
        Sensor::Landsat8Oli,
        Sensor::Landsat9Oli,
    ];

    /// Collection prefix used in product identifiers (e.g. `LC08`)
    pub fn collection_prefix(&self) -> &'static str {
        match self {
            Sensor::Landsat4Tm => "LT04",
            Sensor::Landsat5Tm => "LT05",
            Sensor::Landsat7Etm => "LE07",
            Sensor::Landsat8Oli => "LC08",
            Sensor::Landsat9Oli => "LC09",
        }
    }

    pub fn from_collection_prefix(prefix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.collection_prefix() == prefix)
    }

    /// Map the `SPACECRAFT_ID` metadata value (e.g. `LANDSAT_8`)
    pub fn from_spacecraft_id(id: &str) -> Option<Self> {
        match id.trim() {
            "LANDSAT_4" => Some(Sensor::Landsat4Tm),
            "LANDSAT_5" => Some(Sensor::Landsat5Tm),
            "LANDSAT_7" => Some(Sensor::Landsat7Etm),
            "LANDSAT_8" => Some(Sensor::Landsat8Oli),
            "LANDSAT_9" => Some(Sensor::Landsat9Oli),
            _ => None,
        }
    }

    /// Native surface-reflectance band keys, aligned with [`OPTICAL_BANDS`]
    pub fn native_band_keys(&self) -> [&'static str; 6] {
        match self {
            // TM and ETM+ skip the thermal band 6
            Sensor::Landsat4Tm | Sensor::Landsat5Tm | Sensor::Landsat7Etm => {
                ["SR_B1", "SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B7"]
            }
            // OLI band 1 is coastal aerosol
            Sensor::Landsat8Oli | Sensor::Landsat9Oli => {
                ["SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6", "SR_B7"]
            }
        }
    }

    /// Native key of the pixel quality bitmask
    pub fn quality_band_key(&self) -> &'static str {
        "QA_PIXEL"
    }

    /// Surface reflectance calibration `(slope, bias)`, identical for all bands
    pub fn reflectance_scale(&self) -> (f32, f32) {
        (0.000_027_5, -0.2)
    }
}

impl std::fmt::Display for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.collection_prefix())
    }
}

/// Stable scene identity, e.g. `LC08_012027_20200803`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneId(pub String);

impl SceneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SceneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Acquisition metadata attached to every scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub id: SceneId,
    pub sensor: Sensor,
    pub acquired: DateTime<Utc>,
    pub wrs_path: u16,
    pub wrs_row: u16,
    /// Scene-wide cloud cover reported by the provider (percent)
    pub cloud_cover: Option<f32>,
}

impl SceneMetadata {
    pub fn month(&self) -> u32 {
        self.acquired.month()
    }

    pub fn year(&self) -> i32 {
        self.acquired.year()
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up grid with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    /// Map coordinates of the centre of pixel `(row, col)`
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.top_left_x + c * self.pixel_width + r * self.rotation_x,
            self.top_left_y + c * self.rotation_y + r * self.pixel_height,
        )
    }

    /// Footprint of a `rows x cols` grid
    pub fn footprint(&self, rows: usize, cols: usize) -> BoundingBox {
        let corners = [(0.0, 0.0), (0.0, cols as f64), (rows as f64, 0.0), (rows as f64, cols as f64)];
        let mut bbox = BoundingBox {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for (r, c) in corners {
            let x = self.top_left_x + c * self.pixel_width + r * self.rotation_x;
            let y = self.top_left_y + c * self.rotation_y + r * self.pixel_height;
            bbox.min_x = bbox.min_x.min(x);
            bbox.max_x = bbox.max_x.max(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_y = bbox.max_y.max(y);
        }
        bbox
    }
}

/// Scene as delivered by the imagery source, in sensor-native digital numbers
#[derive(Debug, Clone)]
pub struct RawScene {
    pub metadata: SceneMetadata,
    /// Keyed by native keys (`SR_B4`) or common names (`red`)
    pub bands: HashMap<String, RawBand>,
    pub quality: RawBand,
    pub geo_transform: GeoTransform,
}

/// Persistent per-scene gate decisions; each flag is recorded at most once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionFlags {
    pub cloud_ok: Option<bool>,
    pub land_ok: Option<bool>,
    pub manually_kept: Option<bool>,
}

/// Which gate a flag belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionFlag {
    Cloud,
    Land,
    Manual,
}

impl std::fmt::Display for SelectionFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionFlag::Cloud => write!(f, "cloud_ok"),
            SelectionFlag::Land => write!(f, "land_ok"),
            SelectionFlag::Manual => write!(f, "manually_kept"),
        }
    }
}

impl SelectionFlags {
    pub fn get(&self, flag: SelectionFlag) -> Option<bool> {
        match flag {
            SelectionFlag::Cloud => self.cloud_ok,
            SelectionFlag::Land => self.land_ok,
            SelectionFlag::Manual => self.manually_kept,
        }
    }

    fn slot(&mut self, flag: SelectionFlag) -> &mut Option<bool> {
        match flag {
            SelectionFlag::Cloud => &mut self.cloud_ok,
            SelectionFlag::Land => &mut self.land_ok,
            SelectionFlag::Manual => &mut self.manually_kept,
        }
    }
}

/// One scaled scene with an append-only set of named bands
#[derive(Debug, Clone)]
pub struct Scene {
    pub metadata: SceneMetadata,
    bands: BTreeMap<String, Band>,
    quality: RawBand,
    pub geo_transform: GeoTransform,
    pub flags: SelectionFlags,
}

impl Scene {
    /// Build a scene from already-scaled bands; all bands must share the quality grid
    pub fn new(
        metadata: SceneMetadata,
        bands: BTreeMap<String, Band>,
        quality: RawBand,
        geo_transform: GeoTransform,
    ) -> SceneResult<Self> {
        let expected = quality.dim();
        for (name, band) in &bands {
            if band.dim() != expected {
                return Err(SceneError::ShapeMismatch {
                    scene: metadata.id.to_string(),
                    band: name.clone(),
                    expected,
                    found: band.dim(),
                });
            }
        }
        Ok(Self {
            metadata,
            bands,
            quality,
            geo_transform,
            flags: SelectionFlags::default(),
        })
    }

    pub fn id(&self) -> &SceneId {
        &self.metadata.id
    }

    pub fn acquired(&self) -> DateTime<Utc> {
        self.metadata.acquired
    }

    pub fn dim(&self) -> (usize, usize) {
        self.quality.dim()
    }

    pub fn footprint(&self) -> BoundingBox {
        let (rows, cols) = self.dim();
        self.geo_transform.footprint(rows, cols)
    }

    pub fn quality(&self) -> &RawBand {
        &self.quality
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(String::as_str)
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.contains_key(name)
    }

    pub fn band(&self, name: &str) -> SceneResult<&Band> {
        self.bands.get(name).ok_or_else(|| SceneError::MissingBand {
            scene: self.metadata.id.to_string(),
            band: name.to_string(),
        })
    }

    /// Add a new band; existing bands are never replaced
    pub fn with_band(mut self, name: &str, band: Band) -> SceneResult<Self> {
        if self.bands.contains_key(name) {
            return Err(SceneError::DuplicateBand {
                scene: self.metadata.id.to_string(),
                band: name.to_string(),
            });
        }
        if band.dim() != self.dim() {
            return Err(SceneError::ShapeMismatch {
                scene: self.metadata.id.to_string(),
                band: name.to_string(),
                expected: self.dim(),
                found: band.dim(),
            });
        }
        self.bands.insert(name.to_string(), band);
        Ok(self)
    }

    /// Copy of this scene restricted to the named bands
    pub fn select(&self, names: &[&str]) -> SceneResult<Self> {
        let mut bands = BTreeMap::new();
        for &name in names {
            bands.insert(name.to_string(), self.band(name)?.clone());
        }
        Ok(Self {
            metadata: self.metadata.clone(),
            bands,
            quality: self.quality.clone(),
            geo_transform: self.geo_transform,
            flags: self.flags,
        })
    }

    /// New scene where every band is masked wherever `keep` is false
    pub fn masked(&self, keep: &Array2<bool>) -> SceneResult<Self> {
        if keep.dim() != self.dim() {
            return Err(SceneError::ShapeMismatch {
                scene: self.metadata.id.to_string(),
                band: "mask".to_string(),
                expected: self.dim(),
                found: keep.dim(),
            });
        }
        let bands = self
            .bands
            .iter()
            .map(|(name, band)| {
                let mut out = band.clone();
                ndarray::Zip::from(&mut out).and(keep).for_each(|v, &k| {
                    if !k {
                        *v = BandValue::NAN;
                    }
                });
                (name.clone(), out)
            })
            .collect();
        Ok(Self {
            metadata: self.metadata.clone(),
            bands,
            quality: self.quality.clone(),
            geo_transform: self.geo_transform,
            flags: self.flags,
        })
    }

    /// Record a gate decision; a flag that is already set cannot be recomputed
    pub fn record_flag(&mut self, flag: SelectionFlag, passed: bool) -> SceneResult<()> {
        let slot = self.flags.slot(flag);
        if slot.is_some() {
            return Err(SceneError::FlagAlreadyRecorded {
                scene: self.metadata.id.to_string(),
                flag: flag.to_string(),
            });
        }
        *slot = Some(passed);
        Ok(())
    }
}

/// Ordered scene series (acquisition timestamp ascending, ties by scene id)
#[derive(Debug, Clone, Default)]
pub struct SceneSeries {
    scenes: Vec<Scene>,
}

impl SceneSeries {
    /// Build a series, restoring timestamp order
    pub fn from_scenes(mut scenes: Vec<Scene>) -> Self {
        sort_by_acquisition(&mut scenes);
        Self { scenes }
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn get(&self, position: usize) -> Option<&Scene> {
        self.scenes.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Scene> {
        self.scenes.iter()
    }

    pub fn ids(&self) -> Vec<SceneId> {
        self.scenes.iter().map(|s| s.id().clone()).collect()
    }

    pub fn find(&self, id: &SceneId) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id() == id)
    }

    pub fn into_scenes(self) -> Vec<Scene> {
        self.scenes
    }

    /// Keep the scenes for which `keep` holds; order is preserved
    pub fn filter<F>(self, mut keep: F) -> Self
    where
        F: FnMut(&Scene) -> bool,
    {
        Self {
            scenes: self.scenes.into_iter().filter(|s| keep(s)).collect(),
        }
    }
}

impl IntoIterator for SceneSeries {
    type Item = Scene;
    type IntoIter = std::vec::IntoIter<Scene>;

    fn into_iter(self) -> Self::IntoIter {
        self.scenes.into_iter()
    }
}

fn sort_by_acquisition(scenes: &mut [Scene]) {
    scenes.sort_by(|a, b| {
        a.acquired()
            .cmp(&b.acquired())
            .then_with(|| a.id().cmp(b.id()))
    });
}

/// Error types for scene processing
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Scene {scene}: missing band '{band}'")]
    MissingBand { scene: String, band: String },

    #[error("Scene {scene}: band '{band}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        scene: String,
        band: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Scene {scene}: band '{band}' already exists")]
    DuplicateBand { scene: String, band: String },

    #[error("Scene {scene}: flag {flag} was already recorded")]
    FlagAlreadyRecorded { scene: String, flag: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
