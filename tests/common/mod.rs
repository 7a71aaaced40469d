//! Synthetic Landsat 8 scenes shared by the integration tests
#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use ndarray::Array2;
use seagrass::core::{ClassThresholds, CloudGateParams, LandGateParams, PipelineConfig, Region};
use seagrass::types::{GeoTransform, RawBand, RawScene, SceneId, SceneMetadata, Sensor};
use std::collections::HashMap;

pub const SIZE: usize = 20;

/// Surface reflectance of one synthetic land-cover type
#[derive(Debug, Clone, Copy)]
pub struct Cover {
    pub blue: f32,
    pub green: f32,
    pub red: f32,
    pub nir: f32,
    pub swir1: f32,
    pub swir2: f32,
}

pub const EELGRASS_BED: Cover = Cover {
    blue: 0.02,
    green: 0.05,
    red: 0.03,
    nir: 0.2,
    swir1: 0.05,
    swir2: 0.03,
};

pub const MUD_FLAT: Cover = Cover {
    blue: 0.08,
    green: 0.09,
    red: 0.1,
    nir: 0.12,
    swir1: 0.15,
    swir2: 0.12,
};

pub const OPEN_WATER: Cover = Cover {
    blue: 0.04,
    green: 0.03,
    red: 0.02,
    nir: 0.01,
    swir1: 0.005,
    swir2: 0.003,
};

/// Vegetated but below the emerged NIR cut; passes every eelgrass rule
pub const SUBMERGED_VEGETATION: Cover = Cover {
    blue: 0.02,
    green: 0.03,
    red: 0.01,
    nir: 0.04,
    swir1: 0.005,
    swir2: 0.003,
};

/// Digital number for a reflectance under the Collection 2 scaling
pub fn to_dn(reflectance: f32) -> u16 {
    ((reflectance + 0.2) / 0.000_027_5).round() as u16
}

/// Scene whose columns `0..split` show `left` and the rest `right`
pub fn raw_scene(id: &str, day: u32, left: Cover, right: Cover, split: usize, qa: u16) -> RawScene {
    let band = |pick: fn(&Cover) -> f32| -> RawBand {
        Array2::from_shape_fn((SIZE, SIZE), |(_, c)| {
            to_dn(if c < split { pick(&left) } else { pick(&right) })
        })
    };

    let mut bands = HashMap::new();
    bands.insert("blue".to_string(), band(|c| c.blue));
    bands.insert("green".to_string(), band(|c| c.green));
    bands.insert("red".to_string(), band(|c| c.red));
    bands.insert("nir".to_string(), band(|c| c.nir));
    bands.insert("swir1".to_string(), band(|c| c.swir1));
    bands.insert("swir2".to_string(), band(|c| c.swir2));

    RawScene {
        metadata: SceneMetadata {
            id: SceneId::new(id),
            sensor: Sensor::Landsat8Oli,
            acquired: Utc.with_ymd_and_hms(2020, 7, day, 15, 20, 0).unwrap(),
            wrs_path: 12,
            wrs_row: 27,
            cloud_cover: None,
        },
        bands,
        quality: Array2::from_elem((SIZE, SIZE), qa),
        geo_transform: GeoTransform::north_up(0.0, SIZE as f64, 1.0),
    }
}

/// Cloudy, usable and submerged scenes, in that order
pub fn three_scene_series() -> Vec<RawScene> {
    let cloud_bit = 1u16 << 3;
    vec![
        raw_scene("LC08_012027_20200701", 1, EELGRASS_BED, MUD_FLAT, SIZE / 2, cloud_bit),
        raw_scene("LC08_012027_20200717", 17, EELGRASS_BED, MUD_FLAT, SIZE / 2, 0),
        raw_scene("LC08_012027_20200729", 29, OPEN_WATER, OPEN_WATER, SIZE / 2, 0),
    ]
}

/// Configuration scaled down to 20 x 20 scenes
pub fn small_config() -> PipelineConfig {
    let region = Region::from_bbox(0.0, 0.0, SIZE as f64, SIZE as f64).unwrap();
    // top half only
    let expanded = Region::from_bbox(0.0, SIZE as f64 / 2.0, SIZE as f64, SIZE as f64).unwrap();
    let mut config = PipelineConfig::new(region, expanded);
    config.cloud = CloudGateParams {
        min_valid_pixels: 100,
        min_valid_fraction: 0.5,
        reference_band: "red".to_string(),
    };
    config.land = LandGateParams { min_land_pixels: 100 };
    config.thresholds = ClassThresholds::default();
    config.preview_index = 0;
    config
}
