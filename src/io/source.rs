use crate::types::{RawScene, SceneMetadata, SceneResult, Sensor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::RangeInclusive;

/// Catalog pre-filter applied before any pixel is touched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFilter {
    pub wrs_path: u16,
    /// Calendar months kept (1 = January)
    pub months: RangeInclusive<u32>,
    pub years: RangeInclusive<i32>,
    pub sensors: Vec<Sensor>,
}

impl Default for CatalogFilter {
    /// Summer-autumn scenes of WRS path 12 from every Landsat mission
    fn default() -> Self {
        Self {
            wrs_path: 12,
            months: 6..=10,
            years: 1984..=2023,
            sensors: Sensor::ALL.to_vec(),
        }
    }
}

impl CatalogFilter {
    pub fn accepts(&self, metadata: &SceneMetadata) -> bool {
        self.sensors.contains(&metadata.sensor)
            && metadata.wrs_path == self.wrs_path
            && self.months.contains(&metadata.month())
            && self.years.contains(&metadata.year())
    }

    /// Keep accepted scenes from every sensor, merged in acquisition order
    ///
    /// Scene ids ignore the processing date, so reprocessed copies of one
    /// acquisition share an id; only the first delivered copy is kept.
    pub fn apply(&self, scenes: Vec<RawScene>) -> Vec<RawScene> {
        let total = scenes.len();
        let mut kept: Vec<RawScene> = scenes
            .into_iter()
            .filter(|s| self.accepts(&s.metadata))
            .collect();
        kept.sort_by(|a, b| {
            a.metadata
                .acquired
                .cmp(&b.metadata.acquired)
                .then_with(|| a.metadata.id.cmp(&b.metadata.id))
        });

        let mut seen = HashSet::new();
        kept.retain(|s| {
            let fresh = seen.insert(s.metadata.id.clone());
            if !fresh {
                log::warn!("Dropping duplicate scene {}", s.metadata.id);
            }
            fresh
        });
        log::info!("Catalog filter kept {} of {} scenes", kept.len(), total);
        kept
    }
}

/// Imagery source collaborator
pub trait SceneSource {
    /// Scenes matching `filter`, in any order
    fn fetch(&self, filter: &CatalogFilter) -> SceneResult<Vec<RawScene>>;
}

/// Source over scenes already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    scenes: Vec<RawScene>,
}

impl InMemorySource {
    pub fn new(scenes: Vec<RawScene>) -> Self {
        Self { scenes }
    }

    pub fn push(&mut self, scene: RawScene) {
        self.scenes.push(scene);
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl SceneSource for InMemorySource {
    fn fetch(&self, filter: &CatalogFilter) -> SceneResult<Vec<RawScene>> {
        Ok(filter.apply(self.scenes.clone()))
    }
}
