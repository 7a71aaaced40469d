//! Pipeline orchestration
//!
//! Runs the classification chain over a scene collection and produces the
//! intermediate series `dt1` .. `dt6`:
//!
//! | series | content |
//! |--------|---------|
//! | dt1 | catalog-filtered, scaled scenes with NDVI / NDMI |
//! | dt2 | cloud-masked scenes that passed the cloud gate |
//! | dt3 | dt2 scenes with an `emerged` band that passed the land gate |
//! | dt4 | dt3 after manual exclusions |
//! | dt5 | dt4 scenes reduced to `emerged` + `eelgrass` |
//! | dt6 | scaled raw bands of the dt4 scenes over the expanded area |
//!
//! Per-scene work runs in parallel; gates run once all scenes of a stage are
//! joined.

use crate::core::classify::{class_mask, ClassThresholds, Classifier};
use crate::core::labeling::ConnectedComponents;
use crate::core::quality::{CloudGateParams, LandGateParams};
use crate::core::region::Region;
use crate::core::scale::Preprocessor;
use crate::core::segmentation::{SegmentationParams, Segmenter, Snic};
use crate::core::selection::{retain_passed, ExclusionList, SceneSelection, ISLE_VERTE_EXCLUSIONS};
use crate::core::smoothing::{gaussian_smooth, SmoothingParams};
use crate::core::zonal::{patch_mean, patch_means};
use crate::io::source::{CatalogFilter, SceneSource};
use crate::types::{
    RawScene, Scene, SceneError, SceneId, SceneResult, SceneSeries, SelectionFlag, EELGRASS,
    EMERGED, NDMI, NDVI, OPTICAL_BANDS,
};
use std::collections::HashMap;
use std::fmt;

/// Complete pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Area classified in every scene
    pub region: Region,
    /// Wider area used for the context series
    pub expanded_area: Region,
    pub catalog: CatalogFilter,
    pub cloud: CloudGateParams,
    pub land: LandGateParams,
    pub thresholds: ClassThresholds,
    pub emerged_segmentation: SegmentationParams,
    pub eelgrass_segmentation: SegmentationParams,
    pub smoothing: SmoothingParams,
    pub exclusions: ExclusionList,
    /// Position in dt5 returned by [`PipelineOutput::preview`]
    pub preview_index: usize,
}

impl PipelineConfig {
    pub fn new(region: Region, expanded_area: Region) -> Self {
        Self {
            region,
            expanded_area,
            catalog: CatalogFilter::default(),
            cloud: CloudGateParams::default(),
            land: LandGateParams::default(),
            thresholds: ClassThresholds::default(),
            emerged_segmentation: SegmentationParams::emerged(),
            eelgrass_segmentation: SegmentationParams::eelgrass(),
            smoothing: SmoothingParams::default(),
            exclusions: ExclusionList::default(),
            preview_index: 11,
        }
    }

    /// Historical L'Isle-Verte run: expanded area and manual exclusions included
    ///
    /// The expanded area is a lon/lat polygon, so scenes must arrive on a
    /// geographic (EPSG:4326) grid. Against a projected grid such as UTM it
    /// overlaps nothing and the context series comes out fully masked.
    pub fn isle_verte(region: Region) -> Self {
        Self {
            exclusions: ExclusionList::Positions(ISLE_VERTE_EXCLUSIONS.to_vec()),
            ..Self::new(region, Region::isle_verte_expanded_area())
        }
    }

    pub fn validate(&self) -> SceneResult<()> {
        self.emerged_segmentation.validate()?;
        self.eelgrass_segmentation.validate()?;
        self.smoothing.validate()?;

        let months = &self.catalog.months;
        if months.is_empty() || *months.start() < 1 || *months.end() > 12 {
            return Err(SceneError::Config(format!("Invalid month window {:?}", months)));
        }
        if self.catalog.years.is_empty() {
            return Err(SceneError::Config(format!(
                "Empty year window {:?}",
                self.catalog.years
            )));
        }
        if self.catalog.sensors.is_empty() {
            return Err(SceneError::Config("No sensor enabled".to_string()));
        }

        let fraction = self.cloud.min_valid_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(SceneError::Config(format!(
                "Valid-pixel fraction must lie in [0, 1], got {}",
                fraction
            )));
        }
        let reference = self.cloud.reference_band.as_str();
        if !OPTICAL_BANDS.contains(&reference) && reference != NDVI && reference != NDMI {
            return Err(SceneError::Config(format!(
                "Unknown cloud reference band '{}'",
                reference
            )));
        }

        let t = &self.thresholds;
        if ![t.nircut, t.ndvicut, t.redcut, t.ndmicut].iter().all(|v| v.is_finite()) {
            return Err(SceneError::Config(format!("Non-finite class threshold in {:?}", t)));
        }
        Ok(())
    }
}

/// Identifies one of the intermediate series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Ingested,
    CloudGated,
    LandGated,
    Curated,
    Classified,
    Context,
}

impl Stage {
    pub fn series_name(&self) -> &'static str {
        match self {
            Stage::Ingested => "dt1",
            Stage::CloudGated => "dt2",
            Stage::LandGated => "dt3",
            Stage::Curated => "dt4",
            Stage::Classified => "dt5",
            Stage::Context => "dt6",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Ingested => "ingested",
            Stage::CloudGated => "cloud-gated",
            Stage::LandGated => "land-gated",
            Stage::Curated => "curated",
            Stage::Classified => "classified",
            Stage::Context => "context",
        };
        write!(f, "{} ({})", self.series_name(), label)
    }
}

/// Hook called once each series is complete
pub trait PipelineObserver: Send + Sync {
    fn on_series(&self, stage: Stage, series: &SceneSeries);
}

/// Observer that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_series(&self, _stage: Stage, _series: &SceneSeries) {}
}

/// Logs each series: count at info level, scene ids and bands at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl PipelineObserver for LoggingObserver {
    fn on_series(&self, stage: Stage, series: &SceneSeries) {
        log::info!("{}: {} scenes", stage, series.len());
        for scene in series.iter() {
            let bands: Vec<&str> = scene.band_names().collect();
            log::debug!("  {} {} [{}]", scene.id(), scene.acquired(), bands.join(", "));
        }
    }
}

/// Final products of one run
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    /// dt4 scene ids in series order
    pub curated: Vec<SceneId>,
    /// dt5
    pub classified: SceneSeries,
    /// dt6, aligned with `classified` by scene id
    pub context: SceneSeries,
    /// Every ingested scene with its gate outcomes, in timestamp order
    pub report: Vec<SceneSelection>,
    preview_index: usize,
}

impl PipelineOutput {
    /// Classified and context scene at the configured preview position
    pub fn preview(&self) -> Option<(&Scene, &Scene)> {
        let classified = self.classified.get(self.preview_index)?;
        let context = self.context.find(classified.id())?;
        Some((classified, context))
    }

    pub fn is_empty(&self) -> bool {
        self.classified.is_empty()
    }
}

/// Emerged-area and eelgrass classification over a scene series
pub struct Pipeline {
    config: PipelineConfig,
    preprocessor: Preprocessor,
    classifier: Classifier,
    emerged_segmenter: Box<dyn Segmenter>,
    eelgrass_segmenter: Box<dyn Segmenter>,
    emerged_labeler: ConnectedComponents,
    eelgrass_labeler: ConnectedComponents,
    observer: Box<dyn PipelineObserver>,
}

impl Pipeline {
    /// Validate `config` and build SNIC segmenters for both passes
    pub fn new(config: PipelineConfig) -> SceneResult<Self> {
        config.validate()?;
        Ok(Self {
            preprocessor: Preprocessor::new(),
            classifier: Classifier::new(config.thresholds),
            emerged_segmenter: Box::new(Snic::new(&config.emerged_segmentation)?),
            eelgrass_segmenter: Box::new(Snic::new(&config.eelgrass_segmentation)?),
            emerged_labeler: ConnectedComponents::new(config.emerged_segmentation.max_patch_size)?,
            eelgrass_labeler: ConnectedComponents::new(config.eelgrass_segmentation.max_patch_size)?,
            observer: Box::new(NoopObserver),
            config,
        })
    }

    pub fn with_observer(mut self, observer: Box<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the segmentation strategy of both passes
    pub fn with_segmenters(mut self, emerged: Box<dyn Segmenter>, eelgrass: Box<dyn Segmenter>) -> Self {
        self.emerged_segmenter = emerged;
        self.eelgrass_segmenter = eelgrass;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch scenes from `source` and run
    pub fn run_source(&self, source: &dyn SceneSource) -> SceneResult<PipelineOutput> {
        let raw = source.fetch(&self.config.catalog)?;
        self.run(raw)
    }

    pub fn run(&self, raw: Vec<RawScene>) -> SceneResult<PipelineOutput> {
        let raw = self.config.catalog.apply(raw);
        let mut output = PipelineOutput {
            preview_index: self.config.preview_index,
            ..Default::default()
        };

        // dt1
        let inputs: Vec<&RawScene> = raw.iter().collect();
        let scenes = map_scenes(inputs, |r| self.preprocessor.preprocess(r, &self.config.region))?;
        let dt1 = SceneSeries::from_scenes(scenes);
        self.observer.on_series(Stage::Ingested, &dt1);
        output.report = dt1
            .iter()
            .map(|s| SceneSelection {
                id: s.id().clone(),
                acquired: s.acquired(),
                cloud: None,
                land_pixels: None,
                flags: s.flags,
            })
            .collect();
        let report_index: HashMap<SceneId, usize> = output
            .report
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id.clone(), i))
            .collect();

        // dt2
        let assessed = map_scenes(dt1.into_scenes(), |scene| {
            let (mut masked, assessment) = self.config.cloud.assess(&scene)?;
            masked.record_flag(SelectionFlag::Cloud, assessment.passed)?;
            Ok((masked, assessment))
        })?;
        let mut scenes = Vec::with_capacity(assessed.len());
        for (scene, assessment) in assessed {
            if let Some(entry) = report_entry(&mut output.report, &report_index, scene.id()) {
                entry.cloud = Some(assessment);
                entry.flags = scene.flags;
            }
            scenes.push(scene);
        }
        let dt2 = retain_passed(SceneSeries::from_scenes(scenes), SelectionFlag::Cloud);
        self.observer.on_series(Stage::CloudGated, &dt2);
        if dt2.is_empty() {
            log::warn!("No scene passed the cloud gate; skipping remaining stages");
            return Ok(output);
        }

        // dt3
        let classified = map_scenes(dt2.into_scenes(), |scene| {
            let mut scene = self.emerged_pass(scene)?;
            let (land, passed) = self.config.land.assess(&scene)?;
            scene.record_flag(SelectionFlag::Land, passed)?;
            Ok((scene, land))
        })?;
        let mut scenes = Vec::with_capacity(classified.len());
        for (scene, land) in classified {
            if let Some(entry) = report_entry(&mut output.report, &report_index, scene.id()) {
                entry.land_pixels = Some(land);
                entry.flags = scene.flags;
            }
            scenes.push(scene);
        }
        let dt3 = retain_passed(SceneSeries::from_scenes(scenes), SelectionFlag::Land);
        self.observer.on_series(Stage::LandGated, &dt3);

        // dt4
        let dt4 = self.config.exclusions.apply(dt3)?;
        for scene in dt4.iter() {
            if let Some(entry) = report_entry(&mut output.report, &report_index, scene.id()) {
                entry.flags = scene.flags;
            }
        }
        // Excluded scenes do not survive dt4, so their manual flag is filled in here
        for entry in output.report.iter_mut() {
            if entry.flags.land_ok == Some(true) && entry.flags.manually_kept.is_none() {
                entry.flags.manually_kept = Some(false);
            }
        }
        self.observer.on_series(Stage::Curated, &dt4);
        if dt4.is_empty() {
            log::warn!("No scene left after land gate and manual exclusions");
            return Ok(output);
        }
        output.curated = dt4.ids();

        // dt5
        let curated: Vec<&Scene> = dt4.scenes().iter().collect();
        let scenes = map_scenes(curated, |scene| self.eelgrass_pass(scene))?;
        output.classified = SceneSeries::from_scenes(scenes);
        self.observer.on_series(Stage::Classified, &output.classified);

        // dt6
        let by_id: HashMap<&SceneId, &RawScene> = raw.iter().map(|r| (&r.metadata.id, r)).collect();
        let mut context_raw: Vec<&RawScene> = Vec::with_capacity(dt4.len());
        for id in &output.curated {
            let r = by_id.get(id).ok_or_else(|| {
                SceneError::Processing(format!("Scene {} has no raw source for the context series", id))
            })?;
            context_raw.push(*r);
        }
        let scenes = map_scenes(context_raw, |r| {
            self.preprocessor.scale_optical(r, &self.config.expanded_area)
        })?;
        output.context = SceneSeries::from_scenes(scenes);
        self.observer.on_series(Stage::Context, &output.context);

        log::info!(
            "Pipeline finished: {} of {} scenes classified",
            output.classified.len(),
            output.report.len()
        );
        Ok(output)
    }

    /// Segment on NIR, average NIR per patch and append the `emerged` band
    pub fn emerged_pass(&self, scene: Scene) -> SceneResult<Scene> {
        let nir = scene.band("nir")?;
        let nir_smooth = gaussian_smooth(nir, &self.config.smoothing)?;

        let clusters = self
            .emerged_segmenter
            .segment(&[nir.view(), nir_smooth.view()])?;
        let patches = self.emerged_labeler.label(&clusters);
        let mean_nir = patch_mean(&patches, nir)?;
        let emerged = self.classifier.emerged(&mean_nir);

        log::debug!(
            "Emerged pass {} ({}): {} patches",
            scene.id(),
            self.emerged_segmenter.name(),
            patches.count
        );
        scene.with_band(EMERGED, emerged)
    }

    /// Restrict to emerged pixels, segment on the visible bands and classify eelgrass
    ///
    /// The returned scene carries only the `emerged` and `eelgrass` bands.
    pub fn eelgrass_pass(&self, scene: &Scene) -> SceneResult<Scene> {
        let emerged = class_mask(scene.band(EMERGED)?);
        let masked = scene.masked(&emerged)?;

        let visible = ["blue", "green", "red"];
        let mut stack = Vec::with_capacity(visible.len() * 2);
        for name in visible {
            stack.push(masked.band(name)?.clone());
        }
        for i in 0..visible.len() {
            let smooth = gaussian_smooth(&stack[i], &self.config.smoothing)?;
            stack.push(smooth);
        }
        let views: Vec<_> = stack.iter().map(|b| b.view()).collect();

        let clusters = self.eelgrass_segmenter.segment(&views)?;
        let patches = self.eelgrass_labeler.label(&clusters);
        let means = patch_means(
            &patches,
            &[
                (NDVI, masked.band(NDVI)?),
                ("red", masked.band("red")?),
                (NDMI, masked.band(NDMI)?),
            ],
        )?;
        let eelgrass = self.classifier.eelgrass(&means[0].1, &means[1].1, &means[2].1)?;

        log::debug!(
            "Eelgrass pass {} ({}): {} patches",
            scene.id(),
            self.eelgrass_segmenter.name(),
            patches.count
        );
        scene
            .select(&[EMERGED])?
            .with_band(EELGRASS, eelgrass)
    }
}

fn report_entry<'a>(
    report: &'a mut [SceneSelection],
    index: &HashMap<SceneId, usize>,
    id: &SceneId,
) -> Option<&'a mut SceneSelection> {
    index.get(id).and_then(|&i| report.get_mut(i))
}

/// Ordered per-scene map; the first error aborts the stage
fn map_scenes<T, U, F>(items: Vec<T>, f: F) -> SceneResult<Vec<U>>
where
    T: Send,
    U: Send,
    F: Fn(T) -> SceneResult<U> + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        items.into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        items.into_iter().map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, SceneMetadata, Sensor};
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;
    use std::collections::BTreeMap;

    fn region() -> Region {
        Region::from_bbox(0.0, 0.0, 100.0, 100.0).unwrap()
    }

    fn scene_with_nir(nir: Array2<f32>) -> Scene {
        scene_with_bands(vec![("nir", nir)])
    }

    fn scene_with_bands(bands: Vec<(&str, Array2<f32>)>) -> Scene {
        let dim = bands[0].1.dim();
        let metadata = SceneMetadata {
            id: SceneId::new("LC08_012027_20200803"),
            sensor: Sensor::Landsat8Oli,
            acquired: Utc.with_ymd_and_hms(2020, 8, 3, 15, 0, 0).unwrap(),
            wrs_path: 12,
            wrs_row: 27,
            cloud_cover: None,
        };
        let bands: BTreeMap<String, Array2<f32>> =
            bands.into_iter().map(|(name, band)| (name.to_string(), band)).collect();
        Scene::new(metadata, bands, Array2::zeros(dim), GeoTransform::north_up(0.0, 100.0, 1.0)).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::new(region(), region());
        assert!(config.validate().is_ok());
        assert_eq!(config.preview_index, 11);
        assert_eq!(config.emerged_segmentation.seed_spacing, 11);
        assert_eq!(config.eelgrass_segmentation.neighborhood_size, 16);
        assert!(config.exclusions.is_empty());
    }

    #[test]
    fn test_isle_verte_preset() {
        let config = PipelineConfig::isle_verte(region());
        assert_eq!(
            config.exclusions,
            ExclusionList::Positions(ISLE_VERTE_EXCLUSIONS.to_vec())
        );
        assert!(config.expanded_area.contains(-69.4, 48.0));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::new(region(), region());
        config.emerged_segmentation.seed_spacing = 0;
        assert!(Pipeline::new(config).is_err());

        let mut config = PipelineConfig::new(region(), region());
        config.catalog.months = 5..=13;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::new(region(), region());
        config.cloud.reference_band = "thermal".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_emerged_pass_splits_land_and_water() {
        let nir = Array2::from_shape_fn((24, 24), |(_, c)| if c < 12 { 0.2 } else { 0.01 });
        let pipeline = Pipeline::new(PipelineConfig::new(region(), region())).unwrap();
        let scene = pipeline.emerged_pass(scene_with_nir(nir)).unwrap();

        let emerged = scene.band(EMERGED).unwrap();
        assert!(emerged.column(0).iter().all(|&v| v == 1.0));
        assert!(emerged.column(23).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_eelgrass_pass_restricted_to_emerged() {
        // vegetation signature everywhere, but only the left half is emerged
        let dim = (24, 24);
        let uniform = |v: f32| Array2::from_elem(dim, v);
        let emerged = Array2::from_shape_fn(dim, |(_, c)| if c < 12 { 1.0 } else { f32::NAN });
        let scene = scene_with_bands(vec![
            ("blue", uniform(0.02)),
            ("green", uniform(0.03)),
            ("red", uniform(0.01)),
            (NDVI, uniform(0.6)),
            (NDMI, uniform(0.78)),
            (EMERGED, emerged),
        ]);

        let pipeline = Pipeline::new(PipelineConfig::new(region(), region())).unwrap();
        let out = pipeline.eelgrass_pass(&scene).unwrap();

        let names: Vec<&str> = out.band_names().collect();
        assert_eq!(names, vec![EELGRASS, EMERGED]);
        let eelgrass = out.band(EELGRASS).unwrap();
        assert!(eelgrass.column(0).iter().all(|&v| v == 1.0));
        assert!(eelgrass.column(11).iter().all(|&v| v == 1.0));
        for c in 12..24 {
            assert!(eelgrass.column(c).iter().all(|v| v.is_nan()), "eelgrass in column {}", c);
        }
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        let pipeline = Pipeline::new(PipelineConfig::new(region(), region())).unwrap();
        let output = pipeline.run(Vec::new()).unwrap();
        assert!(output.is_empty());
        assert!(output.report.is_empty());
        assert!(output.preview().is_none());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Ingested.series_name(), "dt1");
        assert_eq!(Stage::Context.to_string(), "dt6 (context)");
    }
}
