//! Temporal selection over the ordered scene series
//!
//! Scenes advance through three gates (cloud, land, manual). Each gate's
//! decision is recorded once on the scene's [`SelectionFlags`] and the series
//! is then filtered on that flag.

use crate::core::quality::CloudAssessment;
use crate::types::{SceneId, SceneResult, SceneSeries, SelectionFlag, SelectionFlags};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Positions excluded after visual inspection of the L'Isle-Verte series
/// (zero-based, into the land-gated series produced with default thresholds)
pub const ISLE_VERTE_EXCLUSIONS: &[usize] = &[
    1, 3, 5, 6, 9, 10, 13, 16, 17, 20, 22, 24, 25, 27, 28, 30, 34, 35, 39, 40, 41, 48, 53, 58, 60,
    62, 63, 64, 65, 71, 72, 76, 77, 82, 83, 84, 87, 88, 92, 93, 97, 101, 102, 104, 106, 107, 108,
    109, 110, 114, 115, 116, 117, 119,
];

/// Manual curation override applied after the automatic gates
///
/// Positional lists depend on how many scenes the earlier gates let through;
/// changing any threshold shifts every position. `SceneIds` is keyed by
/// stable scene identity instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExclusionList {
    /// Zero-based positions into the timestamp-ordered land-gated series
    Positions(Vec<usize>),
    /// Scenes to drop, by identity
    SceneIds(BTreeSet<SceneId>),
}

impl Default for ExclusionList {
    fn default() -> Self {
        ExclusionList::Positions(Vec::new())
    }
}

impl ExclusionList {
    pub fn is_empty(&self) -> bool {
        match self {
            ExclusionList::Positions(p) => p.is_empty(),
            ExclusionList::SceneIds(ids) => ids.is_empty(),
        }
    }

    fn excludes(&self, position: usize, id: &SceneId) -> bool {
        match self {
            ExclusionList::Positions(p) => p.contains(&position),
            ExclusionList::SceneIds(ids) => ids.contains(id),
        }
    }

    /// Record `manually_kept` on every scene and drop the excluded ones
    ///
    /// Entries that match nothing (positions past the end, unknown ids) have
    /// no effect.
    pub fn apply(&self, series: SceneSeries) -> SceneResult<SceneSeries> {
        let len = series.len();
        match self {
            ExclusionList::Positions(p) => {
                let unmatched: Vec<usize> = p.iter().copied().filter(|&i| i >= len).collect();
                if !unmatched.is_empty() {
                    log::warn!(
                        "Ignoring {} exclusion positions beyond series length {}: {:?}",
                        unmatched.len(),
                        len,
                        unmatched
                    );
                }
            }
            ExclusionList::SceneIds(ids) => {
                let unmatched = ids.iter().filter(|id| series.find(id).is_none()).count();
                if unmatched > 0 {
                    log::warn!("Ignoring {} excluded scene ids not present in series", unmatched);
                }
            }
        }

        let mut scenes = series.into_scenes();
        for (position, scene) in scenes.iter_mut().enumerate() {
            let keep = !self.excludes(position, scene.id());
            scene.record_flag(SelectionFlag::Manual, keep)?;
        }
        Ok(retain_passed(SceneSeries::from_scenes(scenes), SelectionFlag::Manual))
    }
}

/// Keep the scenes whose `flag` was recorded as passed
pub fn retain_passed(series: SceneSeries, flag: SelectionFlag) -> SceneSeries {
    let before = series.len();
    let kept = series.filter(|s| s.flags.get(flag) == Some(true));
    log::info!("Gate {}: {} of {} scenes kept", flag, kept.len(), before);
    kept
}

/// Selection history of one ingested scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSelection {
    pub id: SceneId,
    pub acquired: DateTime<Utc>,
    pub cloud: Option<CloudAssessment>,
    /// Emerged pixel count, for scenes that reached the land gate
    pub land_pixels: Option<usize>,
    pub flags: SelectionFlags,
}

impl SceneSelection {
    /// A scene is in the final series only when every gate passed
    pub fn selected(&self) -> bool {
        self.flags.cloud_ok == Some(true)
            && self.flags.land_ok == Some(true)
            && self.flags.manually_kept == Some(true)
    }
}
