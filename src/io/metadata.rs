use crate::types::{SceneError, SceneId, SceneMetadata, SceneResult, Sensor};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

/// Landsat Collection 2 `MTL.xml` document; unknown groups are ignored
#[derive(Debug, Deserialize)]
pub struct MtlDocument {
    #[serde(rename = "PRODUCT_CONTENTS")]
    pub product_contents: ProductContents,
    #[serde(rename = "IMAGE_ATTRIBUTES")]
    pub image_attributes: ImageAttributes,
}

#[derive(Debug, Deserialize)]
pub struct ProductContents {
    #[serde(rename = "LANDSAT_PRODUCT_ID")]
    pub landsat_product_id: String,
    #[serde(rename = "PROCESSING_LEVEL", default)]
    pub processing_level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageAttributes {
    #[serde(rename = "SPACECRAFT_ID")]
    pub spacecraft_id: String,
    #[serde(rename = "WRS_PATH")]
    pub wrs_path: u16,
    #[serde(rename = "WRS_ROW")]
    pub wrs_row: u16,
    #[serde(rename = "DATE_ACQUIRED")]
    pub date_acquired: String,
    #[serde(rename = "SCENE_CENTER_TIME")]
    pub scene_center_time: String,
    #[serde(rename = "CLOUD_COVER", default)]
    pub cloud_cover: Option<f32>,
}

/// Parsed Landsat product identifier,
/// e.g. `LC08_L2SP_012027_20200803_20200914_02_T1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductId {
    pub sensor: Sensor,
    pub processing_level: String,
    pub wrs_path: u16,
    pub wrs_row: u16,
    pub acquired: NaiveDate,
    pub processed: NaiveDate,
    pub collection: u8,
    pub tier: String,
}

const PRODUCT_ID_PATTERN: &str =
    r"^(L[CET]0[4-9])_(L[12][A-Z]{2})_(\d{3})(\d{3})_(\d{8})_(\d{8})_(\d{2})_(T1|T2|RT)$";

impl ProductId {
    pub fn parse(product_id: &str) -> SceneResult<Self> {
        let pattern = Regex::new(PRODUCT_ID_PATTERN)
            .map_err(|e| SceneError::InvalidFormat(format!("Product id pattern: {}", e)))?;
        let invalid = || SceneError::InvalidFormat(format!("Not a Landsat product id: '{}'", product_id));
        let caps = pattern.captures(product_id.trim()).ok_or_else(invalid)?;

        let sensor = Sensor::from_collection_prefix(&caps[1]).ok_or_else(|| {
            SceneError::InvalidFormat(format!("Unsupported Landsat mission '{}'", &caps[1]))
        })?;
        let date = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y%m%d")
                .map_err(|e| SceneError::InvalidFormat(format!("Bad date '{}' in product id: {}", s, e)))
        };

        Ok(Self {
            sensor,
            processing_level: caps[2].to_string(),
            wrs_path: caps[3].parse().map_err(|_| invalid())?,
            wrs_row: caps[4].parse().map_err(|_| invalid())?,
            acquired: date(&caps[5])?,
            processed: date(&caps[6])?,
            collection: caps[7].parse().map_err(|_| invalid())?,
            tier: caps[8].to_string(),
        })
    }

    /// Identity stable across reprocessing: mission, path/row and acquisition date
    pub fn scene_id(&self) -> SceneId {
        SceneId(format!(
            "{}_{:03}{:03}_{}",
            self.sensor.collection_prefix(),
            self.wrs_path,
            self.wrs_row,
            self.acquired.format("%Y%m%d")
        ))
    }
}

/// Reader for Landsat scene metadata
pub struct MetadataReader;

impl MetadataReader {
    pub fn parse_document(xml_content: &str) -> SceneResult<MtlDocument> {
        from_str::<MtlDocument>(xml_content)
            .map_err(|e| SceneError::XmlParsing(format!("Failed to parse MTL XML: {}", e)))
    }

    /// Parse `MTL.xml` content into scene metadata
    pub fn parse_mtl(xml_content: &str) -> SceneResult<SceneMetadata> {
        let doc = Self::parse_document(xml_content)?;
        let attrs = &doc.image_attributes;
        let product = ProductId::parse(&doc.product_contents.landsat_product_id)?;

        let sensor = Sensor::from_spacecraft_id(&attrs.spacecraft_id).ok_or_else(|| {
            SceneError::Metadata(format!("Unknown spacecraft '{}'", attrs.spacecraft_id))
        })?;
        if sensor != product.sensor {
            return Err(SceneError::Metadata(format!(
                "Spacecraft {} disagrees with product id {}",
                attrs.spacecraft_id, doc.product_contents.landsat_product_id
            )));
        }
        if (attrs.wrs_path, attrs.wrs_row) != (product.wrs_path, product.wrs_row) {
            log::warn!(
                "WRS {}/{} in {} differs from product id {}",
                attrs.wrs_path,
                attrs.wrs_row,
                product.scene_id(),
                doc.product_contents.landsat_product_id
            );
        }

        let acquired = parse_acquisition(&attrs.date_acquired, &attrs.scene_center_time)?;
        // Negative cloud cover means it could not be computed
        let cloud_cover = attrs.cloud_cover.filter(|c| *c >= 0.0);

        Ok(SceneMetadata {
            id: product.scene_id(),
            sensor,
            acquired,
            wrs_path: attrs.wrs_path,
            wrs_row: attrs.wrs_row,
            cloud_cover,
        })
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> SceneResult<SceneMetadata> {
        let path = path.as_ref();
        log::debug!("Reading scene metadata from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::parse_mtl(&content)
    }
}

/// Combine `DATE_ACQUIRED` and `SCENE_CENTER_TIME` into a UTC timestamp
fn parse_acquisition(date: &str, time: &str) -> SceneResult<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| SceneError::Metadata(format!("Bad DATE_ACQUIRED '{}': {}", date, e)))?;
    let time_str = time.trim().trim_matches('"');
    let time = NaiveTime::parse_from_str(time_str, "%H:%M:%S%.fZ")
        .or_else(|_| NaiveTime::parse_from_str(time_str, "%H:%M:%S%.f"))
        .map_err(|e| SceneError::Metadata(format!("Bad SCENE_CENTER_TIME '{}': {}", time_str, e)))?;
    Ok(date.and_time(time).and_utc())
}
