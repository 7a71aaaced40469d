use chrono::{Datelike, Timelike};
use seagrass::io::{MetadataReader, ProductId};
use seagrass::types::{SceneError, Sensor};
use std::io::Write;
use tempfile::NamedTempFile;

fn mtl(product_id: &str, spacecraft: &str, cloud_cover: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<LANDSAT_METADATA_FILE>
  <PRODUCT_CONTENTS>
    <ORIGIN>Image courtesy of the U.S. Geological Survey</ORIGIN>
    <LANDSAT_PRODUCT_ID>{}</LANDSAT_PRODUCT_ID>
    <PROCESSING_LEVEL>L2SP</PROCESSING_LEVEL>
    <COLLECTION_NUMBER>02</COLLECTION_NUMBER>
  </PRODUCT_CONTENTS>
  <IMAGE_ATTRIBUTES>
    <SPACECRAFT_ID>{}</SPACECRAFT_ID>
    <SENSOR_ID>OLI_TIRS</SENSOR_ID>
    <WRS_TYPE>2</WRS_TYPE>
    <WRS_PATH>12</WRS_PATH>
    <WRS_ROW>27</WRS_ROW>
    <DATE_ACQUIRED>2020-08-03</DATE_ACQUIRED>
    <SCENE_CENTER_TIME>15:22:13.4427330Z</SCENE_CENTER_TIME>
    <CLOUD_COVER>{}</CLOUD_COVER>
  </IMAGE_ATTRIBUTES>
</LANDSAT_METADATA_FILE>"#,
        product_id, spacecraft, cloud_cover
    )
}

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes()).expect("Failed to write metadata");
    file
}

#[test]
fn test_read_landsat8_mtl() {
    let _ = env_logger::builder().is_test(true).try_init();

    let file = write_temp(&mtl("LC08_L2SP_012027_20200803_20200914_02_T1", "LANDSAT_8", "12.34"));
    let metadata = MetadataReader::read_file(file.path()).expect("Failed to read MTL");

    assert_eq!(metadata.id.as_str(), "LC08_012027_20200803");
    assert_eq!(metadata.sensor, Sensor::Landsat8Oli);
    assert_eq!(metadata.wrs_path, 12);
    assert_eq!(metadata.wrs_row, 27);
    assert_eq!(metadata.acquired.year(), 2020);
    assert_eq!(metadata.month(), 8);
    assert_eq!(metadata.acquired.hour(), 15);
    assert_eq!(metadata.acquired.minute(), 22);
    assert_eq!(metadata.cloud_cover, Some(12.34));
}

#[test]
fn test_unknown_cloud_cover() {
    let xml = mtl("LC08_L2SP_012027_20200803_20200914_02_T1", "LANDSAT_8", "-1");
    let metadata = MetadataReader::parse_mtl(&xml).unwrap();
    assert_eq!(metadata.cloud_cover, None);
}

#[test]
fn test_spacecraft_mismatch_rejected() {
    let xml = mtl("LC08_L2SP_012027_20200803_20200914_02_T1", "LANDSAT_9", "0.0");
    assert!(matches!(MetadataReader::parse_mtl(&xml), Err(SceneError::Metadata(_))));

    let xml = mtl("LC08_L2SP_012027_20200803_20200914_02_T1", "SENTINEL_2A", "0.0");
    assert!(matches!(MetadataReader::parse_mtl(&xml), Err(SceneError::Metadata(_))));
}

#[test]
fn test_malformed_inputs() {
    assert!(matches!(
        MetadataReader::parse_mtl("<LANDSAT_METADATA_FILE><PRODUCT_CONTENTS/></LANDSAT_METADATA_FILE>"),
        Err(SceneError::XmlParsing(_))
    ));

    let xml = mtl("not-a-product", "LANDSAT_8", "0.0");
    assert!(matches!(MetadataReader::parse_mtl(&xml), Err(SceneError::InvalidFormat(_))));

    let missing = std::env::temp_dir().join("seagrass-no-such-MTL.xml");
    assert!(matches!(MetadataReader::read_file(&missing), Err(SceneError::Io(_))));
}

#[test]
fn test_scene_id_stable_across_reprocessing() {
    let first = ProductId::parse("LE07_L2SP_012027_20010915_20200905_02_T1").unwrap();
    let second = ProductId::parse("LE07_L2SP_012027_20010915_20211102_02_T2").unwrap();
    assert_ne!(first, second);
    assert_eq!(first.scene_id(), second.scene_id());
    assert_eq!(first.sensor, Sensor::Landsat7Etm);
}
