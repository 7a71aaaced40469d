//! Python bindings over the array-level operations

use crate::core::{classify, labeling, scale, segmentation, zonal};
use crate::core::segmentation::Segmenter;
use crate::types::SceneError;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::prelude::*;

fn to_py_err(e: SceneError) -> PyErr {
    match e {
        SceneError::Config(_) | SceneError::ShapeMismatch { .. } | SceneError::Processing(_) => {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
        }
        _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e)),
    }
}

/// `(a - b) / (a + b)`, NaN where undefined
#[pyfunction]
fn normalized_difference<'py>(
    py: Python<'py>,
    a: PyReadonlyArray2<'py, f32>,
    b: PyReadonlyArray2<'py, f32>,
) -> PyResult<&'py PyArray2<f32>> {
    let a = a.as_array();
    let b = b.as_array();
    if a.dim() != b.dim() {
        return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
            "Shapes differ: {:?} vs {:?}",
            a.dim(),
            b.dim()
        )));
    }
    Ok(scale::normalized_difference(&a.to_owned(), &b.to_owned()).into_pyarray(py))
}

/// SNIC clusters split into capped connected patches; returns `(labels, count)`
#[pyfunction]
#[pyo3(signature = (bands, seed_spacing=11, neighborhood_size=22, compactness=0.0, max_patch_size=128))]
fn segment_patches<'py>(
    py: Python<'py>,
    bands: Vec<PyReadonlyArray2<'py, f32>>,
    seed_spacing: usize,
    neighborhood_size: usize,
    compactness: f64,
    max_patch_size: usize,
) -> PyResult<(&'py PyArray2<u32>, usize)> {
    let params = segmentation::SegmentationParams {
        seed_spacing,
        neighborhood_size,
        compactness,
        max_patch_size,
    };
    let snic = segmentation::Snic::new(&params).map_err(to_py_err)?;
    let labeler = labeling::ConnectedComponents::new(max_patch_size).map_err(to_py_err)?;

    let views: Vec<_> = bands.iter().map(|b| b.as_array()).collect();
    let clusters = snic.segment(&views).map_err(to_py_err)?;
    let patches = labeler.label(&clusters);
    Ok((patches.labels.into_pyarray(py), patches.count))
}

/// Per-patch mean of `values` broadcast onto the patch pixels; label 0 is unlabeled
#[pyfunction]
fn patch_means<'py>(
    py: Python<'py>,
    labels: PyReadonlyArray2<'py, u32>,
    values: PyReadonlyArray2<'py, f32>,
) -> PyResult<&'py PyArray2<f32>> {
    let labels = labels.as_array().to_owned();
    let count = labels.iter().copied().max().unwrap_or(0) as usize;
    let patches = labeling::Patches { labels, count };
    let means = zonal::patch_mean(&patches, &values.as_array().to_owned()).map_err(to_py_err)?;
    Ok(means.into_pyarray(py))
}

/// Self-masked emerged class from patch-mean NIR
#[pyfunction]
#[pyo3(signature = (mean_nir, nircut=0.05))]
fn classify_emerged<'py>(
    py: Python<'py>,
    mean_nir: PyReadonlyArray2<'py, f32>,
    nircut: f32,
) -> PyResult<&'py PyArray2<f32>> {
    let classifier = classify::Classifier::new(classify::ClassThresholds {
        nircut,
        ..Default::default()
    });
    Ok(classifier.emerged(&mean_nir.as_array().to_owned()).into_pyarray(py))
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(normalized_difference, m)?)?;
    m.add_function(wrap_pyfunction!(segment_patches, m)?)?;
    m.add_function(wrap_pyfunction!(patch_means, m)?)?;
    m.add_function(wrap_pyfunction!(classify_emerged, m)?)?;
    Ok(())
}
