//! Facial landmark localization inside detected face boxes.

mod dlib;
#[cfg(feature = "onnx")]
mod onnx;
mod shape_predictor;

#[cfg(feature = "onnx")]
pub use onnx::OnnxMarkDetector;
pub use shape_predictor::{CascadeStage, RegressionTree, ShapePredictor, SplitNode};

use crate::{
    config::LandmarkBackend,
    types::{FaceBox, LandmarkSet},
    Result,
};
use image::GrayImage;
use std::path::Path;

/// Locates an ordered landmark set inside each face box.
pub trait LandmarkLocator {
    /// Fit landmarks for all `faces` at once, returning one set per box in box order.
    ///
    /// # Errors
    ///
    /// Fails for the whole batch; no partial results are returned.
    fn fit(&mut self, gray: &GrayImage, faces: &[FaceBox]) -> Result<Vec<LandmarkSet>>;
}

/// Locator that never produces landmarks.
///
/// Stands in for a landmark model that could not be loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLandmarkLocator;

impl LandmarkLocator for NoLandmarkLocator {
    fn fit(&mut self, _gray: &GrayImage, _faces: &[FaceBox]) -> Result<Vec<LandmarkSet>> {
        Ok(Vec::new())
    }
}

/// Open the landmark model at `model_path` with the requested backend.
///
/// # Errors
///
/// Returns an error if the model cannot be loaded, or if the ONNX backend is
/// requested from a build without the `onnx` feature.
pub fn open_locator(backend: LandmarkBackend, model_path: &Path) -> Result<Box<dyn LandmarkLocator>> {
    match backend {
        LandmarkBackend::ShapePredictor => Ok(Box::new(ShapePredictor::from_file(model_path)?)),
        #[cfg(feature = "onnx")]
        LandmarkBackend::Onnx => Ok(Box::new(OnnxMarkDetector::new(model_path)?)),
        #[cfg(not(feature = "onnx"))]
        LandmarkBackend::Onnx => Err(crate::Error::ConfigError(
            "The onnx landmark backend requires building with the `onnx` feature".to_string(),
        )),
    }
}
