use crate::{
    config::FaceDetectionConfig,
    constants::SEETA_MIN_FACE_SIZE,
    types::FaceBox,
    utils::safe_cast::u32_to_i32,
    Error, Result,
};
use image::{imageops, GrayImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Finds candidate face rectangles in a grayscale image.
///
/// Returned boxes are in the coordinates of the image passed in. No attempt is
/// made to separate false positives from real faces; later stages reject them.
pub trait FaceDetector {
    /// Detect faces no smaller than `min_face_size` pixels.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails on this image.
    fn detect(&mut self, gray: &GrayImage, min_face_size: u32) -> Result<Vec<FaceBox>>;
}

/// SeetaFace cascade detector backed by the `rustface` crate
pub struct SeetaFaceDetector {
    detector: Box<dyn rustface::Detector>,
}

impl SeetaFaceDetector {
    /// Load a SeetaFace model file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The model file cannot be opened
    /// - The model file is not a valid SeetaFace model
    pub fn new<P: AsRef<Path>>(model_path: P, config: &FaceDetectionConfig) -> Result<Self> {
        log::info!(
            "Initializing SeetaFaceDetector with model: {}",
            model_path.as_ref().display()
        );
        let file = File::open(model_path)?;
        let model = rustface::read_model(BufReader::new(file))
            .map_err(|e| Error::ModelError(format!("Failed to read SeetaFace model: {e}")))?;
        Ok(Self::from_model(model, config))
    }

    /// Build a detector from an already loaded model
    pub fn from_model(model: rustface::Model, config: &FaceDetectionConfig) -> Self {
        let mut detector = rustface::create_detector_with_model(model);
        detector.set_score_thresh(config.score_threshold);
        detector.set_pyramid_scale_factor(config.pyramid_scale_factor);
        detector.set_slide_window_step(config.slide_window_step, config.slide_window_step);
        Self { detector }
    }
}

/// Minimum face size the SeetaFace cascade actually scans for.
///
/// The cascade's smallest window is 20 px, so smaller requests are raised to it.
/// On a frame shrunk by `D` this makes the full-resolution minimum `max(min, 20 * D)`
/// rather than `min`.
pub fn seeta_min_face_size(requested: u32) -> u32 {
    requested.max(SEETA_MIN_FACE_SIZE)
}

impl FaceDetector for SeetaFaceDetector {
    fn detect(&mut self, gray: &GrayImage, min_face_size: u32) -> Result<Vec<FaceBox>> {
        let min_face_size = seeta_min_face_size(min_face_size);
        if gray.width() < min_face_size || gray.height() < min_face_size {
            return Ok(Vec::new());
        }

        self.detector.set_min_face_size(min_face_size);
        let image = rustface::ImageData::new(gray.as_raw(), gray.width(), gray.height());

        self.detector
            .detect(&image)
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                Ok(FaceBox::new(
                    bbox.x(),
                    bbox.y(),
                    u32_to_i32(bbox.width())?,
                    u32_to_i32(bbox.height())?,
                ))
            })
            .collect()
    }
}

/// Detector that never finds anything.
///
/// Stands in for a detector whose model could not be loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaceDetector;

impl FaceDetector for NoFaceDetector {
    fn detect(&mut self, _gray: &GrayImage, _min_face_size: u32) -> Result<Vec<FaceBox>> {
        Ok(Vec::new())
    }
}

/// Detect face regions, optionally on a copy shrunk by `downscale`.
///
/// With `downscale > 1` the detector sees an image of `1/downscale` the size and
/// a minimum face size divided by the same factor. Boxes are scaled back up,
/// clipped to `gray`, and dropped if nothing remains.
///
/// Backends may scan for a larger minimum than requested; see
/// [`seeta_min_face_size`].
///
/// # Errors
///
/// Returns an error if the detector fails.
pub fn detect_face_regions(
    detector: &mut dyn FaceDetector,
    gray: &GrayImage,
    downscale: u32,
    min_face_size: u32,
) -> Result<Vec<FaceBox>> {
    let (width, height) = gray.dimensions();
    let full_width = u32_to_i32(width)?;
    let full_height = u32_to_i32(height)?;

    let raw_boxes = if downscale > 1 {
        let small_width = width / downscale;
        let small_height = height / downscale;
        if small_width == 0 || small_height == 0 {
            log::debug!("Frame {width}x{height} too small for downscale {downscale}");
            return Ok(Vec::new());
        }

        let small = imageops::resize(gray, small_width, small_height, imageops::FilterType::Triangle);
        detector.detect(&small, min_face_size / downscale)?
    } else {
        detector.detect(gray, min_face_size)?
    };

    let scale = u32_to_i32(downscale.max(1))?;
    let boxes: Vec<FaceBox> = raw_boxes
        .iter()
        .filter_map(|b| b.scaled(scale).clip(full_width, full_height))
        .collect();

    log::trace!("Detector returned {} boxes, {} kept after clipping", raw_boxes.len(), boxes.len());
    Ok(boxes)
}
