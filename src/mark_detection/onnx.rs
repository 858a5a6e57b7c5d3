use super::LandmarkLocator;
use crate::{
    constants::NUM_FACIAL_LANDMARKS,
    types::{FaceBox, LandmarkSet, Point2f},
    utils::safe_cast::i32_to_u32,
    Error, Result,
};
use image::{imageops, GrayImage};
use ndarray::{Array4, CowArray};
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;

/// Default landmark model input size
const DEFAULT_LANDMARK_INPUT_SIZE: u32 = 128;

/// Facial landmark regressor running an `ONNX` model
pub struct OnnxMarkDetector {
    session: Session,
    input_size: u32,
}

impl OnnxMarkDetector {
    /// Create a new landmark detector from an `ONNX` model file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The ONNX runtime environment cannot be created
    /// - The ONNX model file cannot be loaded
    /// - The model has no inputs or outputs
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        log::info!(
            "Initializing OnnxMarkDetector with model: {}",
            model_path.as_ref().display()
        );
        let environment = Arc::new(
            Environment::builder()
                .with_name("mark_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        if session.inputs.is_empty() || session.outputs.is_empty() {
            return Err(Error::ModelError(
                "Landmark model must have one input and one output".to_string(),
            ));
        }

        Ok(Self {
            session,
            input_size: DEFAULT_LANDMARK_INPUT_SIZE,
        })
    }

    /// Crop, resize and normalize every face into one NHWC batch
    fn preprocess_batch(&self, gray: &GrayImage, faces: &[FaceBox]) -> Result<Array4<f32>> {
        let size = self.input_size as usize;
        let mut batch = Array4::<f32>::zeros((faces.len(), size, size, 3));

        for (idx, face) in faces.iter().enumerate() {
            let crop = imageops::crop_imm(
                gray,
                i32_to_u32(face.x)?,
                i32_to_u32(face.y)?,
                i32_to_u32(face.width)?,
                i32_to_u32(face.height)?,
            )
            .to_image();
            let resized = imageops::resize(
                &crop,
                self.input_size,
                self.input_size,
                imageops::FilterType::Triangle,
            );

            for (x, y, pixel) in resized.enumerate_pixels() {
                let value = f32::from(pixel[0]) / 255.0;
                for ch in 0..3 {
                    batch[[idx, y as usize, x as usize, ch]] = value;
                }
            }
        }

        Ok(batch)
    }

    /// Run forward pass through the model
    fn forward(&self, inputs: Array4<f32>) -> Result<Vec<f32>> {
        let cow_array = CowArray::from(inputs.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;

        let marks_output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| Error::ModelError("No output from landmark model".to_string()))?;

        let marks_tensor = marks_output.try_extract::<f32>()?;
        let marks_view = marks_tensor.view();
        marks_view
            .as_slice()
            .map(<[f32]>::to_vec)
            .ok_or_else(|| Error::ModelError("Landmark output is not contiguous".to_string()))
    }
}

/// Map model output, normalized to the input size, back into image coordinates
#[allow(clippy::cast_precision_loss)]
fn postprocess(marks: &[f32], faces: &[FaceBox], input_size: u32) -> Result<Vec<LandmarkSet>> {
    let per_face = NUM_FACIAL_LANDMARKS * 2;
    if marks.len() < faces.len() * per_face {
        return Err(Error::ModelError(format!(
            "Landmark output has {} values, expected {}",
            marks.len(),
            faces.len() * per_face
        )));
    }

    let input_size = input_size as f32;
    Ok(faces
        .iter()
        .zip(marks.chunks_exact(per_face))
        .map(|(face, coords)| {
            let scale_x = face.width as f32 / input_size;
            let scale_y = face.height as f32 / input_size;
            coords
                .chunks_exact(2)
                .map(|xy| {
                    Point2f::new(
                        face.x as f32 + xy[0] * scale_x,
                        face.y as f32 + xy[1] * scale_y,
                    )
                })
                .collect::<Vec<_>>()
                .into()
        })
        .collect())
}

impl LandmarkLocator for OnnxMarkDetector {
    fn fit(&mut self, gray: &GrayImage, faces: &[FaceBox]) -> Result<Vec<LandmarkSet>> {
        if faces.is_empty() {
            return Ok(Vec::new());
        }

        let batch = self.preprocess_batch(gray, faces)?;
        let marks = self.forward(batch)?;
        postprocess(&marks, faces, self.input_size)
    }
}
