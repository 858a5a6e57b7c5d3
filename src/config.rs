//! Configuration management for the face pose tracker

use crate::{
    constants::{
        DEFAULT_AXIS_LENGTH, DEFAULT_MAX_FACES, DEFAULT_MIN_FACE_SIZE, DEFAULT_PNP_EPSILON,
        DEFAULT_PNP_MAX_ITERATIONS, DEFAULT_PYRAMID_SCALE_FACTOR, DEFAULT_SCORE_THRESHOLD,
        DEFAULT_SLIDE_WINDOW_STEP,
    },
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tracker configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model configuration
    pub models: ModelConfig,

    /// Pipeline configuration
    pub tracker: TrackerConfig,

    /// Face detection configuration
    pub face_detection: FaceDetectionConfig,

    /// Landmark configuration
    pub landmarks: LandmarkConfig,

    /// Pose solver configuration
    pub pose: PoseConfig,
}

/// Model file paths configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the SeetaFace face detection model
    pub face_detector: PathBuf,

    /// Path to the landmark model
    pub face_landmarks: PathBuf,

    /// Optional reference face table replacing the built-in one
    pub reference_model: Option<PathBuf>,
}

/// Frame geometry and scheduling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Frame width in pixels
    pub image_width: u32,

    /// Frame height in pixels
    pub image_height: u32,

    /// Maximum number of faces tracked per frame
    pub max_faces: usize,

    /// Run the full pipeline on every Nth frame (1 = every frame)
    pub detect_every_n_frames: u32,

    /// Detect on a copy shrunk by this factor (1 = full resolution)
    pub downscale: u32,
}

/// Face detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceDetectionConfig {
    /// Smallest face to detect, in full-resolution pixels
    pub min_face_size: u32,

    /// Classifier score a window needs to count as a face
    pub score_threshold: f64,

    /// Scale step between image pyramid levels (0.0-1.0, exclusive)
    pub pyramid_scale_factor: f32,

    /// Sliding window step in pixels
    pub slide_window_step: u32,
}

/// Landmark model backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkBackend {
    /// Regression tree cascade (dlib `.dat`, `.dat.bz2` or native format)
    #[default]
    ShapePredictor,
    /// ONNX landmark regressor (requires the `onnx` feature)
    Onnx,
}

/// Landmark configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkConfig {
    pub backend: LandmarkBackend,
}

/// Pose solver parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Iteration cap for the perspective solve
    pub max_iterations: usize,

    /// Relative change below which the solve stops
    pub epsilon: f64,

    /// Length of the projected pose axes, in reference model units
    pub axis_length: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            face_detector: PathBuf::from("assets/seeta_fd_frontal_v1.0.bin"),
            face_landmarks: PathBuf::from("assets/shape_predictor_68_face_landmarks.dat"),
            reference_model: None,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            image_width: 640,
            image_height: 480,
            max_faces: DEFAULT_MAX_FACES,
            detect_every_n_frames: 1,
            downscale: 1,
        }
    }
}

impl Default for FaceDetectionConfig {
    fn default() -> Self {
        Self {
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            pyramid_scale_factor: DEFAULT_PYRAMID_SCALE_FACTOR,
            slide_window_step: DEFAULT_SLIDE_WINDOW_STEP,
        }
    }
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_PNP_MAX_ITERATIONS,
            epsilon: DEFAULT_PNP_EPSILON,
            axis_length: DEFAULT_AXIS_LENGTH,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid configuration YAML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    ///
    /// Model paths are not checked: a missing model degrades the tracker to
    /// detecting nothing rather than failing construction.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        // Validate frame geometry and scheduling
        if self.tracker.image_width == 0 || self.tracker.image_height == 0 {
            return Err(Error::ConfigError(format!(
                "Image size must be positive, got {}x{}",
                self.tracker.image_width, self.tracker.image_height
            )));
        }
        if self.tracker.max_faces == 0 {
            return Err(Error::ConfigError("max_faces must be at least 1".to_string()));
        }
        if self.tracker.detect_every_n_frames == 0 {
            return Err(Error::ConfigError(
                "detect_every_n_frames must be at least 1".to_string(),
            ));
        }
        if self.tracker.downscale == 0 {
            return Err(Error::ConfigError("downscale must be at least 1".to_string()));
        }

        // Validate detector parameters
        if !(self.face_detection.pyramid_scale_factor > 0.0 && self.face_detection.pyramid_scale_factor < 1.0) {
            return Err(Error::ConfigError(
                "Pyramid scale factor must be between 0.0 and 1.0 (exclusive)".to_string(),
            ));
        }
        if self.face_detection.slide_window_step == 0 {
            return Err(Error::ConfigError(
                "Slide window step must be greater than 0".to_string(),
            ));
        }

        // Validate pose parameters
        if self.pose.max_iterations == 0 {
            return Err(Error::ConfigError(
                "Pose max_iterations must be greater than 0".to_string(),
            ));
        }
        if !(self.pose.epsilon.is_finite() && self.pose.epsilon >= 0.0) {
            return Err(Error::ConfigError(
                "Pose epsilon must be a finite non-negative number".to_string(),
            ));
        }
        if !(self.pose.axis_length.is_finite() && self.pose.axis_length > 0.0) {
            return Err(Error::ConfigError("Axis length must be positive".to_string()));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Face Pose Tracker Configuration

# Model paths
models:
  face_detector: "assets/seeta_fd_frontal_v1.0.bin"
  face_landmarks: "assets/shape_predictor_68_face_landmarks.dat"
  # reference_model: "assets/reference_face.txt"

# Frame geometry and scheduling
tracker:
  image_width: 640
  image_height: 480
  max_faces: 5
  detect_every_n_frames: 1
  downscale: 1

# Face detection parameters
face_detection:
  min_face_size: 30
  score_threshold: 2.0
  pyramid_scale_factor: 0.8
  slide_window_step: 4

# Landmark model
landmarks:
  backend: shape_predictor

# Pose solver
pose:
  max_iterations: 50
  epsilon: 1.0e-10
  axis_length: 20.0
"#;
