//! Constants used throughout the tracker

/// Number of facial landmarks in the iBUG 68-point layout
pub const NUM_FACIAL_LANDMARKS: usize = 68;

/// Smallest landmark set accepted for pose estimation.
///
/// Index 54 (left mouth corner) is the highest index used by the reference model.
pub const MIN_LANDMARK_COUNT: usize = 55;

/// Landmark indices with fixed anatomical meaning in the 68-point layout
pub mod landmark_index {
    /// Tip of the nose
    pub const NOSE_TIP: usize = 30;
    /// Outer corner of the subject's right eye
    pub const RIGHT_EYE_OUTER: usize = 36;
    /// Outer corner of the subject's left eye
    pub const LEFT_EYE_OUTER: usize = 45;
    /// Right corner of the mouth
    pub const MOUTH_RIGHT: usize = 48;
    /// Left corner of the mouth
    pub const MOUTH_LEFT: usize = 54;
}

/// Camera matrix center factor
pub const CAMERA_CENTER_FACTOR: f64 = 2.0;

/// Number of lens distortion coefficients (k1, k2, p1, p2, k3)
pub const NUM_DISTORTION_COEFFS: usize = 5;

/// Minimum face size in full-resolution pixels
pub const DEFAULT_MIN_FACE_SIZE: u32 = 30;

/// Smallest face size the SeetaFace cascade accepts
pub const SEETA_MIN_FACE_SIZE: u32 = 20;

/// Default SeetaFace classifier score threshold
pub const DEFAULT_SCORE_THRESHOLD: f64 = 2.0;

/// Default image pyramid scale factor
pub const DEFAULT_PYRAMID_SCALE_FACTOR: f32 = 0.8;

/// Default sliding window step in pixels
pub const DEFAULT_SLIDE_WINDOW_STEP: u32 = 4;

/// Default maximum number of tracked faces
pub const DEFAULT_MAX_FACES: usize = 5;

/// Length of the projected reference axes, in reference model units
pub const DEFAULT_AXIS_LENGTH: f64 = 20.0;

/// Minimum correspondences for the iterative perspective solve
pub const MIN_PNP_CORRESPONDENCES: usize = 4;

/// Default iteration cap for the pose solver
pub const DEFAULT_PNP_MAX_ITERATIONS: usize = 50;

/// Default relative convergence threshold for the pose solver
pub const DEFAULT_PNP_EPSILON: f64 = 1e-10;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-10;
