//! Real-time face tracking and 3D head pose estimation.
//!
//! The tracker recovers the position and orientation of each face in a video
//! stream so a virtual object can be rendered registered to it:
//! 1. Grayscale conversion and histogram equalization
//! 2. Face detection (`SeetaFace` cascade), optionally on a downscaled copy
//! 3. Selection of the largest faces, up to a configured count
//! 4. Landmark fitting to the 68-point layout
//! 5. Perspective pose solve against a fixed 3D reference face
//! 6. Projection of the pose axes for drawing
//!
//! Only every Nth frame runs the pipeline; the others reuse the cached result.
//!
//! # Examples
//!
//! ## Tracking a stream
//!
//! ```no_run
//! use face_pose_tracker::{config::Config, frame_source::ImageSequence, tracker::FaceTracker};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::from_file("tracker.yaml")?;
//! config.tracker.detect_every_n_frames = 3;
//!
//! let mut tracker = FaceTracker::from_config(&config)?;
//! let frames = ImageSequence::new(vec![PathBuf::from("frame_000.png"), PathBuf::from("frame_001.png")]);
//!
//! for frame in frames {
//!     for face in tracker.process(frame.as_ref()).iter() {
//!         let [pitch, yaw, roll] = face.pose.euler_degrees();
//!         println!("{:?}: pitch {pitch:.1} yaw {yaw:.1} roll {roll:.1}", face.bbox);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Solving a pose directly
//!
//! ```
//! use face_pose_tracker::{
//!     camera::CameraIntrinsics, pose_estimation::{Pose, PoseEstimator},
//!     reference_model::ReferenceFaceModel,
//! };
//! use nalgebra::{Point2, Vector3};
//!
//! let estimator = PoseEstimator::new(CameraIntrinsics::from_image_size(640, 480));
//! let object_points = ReferenceFaceModel::generic().object_points();
//!
//! // Synthesize observations from a known pose
//! let truth = Pose::new(Vector3::new(0.05, -0.1, 0.0), Vector3::new(2.0, -1.0, 60.0));
//! let image_points: Vec<Point2<f64>> = estimator
//!     .project_points(&truth, &object_points)
//!     .iter()
//!     .map(|p| Point2::new(f64::from(p.x), f64::from(p.y)))
//!     .collect();
//!
//! let pose = estimator.solve(&object_points, &image_points).unwrap();
//! assert!((pose.translation[2] - 60.0).abs() < 0.5);
//! ```

/// Pinhole camera model built from the image size
pub mod camera;

/// YAML configuration
pub mod config;

/// Constants shared across modules
pub mod constants;

/// Error types
pub mod error;

/// Face detection with optional downscaling
pub mod face_detection;

/// Image file sequences as frame sources
pub mod frame_source;

/// Facial landmark localization
pub mod mark_detection;

/// Perspective pose solve and axis projection
pub mod pose_estimation;

/// Landmark to 3D point correspondence table
pub mod reference_model;

/// Processing cadence and result cache
pub mod scheduler;

/// Detection ordering and truncation
pub mod selection;

/// The per-frame pipeline
pub mod tracker;

/// Data types shared by the pipeline stages
pub mod types;

/// Preprocessing and checked casts
pub mod utils;

pub use error::{Error, Result};
