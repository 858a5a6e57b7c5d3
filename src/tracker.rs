//! The per-frame tracking pipeline.
//!
//! [`FaceTracker::process`] runs detection, selection, landmark fitting and pose
//! solving on scheduled frames and hands back the cached result on the others.
//! Failures inside a frame never escape: a face that cannot be solved is dropped,
//! and a frame that cannot be processed leaves the previous result in place.

use crate::{
    camera::CameraIntrinsics,
    config::Config,
    face_detection::{detect_face_regions, FaceDetector, NoFaceDetector, SeetaFaceDetector},
    mark_detection::{open_locator, LandmarkLocator, NoLandmarkLocator},
    pose_estimation::PoseEstimator,
    reference_model::ReferenceFaceModel,
    scheduler::{FrameAction, FrameScheduler},
    selection::SelectionPolicy,
    types::{FaceBox, FaceResult, LandmarkSet, TrackedFace},
    utils::{is_blank_frame, to_equalized_gray},
    Result,
};
use image::RgbImage;
use nalgebra::Point3;

/// Face tracker and head pose estimator for a single video stream
pub struct FaceTracker {
    reference: ReferenceFaceModel,
    object_points: Vec<Point3<f64>>,
    estimator: PoseEstimator,
    detector: Box<dyn FaceDetector>,
    locator: Box<dyn LandmarkLocator>,
    selection: SelectionPolicy,
    scheduler: FrameScheduler,
    downscale: u32,
    min_face_size: u32,
    image_width: u32,
    image_height: u32,
}

impl FaceTracker {
    /// Assemble a tracker from explicit components.
    ///
    /// Frame geometry, scheduling, detection and solver settings come from
    /// `config`; model paths in it are ignored.
    pub fn new(
        config: &Config,
        camera: CameraIntrinsics,
        reference: ReferenceFaceModel,
        detector: Box<dyn FaceDetector>,
        locator: Box<dyn LandmarkLocator>,
    ) -> Self {
        let tracker = &config.tracker;
        log::info!(
            "FaceTracker: {}x{} frames, up to {} faces, detecting every {} frame(s), downscale {}",
            tracker.image_width,
            tracker.image_height,
            tracker.max_faces,
            tracker.detect_every_n_frames,
            tracker.downscale
        );

        Self {
            object_points: reference.object_points(),
            reference,
            estimator: PoseEstimator::with_settings(
                camera,
                config.pose.max_iterations,
                config.pose.epsilon,
                config.pose.axis_length,
            ),
            detector,
            locator,
            selection: SelectionPolicy::new(tracker.max_faces),
            scheduler: FrameScheduler::new(tracker.detect_every_n_frames),
            downscale: tracker.downscale.max(1),
            min_face_size: config.face_detection.min_face_size,
            image_width: tracker.image_width,
            image_height: tracker.image_height,
        }
    }

    /// Build a tracker from configuration, loading the models it names.
    ///
    /// A model that fails to load is logged and replaced by a backend that
    /// never finds anything, so the tracker is always constructible. A reference
    /// face table that fails to load falls back to the built-in one.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let models = &config.models;

        let camera = CameraIntrinsics::from_image_size(config.tracker.image_width, config.tracker.image_height);

        let reference = match &models.reference_model {
            Some(path) => ReferenceFaceModel::from_file(path).unwrap_or_else(|e| {
                log::warn!(
                    "Failed to load reference model {}: {e}; using the built-in face",
                    path.display()
                );
                ReferenceFaceModel::generic()
            }),
            None => ReferenceFaceModel::generic(),
        };

        let detector: Box<dyn FaceDetector> =
            match SeetaFaceDetector::new(&models.face_detector, &config.face_detection) {
                Ok(detector) => Box::new(detector),
                Err(e) => {
                    log::warn!(
                        "Failed to load face detector {}: {e}; no faces will be detected",
                        models.face_detector.display()
                    );
                    Box::new(NoFaceDetector)
                }
            };

        let locator = open_locator(config.landmarks.backend, &models.face_landmarks).unwrap_or_else(|e| {
            log::warn!(
                "Failed to load landmark model {}: {e}; no faces will be tracked",
                models.face_landmarks.display()
            );
            Box::new(NoLandmarkLocator)
        });

        Ok(Self::new(config, camera, reference, detector, locator))
    }

    /// Feed the next frame and get the current tracking result.
    ///
    /// `None` means no frame was available this tick. Skipped frames, missing
    /// frames and blank or wrongly sized frames all return the previous result
    /// unchanged; every call still advances the frame count.
    pub fn process(&mut self, frame: Option<&RgbImage>) -> &FaceResult {
        if self.scheduler.advance() == FrameAction::Reuse {
            return self.scheduler.cached();
        }

        let fresh = match frame {
            Some(frame) if frame.dimensions() != (self.image_width, self.image_height) && !is_blank_frame(frame) => {
                log::warn!(
                    "Ignoring {}x{} frame, tracker expects {}x{}",
                    frame.width(),
                    frame.height(),
                    self.image_width,
                    self.image_height
                );
                None
            }
            Some(frame) if !is_blank_frame(frame) => self.run_pipeline(frame),
            Some(_) => {
                log::debug!("Blank frame {}, keeping previous result", self.frame_index());
                None
            }
            None => {
                log::debug!("No frame {}, keeping previous result", self.frame_index());
                None
            }
        };

        match fresh {
            Some(result) => self.scheduler.store(result),
            None => self.scheduler.cached(),
        }
    }

    /// Full pipeline on one frame. `None` keeps the cached result.
    fn run_pipeline(&mut self, frame: &RgbImage) -> Option<FaceResult> {
        let gray = to_equalized_gray(frame);

        let boxes = detect_face_regions(self.detector.as_mut(), &gray, self.downscale, self.min_face_size)
            .unwrap_or_else(|e| {
                log::warn!("Face detection failed: {e}");
                Vec::new()
            });
        let boxes = self.selection.select(boxes);
        if boxes.is_empty() {
            log::debug!("Frame {}: no faces detected", self.frame_index());
            return Some(FaceResult::default());
        }

        let landmark_sets = match self.locator.fit(&gray, &boxes) {
            Ok(sets) => sets,
            Err(e) => {
                log::warn!("Landmark fitting failed, keeping previous result: {e}");
                return None;
            }
        };

        let faces: Vec<TrackedFace> = boxes
            .into_iter()
            .zip(landmark_sets)
            .filter(|(bbox, landmarks)| {
                let valid = landmarks.is_valid();
                if !valid {
                    log::trace!("Dropping face at {bbox:?}: only {} landmarks", landmarks.len());
                }
                valid
            })
            .filter_map(|(bbox, landmarks)| match self.track_face(bbox, landmarks) {
                Ok(face) => Some(face),
                Err(e) => {
                    log::trace!("Dropping face at {bbox:?}: {e}");
                    None
                }
            })
            .collect();

        log::debug!("Frame {}: tracking {} face(s)", self.frame_index(), faces.len());
        Some(FaceResult::new(faces))
    }

    fn track_face(&self, bbox: FaceBox, landmarks: LandmarkSet) -> Result<TrackedFace> {
        let image_points = self.reference.image_points(&landmarks)?;
        let pose = self.estimator.solve(&self.object_points, &image_points)?;

        Ok(TrackedFace {
            bbox,
            landmarks,
            axis_points: self.estimator.project_axes(&pose),
            pose,
        })
    }

    /// Zero-based index of the frame being processed, for logging.
    fn frame_index(&self) -> u64 {
        self.scheduler.current_index().unwrap_or_default()
    }

    pub fn camera(&self) -> &CameraIntrinsics {
        self.estimator.camera()
    }

    pub fn reference_model(&self) -> &ReferenceFaceModel {
        &self.reference
    }

    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    /// Number of frames fed so far, including skipped ones
    pub fn frame_count(&self) -> u64 {
        self.scheduler.frame_count()
    }

    /// The most recent result, without advancing the stream
    pub fn last_result(&self) -> &FaceResult {
        self.scheduler.cached()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn missing_models_config() -> Config {
        let mut config = Config::default();
        config.models.face_detector = PathBuf::from("/nonexistent/seeta.bin");
        config.models.face_landmarks = PathBuf::from("/nonexistent/landmarks.dat");
        config.models.reference_model = Some(PathBuf::from("/nonexistent/face.txt"));
        config
    }

    #[test]
    fn test_missing_models_still_constructible() {
        let mut tracker = FaceTracker::from_config(&missing_models_config()).unwrap();
        assert_eq!(tracker.image_width(), 640);
        assert_eq!(tracker.image_height(), 480);
        assert_eq!(tracker.camera().fx, 640.0);
        assert_eq!(*tracker.reference_model(), ReferenceFaceModel::generic());

        let frame = RgbImage::from_pixel(640, 480, image::Rgb([90, 120, 150]));
        assert!(tracker.process(Some(&frame)).is_empty());
        assert_eq!(tracker.frame_count(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = missing_models_config();
        config.tracker.max_faces = 0;
        assert!(FaceTracker::from_config(&config).is_err());
    }

    #[test]
    fn test_missing_frames_are_counted() {
        let mut tracker = FaceTracker::from_config(&missing_models_config()).unwrap();
        for index in 0..3 {
            assert!(tracker.process(None).is_empty());
            assert_eq!(tracker.frame_index(), index);
        }
        assert_eq!(tracker.frame_count(), 3);
    }
}
