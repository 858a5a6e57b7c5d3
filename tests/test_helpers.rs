//! Helper functions and utilities for tests

#![allow(dead_code)]

use face_pose_tracker::{
    camera::CameraIntrinsics,
    config::Config,
    face_detection::FaceDetector,
    mark_detection::LandmarkLocator,
    pose_estimation::{Pose, PoseEstimator},
    reference_model::ReferenceFaceModel,
    tracker::FaceTracker,
    types::{FaceBox, LandmarkSet, Point2f},
    Error, Result,
};
use image::{GrayImage, Rgb, RgbImage};
use nalgebra::{Rotation3, Vector3};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::rc::Rc;

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

/// Shared call log, readable after the backend has been boxed into a tracker
pub type CallLog = Rc<RefCell<Vec<Vec<FaceBox>>>>;

/// Create a non-blank frame of the tracker's expected size
pub fn test_frame() -> RgbImage {
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        Rgb([u8::try_from(x % 256).unwrap(), u8::try_from(y % 256).unwrap(), 128])
    })
}

/// Tracker settings for 640x480 frames
pub fn test_config(cadence: u32, max_faces: usize) -> Config {
    let mut config = Config::default();
    config.tracker.image_width = WIDTH;
    config.tracker.image_height = HEIGHT;
    config.tracker.detect_every_n_frames = cadence;
    config.tracker.max_faces = max_faces;
    config
}

pub fn test_camera() -> CameraIntrinsics {
    CameraIntrinsics::from_image_size(WIDTH, HEIGHT)
}

/// Assemble a tracker around synthetic backends
pub fn test_tracker(
    cadence: u32,
    max_faces: usize,
    detector: impl FaceDetector + 'static,
    locator: impl LandmarkLocator + 'static,
) -> FaceTracker {
    FaceTracker::new(
        &test_config(cadence, max_faces),
        test_camera(),
        ReferenceFaceModel::generic(),
        Box::new(detector),
        Box::new(locator),
    )
}

/// A head facing the camera upright (eyes above mouth), tilted by the small
/// rotation `tilt` in the face's own frame.
///
/// The reference face has +y pointing up while image y points down, so an
/// untilted upright face is a half turn about x.
pub fn upright_pose(tilt: Vector3<f64>, translation: Vector3<f64>) -> Pose {
    let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), PI) * Rotation3::new(tilt);
    Pose::new(rotation.scaled_axis(), translation)
}

/// Ground-truth head pose for a face box: the head sits where the box is, 60 units away
pub fn pose_for_box(bbox: &FaceBox) -> Pose {
    let center = bbox.center();
    upright_pose(
        Vector3::new(0.05, -0.1, 0.02),
        Vector3::new(
            f64::from(center.x - 320.0) / 12.0,
            f64::from(center.y - 240.0) / 12.0,
            60.0,
        ),
    )
}

/// A landmark set of `count` points whose reference-model entries are exact
/// projections of `pose`
pub fn landmarks_for_pose(pose: &Pose, count: usize) -> LandmarkSet {
    let estimator = PoseEstimator::new(test_camera());
    let reference = ReferenceFaceModel::generic();
    let projected = estimator.project_points(pose, &reference.object_points());

    let mut points = vec![Point2f::new(320.0, 240.0); count];
    for (correspondence, point) in reference.correspondences().iter().zip(projected) {
        if let Some(slot) = points.get_mut(correspondence.landmark_index) {
            *slot = point;
        }
    }
    LandmarkSet::new(points)
}

/// 68-point landmarks consistent with [`pose_for_box`]
pub fn landmarks_for_box(bbox: &FaceBox) -> LandmarkSet {
    landmarks_for_pose(&pose_for_box(bbox), 68)
}

/// Detector replaying scripted per-call results; the last entry repeats.
///
/// A `None` entry fails the call.
pub struct ScriptedDetector {
    script: VecDeque<Option<Vec<FaceBox>>>,
    last: Option<Vec<FaceBox>>,
    calls: Rc<Cell<usize>>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Option<Vec<FaceBox>>>) -> (Self, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let detector = Self {
            script: script.into(),
            last: Some(Vec::new()),
            calls: Rc::clone(&calls),
        };
        (detector, calls)
    }

    /// Always report the same boxes
    pub fn fixed(boxes: Vec<FaceBox>) -> (Self, Rc<Cell<usize>>) {
        Self::new(vec![Some(boxes)])
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect(&mut self, _gray: &GrayImage, _min_face_size: u32) -> Result<Vec<FaceBox>> {
        self.calls.set(self.calls.get() + 1);
        if let Some(next) = self.script.pop_front() {
            self.last = next;
        }
        self.last
            .clone()
            .ok_or_else(|| Error::ModelError("scripted detector failure".into()))
    }
}

/// Locator building landmarks per box through a closure and logging the boxes it sees
pub struct RecordingLocator<F> {
    make: F,
    fail_on_calls: Vec<usize>,
    call: usize,
    log: CallLog,
}

impl<F: FnMut(&FaceBox) -> LandmarkSet> RecordingLocator<F> {
    pub fn new(make: F) -> (Self, CallLog) {
        let log = CallLog::default();
        let locator = Self {
            make,
            fail_on_calls: Vec::new(),
            call: 0,
            log: Rc::clone(&log),
        };
        (locator, log)
    }

    /// Fail the batch on the given zero-based calls
    pub fn failing_on(mut self, calls: Vec<usize>) -> Self {
        self.fail_on_calls = calls;
        self
    }
}

impl<F: FnMut(&FaceBox) -> LandmarkSet> LandmarkLocator for RecordingLocator<F> {
    fn fit(&mut self, _gray: &GrayImage, faces: &[FaceBox]) -> Result<Vec<LandmarkSet>> {
        let call = self.call;
        self.call += 1;
        self.log.borrow_mut().push(faces.to_vec());

        if self.fail_on_calls.contains(&call) {
            return Err(Error::ModelError("scripted locator failure".into()));
        }
        Ok(faces.iter().map(&mut self.make).collect())
    }
}

/// Locator producing pose-consistent 68-point sets for every box
pub fn pose_locator() -> (RecordingLocator<fn(&FaceBox) -> LandmarkSet>, CallLog) {
    RecordingLocator::new(landmarks_for_box as fn(&FaceBox) -> LandmarkSet)
}

/// Assert that two poses agree within the given rotation and translation tolerances.
///
/// Rotations are compared as matrices; the solved rotation vector must also be
/// canonical (angle at most pi).
pub fn assert_pose_close(actual: &Pose, expected: &Pose, rotation_tol: f64, translation_tol: f64) {
    let angle = actual.rotation_vector().norm();
    assert!(angle <= PI + 1e-9, "rotation vector not canonical: angle {angle}");

    let rotation_error = (actual.rotation_matrix().matrix() - expected.rotation_matrix().matrix()).amax();
    let translation_error = (actual.translation_vector() - expected.translation_vector()).amax();
    assert!(
        rotation_error < rotation_tol,
        "rotation error {rotation_error} exceeds {rotation_tol}: {actual:?} vs {expected:?}"
    );
    assert!(
        translation_error < translation_tol,
        "translation error {translation_error} exceeds {translation_tol}: {actual:?} vs {expected:?}"
    );
}
