//! Benchmarks for the per-frame tracking pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use face_pose_tracker::{
    camera::CameraIntrinsics,
    config::Config,
    face_detection::{detect_face_regions, FaceDetector},
    mark_detection::LandmarkLocator,
    pose_estimation::{Pose, PoseEstimator},
    reference_model::ReferenceFaceModel,
    tracker::FaceTracker,
    types::{FaceBox, LandmarkSet, Point2f},
    utils::to_equalized_gray,
    Result,
};
use image::{GrayImage, Rgb, RgbImage};
use nalgebra::Vector3;

const FACES: [FaceBox; 3] = [
    FaceBox::new(270, 190, 100, 100),
    FaceBox::new(100, 80, 90, 90),
    FaceBox::new(450, 260, 80, 80),
];

struct FixedDetector;

impl FaceDetector for FixedDetector {
    fn detect(&mut self, _gray: &GrayImage, _min_face_size: u32) -> Result<Vec<FaceBox>> {
        Ok(FACES.to_vec())
    }
}

/// Returns the same pose-consistent landmarks for every face
struct FixedLocator {
    landmarks: LandmarkSet,
}

impl FixedLocator {
    fn new() -> Self {
        let estimator = PoseEstimator::new(CameraIntrinsics::from_image_size(640, 480));
        let reference = ReferenceFaceModel::generic();
        let pose = Pose::new(Vector3::new(0.05, -0.1, 0.0), Vector3::new(0.0, 0.0, 60.0));
        let projected = estimator.project_points(&pose, &reference.object_points());

        let mut points = vec![Point2f::new(320.0, 240.0); 68];
        for (c, p) in reference.correspondences().iter().zip(projected) {
            points[c.landmark_index] = p;
        }
        Self {
            landmarks: LandmarkSet::new(points),
        }
    }
}

impl LandmarkLocator for FixedLocator {
    fn fit(&mut self, _gray: &GrayImage, faces: &[FaceBox]) -> Result<Vec<LandmarkSet>> {
        Ok(vec![self.landmarks.clone(); faces.len()])
    }
}

fn tracker(cadence: u32) -> FaceTracker {
    let mut config = Config::default();
    config.tracker.detect_every_n_frames = cadence;
    FaceTracker::new(
        &config,
        CameraIntrinsics::from_image_size(640, 480),
        ReferenceFaceModel::generic(),
        Box::new(FixedDetector),
        Box::new(FixedLocator::new()),
    )
}

fn benchmark_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    let frame = RgbImage::from_fn(640, 480, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));

    group.bench_function("equalized_gray_640x480", |b| {
        b.iter(|| black_box(to_equalized_gray(black_box(&frame))));
    });

    let gray = to_equalized_gray(&frame);
    for downscale in [1u32, 2, 4] {
        group.bench_with_input(BenchmarkId::new("detect_face_regions", downscale), &downscale, |b, &d| {
            let mut detector = FixedDetector;
            b.iter(|| black_box(detect_face_regions(&mut detector, &gray, d, 30).expect("Detection failed")));
        });
    }

    for cadence in [1u32, 3] {
        group.bench_with_input(BenchmarkId::new("process_frame", cadence), &cadence, |b, &n| {
            let mut tracker = tracker(n);
            b.iter(|| black_box(tracker.process(Some(black_box(&frame))).len()));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_pipeline);
criterion_main!(benches);
