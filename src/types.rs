//! Core data types shared by the tracking stages.

use crate::{constants::MIN_LANDMARK_COUNT, pose_estimation::Pose};
use serde::{Deserialize, Serialize};

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2f {
    pub x: f32,
    pub y: f32,
}

impl Point2f {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2f) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl std::ops::Add for Point2f {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point2f {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Axis-aligned face rectangle in full-resolution image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBox {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Box area in pixels. Degenerate boxes have zero area.
    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Multiply position and size by an integer factor.
    #[must_use]
    pub fn scaled(&self, factor: i32) -> Self {
        Self::new(
            self.x.saturating_mul(factor),
            self.y.saturating_mul(factor),
            self.width.saturating_mul(factor),
            self.height.saturating_mul(factor),
        )
    }

    /// Intersect with the `width` x `height` image rectangle.
    ///
    /// Returns `None` when nothing of the box remains inside the image.
    pub fn clip(&self, width: i32, height: i32) -> Option<Self> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.x.saturating_add(self.width).min(width);
        let y2 = self.y.saturating_add(self.height).min(height);

        if x2 > x1 && y2 > y1 {
            Some(Self::new(x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }

    /// Center of the box in image coordinates.
    #[allow(clippy::cast_precision_loss)]
    pub fn center(&self) -> Point2f {
        Point2f::new(
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }
}

/// Ordered facial landmarks for one face.
///
/// Indices follow the 68-point iBUG layout (see [`crate::constants::landmark_index`]).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkSet {
    points: Vec<Point2f>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point2f>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point2f] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<Point2f> {
        self.points.get(index).copied()
    }

    /// Whether the set holds enough points to be used for pose estimation.
    pub fn is_valid(&self) -> bool {
        self.points.len() >= MIN_LANDMARK_COUNT
    }

    /// Extents of the landmarks as (top-left, bottom-right) corners.
    pub fn bounds(&self) -> Option<(Point2f, Point2f)> {
        let first = *self.points.first()?;
        let bounds = self.points.iter().fold((first, first), |(min, max), p| {
            (
                Point2f::new(min.x.min(p.x), min.y.min(p.y)),
                Point2f::new(max.x.max(p.x), max.y.max(p.y)),
            )
        });
        Some(bounds)
    }
}

impl std::ops::Index<usize> for LandmarkSet {
    type Output = Point2f;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}

impl From<Vec<Point2f>> for LandmarkSet {
    fn from(points: Vec<Point2f>) -> Self {
        Self::new(points)
    }
}

/// Tracking output for a single face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedFace {
    /// Detected face region
    pub bbox: FaceBox,
    /// Landmarks located inside the region
    pub landmarks: LandmarkSet,
    /// Head pose relative to the camera
    pub pose: Pose,
    /// Origin and X/Y/Z axis endpoints projected into the image
    pub axis_points: [Point2f; 4],
}

/// The most recent valid tracking output, one entry per tracked face.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceResult {
    pub faces: Vec<TrackedFace>,
}

impl FaceResult {
    pub fn new(faces: Vec<TrackedFace>) -> Self {
        Self { faces }
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackedFace> {
        self.faces.iter()
    }
}
