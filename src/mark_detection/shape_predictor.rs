//! Ensemble of regression trees landmark regressor.
//!
//! Implements the cascade from "One Millisecond Face Alignment with an Ensemble
//! of Regression Trees" (Kazemi & Sullivan, 2014) in the layout used by dlib's
//! `shape_predictor`:
//!
//! 1. Start from the mean shape, normalized to the face box.
//! 2. For each cascade stage, sample the stage's feature pixels. Each pixel is
//!    placed at an offset from an anchor landmark of the current estimate, with
//!    the offset rotated and scaled by the similarity transform from the mean
//!    shape to the current estimate.
//! 3. Every tree in the stage compares pixel differences against thresholds and
//!    contributes the shape delta stored at the leaf it reaches.
//! 4. Map the refined shape back into image coordinates.

use super::{dlib, LandmarkLocator};
use crate::{
    types::{FaceBox, LandmarkSet, Point2f},
    Error, Result,
};
use bzip2::read::BzDecoder;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Split test comparing two feature pixels of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitNode {
    pub feature1: u32,
    pub feature2: u32,
    pub threshold: f32,
}

/// A complete binary regression tree in heap order.
///
/// Node `i` has children `2i + 1` (taken when `pixel[feature1] - pixel[feature2]`
/// exceeds the threshold) and `2i + 2`. Node indices past the last split address
/// `leaf_values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    splits: Vec<SplitNode>,
    leaf_values: Vec<Vec<Point2f>>,
}

impl RegressionTree {
    pub fn new(splits: Vec<SplitNode>, leaf_values: Vec<Vec<Point2f>>) -> Self {
        Self { splits, leaf_values }
    }

    fn leaf(&self, features: &[f32]) -> &[Point2f] {
        let mut node = 0usize;
        while let Some(split) = self.splits.get(node) {
            let diff = features[split.feature1 as usize] - features[split.feature2 as usize];
            node = if diff > split.threshold {
                2 * node + 1
            } else {
                2 * node + 2
            };
        }
        &self.leaf_values[node - self.splits.len()]
    }

    fn validate(&self, num_features: usize, num_landmarks: usize) -> Result<()> {
        if self.leaf_values.len() != self.splits.len() + 1 {
            return Err(Error::ModelValidationError(format!(
                "Tree with {} splits needs {} leaves, found {}",
                self.splits.len(),
                self.splits.len() + 1,
                self.leaf_values.len()
            )));
        }

        for split in &self.splits {
            let max_feature = split.feature1.max(split.feature2) as usize;
            if max_feature >= num_features {
                return Err(Error::ModelValidationError(format!(
                    "Split references feature {max_feature} of {num_features}"
                )));
            }
        }

        if let Some(leaf) = self.leaf_values.iter().find(|leaf| leaf.len() != num_landmarks) {
            return Err(Error::ModelValidationError(format!(
                "Leaf holds {} deltas, expected {num_landmarks}",
                leaf.len()
            )));
        }

        Ok(())
    }
}

/// One cascade level: its feature pixel layout and its tree ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeStage {
    trees: Vec<RegressionTree>,
    /// Landmark each feature pixel is attached to
    anchors: Vec<u32>,
    /// Feature pixel offset from its anchor, in mean-shape coordinates
    offsets: Vec<Point2f>,
}

impl CascadeStage {
    pub fn new(trees: Vec<RegressionTree>, anchors: Vec<u32>, offsets: Vec<Point2f>) -> Self {
        Self {
            trees,
            anchors,
            offsets,
        }
    }

    fn extract_features(
        &self,
        image: &GrayImage,
        face: &FaceBox,
        transform: (f32, f32),
        shape: &[Point2f],
        features: &mut Vec<f32>,
    ) {
        let (a, b) = transform;
        features.clear();
        features.extend(self.anchors.iter().zip(&self.offsets).map(|(&anchor, offset)| {
            let rotated = Point2f::new(a * offset.x - b * offset.y, b * offset.x + a * offset.y);
            let location = to_image(face, shape[anchor as usize] + rotated);
            pixel_at(image, location)
        }));
    }

    fn validate(&self, num_landmarks: usize) -> Result<()> {
        if self.anchors.len() != self.offsets.len() {
            return Err(Error::ModelValidationError(format!(
                "Stage has {} anchors but {} offsets",
                self.anchors.len(),
                self.offsets.len()
            )));
        }

        if let Some(&anchor) = self.anchors.iter().find(|&&a| a as usize >= num_landmarks) {
            return Err(Error::ModelValidationError(format!(
                "Anchor landmark {anchor} out of range for {num_landmarks} landmarks"
            )));
        }

        self.trees
            .iter()
            .try_for_each(|tree| tree.validate(self.anchors.len(), num_landmarks))
    }
}

/// Cascaded shape regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapePredictor {
    /// Initial estimate, normalized so the face box spans [0, 1] on both axes
    mean_shape: Vec<Point2f>,
    stages: Vec<CascadeStage>,
}

impl ShapePredictor {
    /// Assemble a predictor and check its internal consistency.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The mean shape is empty or not finite
    /// - There are no cascade stages
    /// - A feature, anchor or leaf does not match the shape or stage layout
    pub fn new(mean_shape: Vec<Point2f>, stages: Vec<CascadeStage>) -> Result<Self> {
        let predictor = Self { mean_shape, stages };
        predictor.validate()?;
        Ok(predictor)
    }

    /// Load a model, choosing the format from the file name.
    ///
    /// `.dat` files are dlib `shape_predictor` models and `.bz2` files are the
    /// same compressed with bzip2. Anything else is read as this crate's own
    /// serialization written by [`Self::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, cannot be decoded, or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading shape predictor: {}", path.display());

        let reader = BufReader::new(File::open(path)?);
        let predictor = match path.extension().and_then(|ext| ext.to_str()) {
            Some("bz2") => dlib::read_shape_predictor(BzDecoder::new(reader))?,
            Some("dat") => dlib::read_shape_predictor(reader)?,
            _ => Self::load(reader)?,
        };

        log::info!(
            "Shape predictor ready: {} landmarks, {} cascade stages",
            predictor.num_landmarks(),
            predictor.num_stages()
        );
        Ok(predictor)
    }

    /// Read a model written by [`Self::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be decoded or fails validation.
    pub fn load<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let predictor: Self = bincode::deserialize(&bytes)?;
        predictor.validate()?;
        Ok(predictor)
    }

    /// Write the model in this crate's binary format.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let bytes = bincode::serialize(self)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    pub fn num_landmarks(&self) -> usize {
        self.mean_shape.len()
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn mean_shape(&self) -> &[Point2f] {
        &self.mean_shape
    }

    /// Predict landmarks for one face box, in image coordinates.
    pub fn predict(&self, image: &GrayImage, face: &FaceBox) -> Vec<Point2f> {
        let mut shape = self.mean_shape.clone();
        let mut features = Vec::new();

        for stage in &self.stages {
            let transform = similarity_transform(&self.mean_shape, &shape);
            stage.extract_features(image, face, transform, &shape, &mut features);

            for tree in &stage.trees {
                for (point, delta) in shape.iter_mut().zip(tree.leaf(&features)) {
                    *point = *point + *delta;
                }
            }
        }

        shape.into_iter().map(|p| to_image(face, p)).collect()
    }

    fn validate(&self) -> Result<()> {
        if self.mean_shape.is_empty() {
            return Err(Error::ModelValidationError("Mean shape is empty".to_string()));
        }
        if !self.mean_shape.iter().all(Point2f::is_finite) {
            return Err(Error::ModelValidationError("Mean shape is not finite".to_string()));
        }
        if self.stages.is_empty() {
            return Err(Error::ModelValidationError(
                "Cascade must have at least one stage".to_string(),
            ));
        }

        let num_landmarks = self.mean_shape.len();
        for (index, stage) in self.stages.iter().enumerate() {
            stage
                .validate(num_landmarks)
                .map_err(|e| Error::ModelValidationError(format!("Cascade stage {index}: {e}")))?;
        }
        Ok(())
    }
}

impl LandmarkLocator for ShapePredictor {
    fn fit(&mut self, gray: &GrayImage, faces: &[FaceBox]) -> Result<Vec<LandmarkSet>> {
        faces
            .iter()
            .map(|face| {
                let points = self.predict(gray, face);
                if points.iter().all(Point2f::is_finite) {
                    Ok(LandmarkSet::new(points))
                } else {
                    Err(Error::ModelError(format!("Non-finite landmarks for face {face:?}")))
                }
            })
            .collect()
    }
}

/// Rotation and scale `(a, b)` of the least-squares similarity transform taking
/// `from` onto `to`, as the matrix `[[a, -b], [b, a]]`.
pub(crate) fn similarity_transform(from: &[Point2f], to: &[Point2f]) -> (f32, f32) {
    let mean = |points: &[Point2f]| {
        let sum = points.iter().fold(Point2f::default(), |acc, p| acc + *p);
        #[allow(clippy::cast_precision_loss)]
        let n = points.len().max(1) as f32;
        Point2f::new(sum.x / n, sum.y / n)
    };
    let from_mean = mean(from);
    let to_mean = mean(to);

    let (mut norm, mut dot, mut cross) = (0.0f32, 0.0f32, 0.0f32);
    for (f, t) in from.iter().zip(to) {
        let f = *f - from_mean;
        let t = *t - to_mean;
        norm += f.x * f.x + f.y * f.y;
        dot += f.x * t.x + f.y * t.y;
        cross += f.x * t.y - f.y * t.x;
    }

    if norm <= f32::EPSILON {
        (1.0, 0.0)
    } else {
        (dot / norm, cross / norm)
    }
}

/// Map a normalized shape point into the face box, with (1, 1) landing on the
/// last pixel of the box.
#[allow(clippy::cast_precision_loss)]
fn to_image(face: &FaceBox, p: Point2f) -> Point2f {
    let span_x = (face.width - 1).max(0) as f32;
    let span_y = (face.height - 1).max(0) as f32;
    Point2f::new(face.x as f32 + p.x * span_x, face.y as f32 + p.y * span_y)
}

/// Intensity of the pixel nearest to `location`, or 0 outside the image.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixel_at(image: &GrayImage, location: Point2f) -> f32 {
    let x = location.x.round();
    let y = location.y.round();
    if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
        return 0.0;
    }

    let (x, y) = (x as u32, y as u32);
    if x < image.width() && y < image.height() {
        f32::from(image.get_pixel(x, y)[0])
    } else {
        0.0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Luma;

    /// Three landmarks on a horizontal line with a single one-split tree.
    ///
    /// The split compares the pixel under landmark 0 with the one under
    /// landmark 1: brighter on the left moves every point right, otherwise down.
    pub(crate) fn two_leaf_predictor() -> ShapePredictor {
        let mean_shape = vec![
            Point2f::new(0.25, 0.5),
            Point2f::new(0.75, 0.5),
            Point2f::new(0.5, 0.5),
        ];
        let tree = RegressionTree::new(
            vec![SplitNode {
                feature1: 0,
                feature2: 1,
                threshold: 0.0,
            }],
            vec![vec![Point2f::new(0.1, 0.0); 3], vec![Point2f::new(0.0, 0.1); 3]],
        );
        let stage = CascadeStage::new(vec![tree], vec![0, 1], vec![Point2f::default(); 2]);
        ShapePredictor::new(mean_shape, vec![stage]).unwrap()
    }

    fn half_image(bright_left: bool) -> GrayImage {
        GrayImage::from_fn(101, 101, |x, _| {
            let left = x < 50;
            if left == bright_left {
                Luma([200])
            } else {
                Luma([0])
            }
        })
    }

    fn assert_points_near(actual: &[Point2f], expected: &[(f32, f32)]) {
        assert_eq!(actual.len(), expected.len());
        for (a, (x, y)) in actual.iter().zip(expected) {
            assert!((a.x - x).abs() < 1e-4, "{a:?} vs ({x}, {y})");
            assert!((a.y - y).abs() < 1e-4, "{a:?} vs ({x}, {y})");
        }
    }

    #[test]
    fn test_predict_takes_right_branch() {
        let predictor = two_leaf_predictor();
        let face = FaceBox::new(0, 0, 101, 101);

        // Left pixel 0, right pixel 200: difference below threshold
        let points = predictor.predict(&half_image(false), &face);
        assert_points_near(&points, &[(25.0, 60.0), (75.0, 60.0), (50.0, 60.0)]);
    }

    #[test]
    fn test_predict_takes_left_branch() {
        let predictor = two_leaf_predictor();
        let face = FaceBox::new(0, 0, 101, 101);

        let points = predictor.predict(&half_image(true), &face);
        assert_points_near(&points, &[(35.0, 50.0), (85.0, 50.0), (60.0, 50.0)]);
    }

    #[test]
    fn test_predict_follows_face_box() {
        let predictor = two_leaf_predictor();
        let image = GrayImage::new(400, 400);
        let face = FaceBox::new(100, 200, 201, 101);

        // Uniform image: difference 0 is not above threshold 0
        let points = predictor.predict(&image, &face);
        assert_points_near(&points, &[(150.0, 260.0), (250.0, 260.0), (200.0, 260.0)]);
    }

    #[test]
    fn test_fit_returns_one_set_per_face() {
        let mut predictor = two_leaf_predictor();
        let image = GrayImage::new(200, 200);
        let faces = [FaceBox::new(0, 0, 50, 50), FaceBox::new(100, 100, 80, 80)];

        let sets = predictor.fit(&image, &faces).unwrap();
        assert_eq!(sets.len(), 2);
        assert!(sets.iter().all(|s| s.len() == 3));
        assert!(sets[1][0].x > 100.0);
    }

    #[test]
    fn test_similarity_transform() {
        let from = [Point2f::new(0.0, 0.0), Point2f::new(1.0, 0.0)];

        // Identity
        let (a, b) = similarity_transform(&from, &from);
        assert!((a - 1.0).abs() < 1e-6 && b.abs() < 1e-6);

        // Quarter turn with doubled scale, plus a translation that must not matter
        let to = [Point2f::new(5.0, 5.0), Point2f::new(5.0, 7.0)];
        let (a, b) = similarity_transform(&from, &to);
        assert!(a.abs() < 1e-6);
        assert!((b - 2.0).abs() < 1e-6);

        // Degenerate source shape
        let point = [Point2f::new(3.0, 3.0); 2];
        assert_eq!(similarity_transform(&point, &to), (1.0, 0.0));
    }

    #[test]
    fn test_pixel_lookup_outside_image() {
        let image = GrayImage::from_pixel(10, 10, Luma([77]));
        assert_eq!(pixel_at(&image, Point2f::new(4.6, 4.4)), 77.0);
        assert_eq!(pixel_at(&image, Point2f::new(-1.0, 4.0)), 0.0);
        assert_eq!(pixel_at(&image, Point2f::new(9.6, 4.0)), 0.0);
        assert_eq!(pixel_at(&image, Point2f::new(f32::NAN, 4.0)), 0.0);
    }

    #[test]
    fn test_validation_rejects_bad_layouts() {
        let mean_shape = vec![Point2f::new(0.5, 0.5); 2];
        let leaf = vec![Point2f::default(); 2];
        let split = SplitNode {
            feature1: 0,
            feature2: 1,
            threshold: 0.0,
        };

        // Leaf count does not match split count
        let tree = RegressionTree::new(vec![split], vec![leaf.clone()]);
        let stage = CascadeStage::new(vec![tree], vec![0, 1], vec![Point2f::default(); 2]);
        assert!(ShapePredictor::new(mean_shape.clone(), vec![stage]).is_err());

        // Split reads a feature the stage does not define
        let tree = RegressionTree::new(vec![split], vec![leaf.clone(), leaf.clone()]);
        let stage = CascadeStage::new(vec![tree], vec![0], vec![Point2f::default()]);
        assert!(ShapePredictor::new(mean_shape.clone(), vec![stage]).is_err());

        // Anchor beyond the shape
        let tree = RegressionTree::new(vec![split], vec![leaf.clone(), leaf.clone()]);
        let stage = CascadeStage::new(vec![tree], vec![0, 5], vec![Point2f::default(); 2]);
        assert!(ShapePredictor::new(mean_shape.clone(), vec![stage]).is_err());

        // Leaf with the wrong number of deltas
        let tree = RegressionTree::new(vec![], vec![vec![Point2f::default(); 3]]);
        let stage = CascadeStage::new(vec![tree], vec![], vec![]);
        assert!(ShapePredictor::new(mean_shape.clone(), vec![stage]).is_err());

        // No stages
        assert!(ShapePredictor::new(mean_shape, vec![]).is_err());

        // Empty mean shape
        assert!(ShapePredictor::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let predictor = two_leaf_predictor();
        let path = std::env::temp_dir().join(format!("shape_predictor_{}.bin", std::process::id()));

        predictor.save(&path).unwrap();
        let loaded = ShapePredictor::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, predictor);
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(ShapePredictor::load(&[1u8, 2, 3][..]).is_err());
    }
}
