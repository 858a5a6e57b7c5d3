//! Fixed 3D reference face and its landmark correspondences.
//!
//! The table pairs landmark indices of the 68-point layout with canonical 3D
//! positions on a generic head. A landmark model with a different point ordering
//! must ship its own table; extracting a missing index fails instead of silently
//! pairing the wrong points.

use crate::{
    constants::{landmark_index, MIN_PNP_CORRESPONDENCES},
    types::LandmarkSet,
    Error, Result,
};
use nalgebra::{Point2, Point3};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// One landmark-index to 3D point pairing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub landmark_index: usize,
    pub point: Point3<f64>,
}

impl Correspondence {
    pub fn new(landmark_index: usize, x: f64, y: f64, z: f64) -> Self {
        Self {
            landmark_index,
            point: Point3::new(x, y, z),
        }
    }
}

/// Immutable reference face model shared by every frame and face.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFaceModel {
    correspondences: Vec<Correspondence>,
}

impl ReferenceFaceModel {
    /// Build a model from an explicit correspondence table.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Fewer than 4 correspondences are given
    /// - A landmark index appears more than once
    /// - A coordinate is not finite
    pub fn new(correspondences: Vec<Correspondence>) -> Result<Self> {
        if correspondences.len() < MIN_PNP_CORRESPONDENCES {
            return Err(Error::ModelValidationError(format!(
                "Expected at least {} correspondences, got {}",
                MIN_PNP_CORRESPONDENCES,
                correspondences.len()
            )));
        }

        let mut seen = HashSet::new();
        for c in &correspondences {
            if !seen.insert(c.landmark_index) {
                return Err(Error::ModelValidationError(format!(
                    "Landmark index {} appears more than once",
                    c.landmark_index
                )));
            }
            if !c.point.coords.iter().all(|v| v.is_finite()) {
                return Err(Error::ModelValidationError(format!(
                    "Non-finite coordinate for landmark {}",
                    c.landmark_index
                )));
            }
        }

        Ok(Self { correspondences })
    }

    /// The built-in five-point generic face (eye corners, nose tip, mouth corners).
    pub fn generic() -> Self {
        Self {
            correspondences: vec![
                Correspondence::new(landmark_index::LEFT_EYE_OUTER, 8.27412, 1.33849, 10.63490),
                Correspondence::new(landmark_index::RIGHT_EYE_OUTER, -8.27412, 1.33849, 10.63490),
                Correspondence::new(landmark_index::NOSE_TIP, 0.0, -4.47894, 17.73010),
                Correspondence::new(landmark_index::MOUTH_RIGHT, -4.61960, -10.14360, 12.27940),
                Correspondence::new(landmark_index::MOUTH_LEFT, 4.61960, -10.14360, 12.27940),
            ],
        }
    }

    /// Load a correspondence table from a text file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails [`Self::parse`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Loading reference face model: {}", path.as_ref().display());
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a correspondence table.
    ///
    /// One correspondence per line as `landmark_index x y z`. Blank lines and
    /// lines starting with `#` are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed lines or if [`Self::new`] rejects the table.
    pub fn parse(content: &str) -> Result<Self> {
        let mut correspondences = Vec::new();

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(Error::ModelValidationError(format!(
                    "Line {}: expected 'index x y z', got {} fields",
                    line_no + 1,
                    fields.len()
                )));
            }

            let index = fields[0].parse::<usize>().map_err(|e| {
                Error::ModelValidationError(format!("Line {}: bad landmark index: {e}", line_no + 1))
            })?;

            let mut coords = [0.0f64; 3];
            for (slot, field) in coords.iter_mut().zip(&fields[1..]) {
                *slot = field.parse::<f64>().map_err(|e| {
                    Error::ModelValidationError(format!("Line {}: bad coordinate '{field}': {e}", line_no + 1))
                })?;
            }

            correspondences.push(Correspondence::new(index, coords[0], coords[1], coords[2]));
        }

        Self::new(correspondences)
    }

    pub fn correspondences(&self) -> &[Correspondence] {
        &self.correspondences
    }

    pub fn len(&self) -> usize {
        self.correspondences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.correspondences.is_empty()
    }

    /// The 3D reference points in table order.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        self.correspondences.iter().map(|c| c.point).collect()
    }

    /// Pick the 2D landmark positions matching the table, in table order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingLandmark`] if the set lacks any required index.
    pub fn image_points(&self, landmarks: &LandmarkSet) -> Result<Vec<Point2<f64>>> {
        self.correspondences
            .iter()
            .map(|c| {
                landmarks
                    .get(c.landmark_index)
                    .map(|p| Point2::new(f64::from(p.x), f64::from(p.y)))
                    .ok_or(Error::MissingLandmark {
                        index: c.landmark_index,
                        available: landmarks.len(),
                    })
            })
            .collect()
    }
}

impl Default for ReferenceFaceModel {
    fn default() -> Self {
        Self::generic()
    }
}
