//! Ordering and truncation of detected face boxes.

use crate::types::FaceBox;
use std::cmp::Reverse;

/// Keeps the largest detections, up to a fixed count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    max_faces: usize,
}

impl SelectionPolicy {
    /// A policy keeping at most `max_faces` boxes (at least one).
    pub fn new(max_faces: usize) -> Self {
        Self {
            max_faces: max_faces.max(1),
        }
    }

    pub fn max_faces(&self) -> usize {
        self.max_faces
    }

    /// Sort by area, largest first, and keep the first `max_faces`.
    ///
    /// The sort is stable, so boxes of equal area stay in detection order.
    pub fn select(&self, mut boxes: Vec<FaceBox>) -> Vec<FaceBox> {
        boxes.sort_by_key(|b| Reverse(b.area()));
        boxes.truncate(self.max_faces);
        boxes
    }
}
