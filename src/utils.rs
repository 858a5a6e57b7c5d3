//! Frame preprocessing shared by the detection and landmark stages.

pub mod safe_cast;

use image::{GrayImage, RgbImage};

/// Convert a color frame to grayscale and equalize its histogram.
pub fn to_equalized_gray(frame: &RgbImage) -> GrayImage {
    let gray = image::imageops::grayscale(frame);
    imageproc::contrast::equalize_histogram(&gray)
}

/// Whether a frame carries no usable content: zero-sized or entirely black.
pub fn is_blank_frame(frame: &RgbImage) -> bool {
    frame.width() == 0 || frame.height() == 0 || frame.as_raw().iter().all(|&v| v == 0)
}
