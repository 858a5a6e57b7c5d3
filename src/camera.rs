//! Approximate pinhole camera model derived from the image size.

use crate::constants::{CAMERA_CENTER_FACTOR, NUM_DISTORTION_COEFFS};
use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics plus lens distortion coefficients (k1, k2, p1, p2, k3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub distortion: [f64; NUM_DISTORTION_COEFFS],
}

impl CameraIntrinsics {
    /// Build intrinsics for an uncalibrated camera.
    ///
    /// The focal length is taken to be the image width and the principal point
    /// the image center, with no lens distortion.
    pub fn from_image_size(width: u32, height: u32) -> Self {
        let focal_length = f64::from(width);
        Self {
            fx: focal_length,
            fy: focal_length,
            cx: f64::from(width) / CAMERA_CENTER_FACTOR,
            cy: f64::from(height) / CAMERA_CENTER_FACTOR,
            distortion: [0.0; NUM_DISTORTION_COEFFS],
        }
    }

    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion: [0.0; NUM_DISTORTION_COEFFS],
        }
    }

    #[must_use]
    pub fn with_distortion(mut self, distortion: [f64; NUM_DISTORTION_COEFFS]) -> Self {
        self.distortion = distortion;
        self
    }

    /// The 3x3 projection matrix.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    pub fn has_distortion(&self) -> bool {
        self.distortion.iter().any(|&k| k != 0.0)
    }

    /// Vertical field of view for an image of the given height, in degrees.
    ///
    /// Used to configure a virtual 3D camera that matches this model.
    pub fn vertical_fov_degrees(&self, image_height: u32) -> f64 {
        (2.0 * (f64::from(image_height) / (2.0 * self.fy)).atan()).to_degrees()
    }

    /// Project a point given in camera coordinates into the image.
    ///
    /// A point on the camera plane (z == 0) is projected as if z were 1.
    pub fn project(&self, point: &Point3<f64>) -> Point2<f64> {
        let inv_z = if point.z == 0.0 { 1.0 } else { 1.0 / point.z };
        let x = point.x * inv_z;
        let y = point.y * inv_z;

        let (xd, yd) = if self.has_distortion() {
            let [k1, k2, p1, p2, k3] = self.distortion;
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (k1 + r2 * (k2 + r2 * k3));
            (
                x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
                y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y,
            )
        } else {
            (x, y)
        };

        Point2::new(self.fx * xd + self.cx, self.fy * yd + self.cy)
    }
}
