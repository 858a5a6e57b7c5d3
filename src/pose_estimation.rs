use crate::{
    camera::CameraIntrinsics,
    constants::{
        DEFAULT_AXIS_LENGTH, DEFAULT_PNP_EPSILON, DEFAULT_PNP_MAX_ITERATIONS, EPSILON, MIN_PNP_CORRESPONDENCES,
    },
    types::Point2f,
    Error, Result,
};
use nalgebra::{DMatrix, DVector, Point2, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e12;
const DIAGONAL_FLOOR: f64 = 1e-12;
const JACOBIAN_STEP: f64 = 1e-6;
const MIN_DEPTH: f64 = 1e-9;
const NUM_PARAMS: usize = 6;

/// Head pose relative to the camera.
///
/// `rotation` is an axis-angle vector (radians), `translation` is in the units of
/// the reference face model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: [f64; 3],
    pub translation: [f64; 3],
}

impl Pose {
    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation: rotation.into(),
            translation: translation.into(),
        }
    }

    pub fn rotation_vector(&self) -> Vector3<f64> {
        Vector3::from(self.rotation)
    }

    pub fn translation_vector(&self) -> Vector3<f64> {
        Vector3::from(self.translation)
    }

    pub fn rotation_matrix(&self) -> Rotation3<f64> {
        Rotation3::new(self.rotation_vector())
    }

    /// Map a reference model point into camera coordinates.
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.rotation_matrix() * point + self.translation_vector()
    }

    /// Pitch, yaw and roll in degrees.
    pub fn euler_degrees(&self) -> [f64; 3] {
        rotation_matrix_to_euler(&self.rotation_matrix())
    }

    /// Unit rotation axis and rotation angle in degrees.
    ///
    /// Returns `None` for a rotation too small to define an axis.
    pub fn axis_angle_degrees(&self) -> Option<(Vector3<f64>, f64)> {
        let rotation = self.rotation_vector();
        let angle = rotation.norm();
        if angle < 1e-9 {
            return None;
        }
        Some((rotation / angle, angle.to_degrees()))
    }

    fn from_params(params: &DVector<f64>) -> Self {
        let rotation = canonical_rotation_vector(Vector3::new(params[0], params[1], params[2]));
        Self {
            rotation: rotation.into(),
            translation: [params[3], params[4], params[5]],
        }
    }
}

/// Same rotation with its angle wrapped into `[0, pi]`.
///
/// The solver works on unbounded parameters and may land on `axis * angle` with
/// `angle > pi`, which equals `-axis * (2pi - angle)`.
pub fn canonical_rotation_vector(rotation: Vector3<f64>) -> Vector3<f64> {
    let angle = rotation.norm();
    if angle < EPSILON {
        return rotation;
    }
    let mut wrapped = angle % std::f64::consts::TAU;
    if wrapped > std::f64::consts::PI {
        wrapped -= std::f64::consts::TAU;
    }
    rotation * (wrapped / angle)
}

/// Convert a rotation matrix to pitch, yaw and roll in degrees.
pub fn rotation_matrix_to_euler(rotation: &Rotation3<f64>) -> [f64; 3] {
    let m = rotation.matrix();
    let pitch = (-m[(1, 2)]).clamp(-1.0, 1.0).asin();
    let yaw = m[(0, 2)].atan2(m[(2, 2)]);
    let roll = m[(1, 0)].atan2(m[(1, 1)]);
    [pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees()]
}

/// Head pose estimator using an iterative perspective correspondence solve
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    camera: CameraIntrinsics,
    max_iterations: usize,
    epsilon: f64,
    axis_points: [Point3<f64>; 4],
}

impl PoseEstimator {
    pub fn new(camera: CameraIntrinsics) -> Self {
        Self::with_settings(camera, DEFAULT_PNP_MAX_ITERATIONS, DEFAULT_PNP_EPSILON, DEFAULT_AXIS_LENGTH)
    }

    pub fn with_settings(camera: CameraIntrinsics, max_iterations: usize, epsilon: f64, axis_length: f64) -> Self {
        Self {
            camera,
            max_iterations,
            epsilon,
            axis_points: [
                Point3::origin(),
                Point3::new(axis_length, 0.0, 0.0),
                Point3::new(0.0, axis_length, 0.0),
                Point3::new(0.0, 0.0, axis_length),
            ],
        }
    }

    pub fn camera(&self) -> &CameraIntrinsics {
        &self.camera
    }

    /// Recover the pose that best maps `object_points` onto `image_points`.
    ///
    /// Levenberg-Marquardt on the reprojection error, starting from zero rotation
    /// and translation. Running out of iterations returns the best pose found.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The point lists differ in length or hold fewer than 4 pairs
    /// - A reference point lands on or behind the camera
    /// - No descent step exists from the initial guess
    /// - The result is not finite
    pub fn solve(&self, object_points: &[Point3<f64>], image_points: &[Point2<f64>]) -> Result<Pose> {
        if object_points.len() != image_points.len() {
            return Err(Error::InvalidInput(format!(
                "Got {} object points but {} image points",
                object_points.len(),
                image_points.len()
            )));
        }
        if object_points.len() < MIN_PNP_CORRESPONDENCES {
            return Err(Error::InvalidInput(format!(
                "Expected at least {} correspondences, got {}",
                MIN_PNP_CORRESPONDENCES,
                object_points.len()
            )));
        }

        let mut params = DVector::<f64>::zeros(NUM_PARAMS);
        let mut residual = self
            .residuals(&params, object_points, image_points)
            .ok_or_else(|| Error::PoseSolveFailed("reference points behind the camera at initial guess".into()))?;
        let mut cost = residual.norm_squared();
        let mut damping = INITIAL_DAMPING;

        for iteration in 0..self.max_iterations {
            let jacobian = self
                .jacobian(&params, object_points, image_points)
                .ok_or_else(|| Error::PoseSolveFailed("degenerate depth while linearizing".into()))?;
            let normal = jacobian.tr_mul(&jacobian);
            let gradient = -jacobian.tr_mul(&residual);

            let mut accepted = None;
            while damping <= MAX_DAMPING {
                let mut damped = normal.clone();
                for i in 0..NUM_PARAMS {
                    damped[(i, i)] += damping * normal[(i, i)].max(DIAGONAL_FLOOR);
                }

                if let Some(step) = damped.lu().solve(&gradient) {
                    let candidate = &params + &step;
                    if let Some(candidate_residual) = self.residuals(&candidate, object_points, image_points) {
                        let candidate_cost = candidate_residual.norm_squared();
                        if candidate_cost < cost {
                            accepted = Some((candidate, candidate_residual, candidate_cost, step.norm()));
                            break;
                        }
                    }
                }
                damping *= 10.0;
            }

            let Some((candidate, candidate_residual, candidate_cost, step_norm)) = accepted else {
                if iteration == 0 && cost > EPSILON {
                    return Err(Error::PoseSolveFailed("no descent direction from initial guess".into()));
                }
                // Local minimum reached
                break;
            };

            let improvement = cost - candidate_cost;
            params = candidate;
            residual = candidate_residual;
            cost = candidate_cost;
            damping = (damping / 10.0).max(MIN_DAMPING);

            if step_norm <= self.epsilon * (params.norm() + self.epsilon) || improvement <= self.epsilon * cost {
                log::trace!("Pose solve converged after {} iterations, cost {cost:e}", iteration + 1);
                break;
            }
        }

        if !cost.is_finite() || params.iter().any(|v| !v.is_finite()) {
            return Err(Error::PoseSolveFailed("non-finite pose".into()));
        }

        Ok(Pose::from_params(&params))
    }

    /// Project 3D reference points through `pose` and the camera model.
    #[allow(clippy::cast_possible_truncation)]
    pub fn project_points(&self, pose: &Pose, points: &[Point3<f64>]) -> Vec<Point2f> {
        let rotation = pose.rotation_matrix();
        let translation = pose.translation_vector();
        points
            .iter()
            .map(|p| {
                let projected = self.camera.project(&(rotation * p + translation));
                Point2f::new(projected.x as f32, projected.y as f32)
            })
            .collect()
    }

    /// Project the origin and the three axis endpoints of the reference frame.
    pub fn project_axes(&self, pose: &Pose) -> [Point2f; 4] {
        let projected = self.project_points(pose, &self.axis_points);
        [projected[0], projected[1], projected[2], projected[3]]
    }

    /// Reprojection residuals, or `None` if any point is not in front of the camera.
    fn residuals(
        &self,
        params: &DVector<f64>,
        object_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
    ) -> Option<DVector<f64>> {
        let rotation = Rotation3::new(Vector3::new(params[0], params[1], params[2]));
        let translation = Vector3::new(params[3], params[4], params[5]);

        let mut residual = DVector::zeros(object_points.len() * 2);
        for (i, (object, image)) in object_points.iter().zip(image_points).enumerate() {
            let camera_point = rotation * object + translation;
            if camera_point.z <= MIN_DEPTH {
                return None;
            }
            let projected = self.camera.project(&camera_point);
            residual[2 * i] = projected.x - image.x;
            residual[2 * i + 1] = projected.y - image.y;
        }
        Some(residual)
    }

    /// Central-difference Jacobian of the residuals.
    fn jacobian(
        &self,
        params: &DVector<f64>,
        object_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
    ) -> Option<DMatrix<f64>> {
        let mut jacobian = DMatrix::zeros(object_points.len() * 2, NUM_PARAMS);
        for j in 0..NUM_PARAMS {
            let h = JACOBIAN_STEP * params[j].abs().max(1.0);
            let mut forward = params.clone();
            forward[j] += h;
            let mut backward = params.clone();
            backward[j] -= h;

            let r_forward = self.residuals(&forward, object_points, image_points)?;
            let r_backward = self.residuals(&backward, object_points, image_points)?;
            jacobian.set_column(j, &((r_forward - r_backward) / (2.0 * h)));
        }
        Some(jacobian)
    }
}
