//! Gauss-Newton refinement of a pose over its inlier set.
//!
//! Minimizes reprojection error in normalized image coordinates with a
//! left-multiplied rotation update through the SO(3) exponential map.

use nalgebra::{Matrix6, Vector2, Vector3, Vector6};

use crate::geometry::so3::{exp_so3, skew};
use crate::geometry::Pose;

/// Update step below which iteration stops early.
const CONVERGENCE_EPS: f64 = 1e-10;

/// Minimum depth for a point to contribute to the normal equations.
const MIN_DEPTH: f64 = 1e-6;

/// Refines `pose` against 3D world points and their normalized image
/// observations. Returns the input pose unchanged when the system is
/// not solvable (degenerate inlier geometry).
pub fn refine_pose(
    pose: &Pose,
    world: &[Vector3<f64>],
    observed: &[Vector2<f64>],
    iterations: usize,
) -> Pose {
    let mut current = *pose;

    for _ in 0..iterations {
        let mut jtj = Matrix6::<f64>::zeros();
        let mut jtr = Vector6::<f64>::zeros();
        let mut used = 0;

        for (pw, obs) in world.iter().zip(observed.iter()) {
            let pc = current.transform_point(pw);
            if pc.z < MIN_DEPTH {
                continue;
            }
            used += 1;

            let inv_z = 1.0 / pc.z;
            let u = pc.x * inv_z;
            let v = pc.y * inv_z;
            let residual = Vector2::new(u - obs.x, v - obs.y);

            // d(u,v)/d(pc)
            let du = Vector3::new(inv_z, 0.0, -pc.x * inv_z * inv_z);
            let dv = Vector3::new(0.0, inv_z, -pc.y * inv_z * inv_z);

            // pc = exp(δθ) R pw + t + δt, so d(pc)/dδθ = -[R pw]× and
            // d(pc)/dδt = I.
            let rotated = current.rotation * pw;
            let dpc_dtheta = -skew(&rotated);

            let mut j_u = Vector6::zeros();
            let mut j_v = Vector6::zeros();
            for k in 0..3 {
                let col = dpc_dtheta.column(k);
                j_u[k] = du.dot(&col.into_owned());
                j_v[k] = dv.dot(&col.into_owned());
            }
            j_u[3] = du.x;
            j_u[4] = du.y;
            j_u[5] = du.z;
            j_v[3] = dv.x;
            j_v[4] = dv.y;
            j_v[5] = dv.z;

            jtj += j_u * j_u.transpose() + j_v * j_v.transpose();
            jtr += j_u * residual.x + j_v * residual.y;
        }

        if used < 3 {
            return current;
        }

        let Some(delta) = jtj.lu().solve(&(-jtr)) else {
            return current;
        };

        let dtheta = Vector3::new(delta[0], delta[1], delta[2]);
        let dt = Vector3::new(delta[3], delta[4], delta[5]);
        current = Pose::new(exp_so3(&dtheta) * current.rotation, current.translation + dt);

        if delta.norm() < CONVERGENCE_EPS {
            break;
        }
    }

    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;

    fn project(pose: &Pose, pw: &Vector3<f64>) -> Vector2<f64> {
        let pc = pose.transform_point(pw);
        Vector2::new(pc.x / pc.z, pc.y / pc.z)
    }

    fn ground_grid() -> Vec<Vector3<f64>> {
        let mut pts = Vec::new();
        for y in 0..5 {
            for x in 0..5 {
                pts.push(Vector3::new(
                    40.0 * x as f64,
                    40.0 * y as f64,
                    ((x + y) % 3) as f64,
                ));
            }
        }
        pts
    }

    #[test]
    fn test_refine_converges_from_perturbed_start() {
        let truth = Pose::new(
            exp_so3(&Vector3::new(0.02, -0.03, 0.05)),
            Vector3::new(-80.0, -75.0, 500.0),
        );
        let world = ground_grid();
        let observed: Vec<Vector2<f64>> = world.iter().map(|p| project(&truth, p)).collect();

        let start = Pose::new(
            exp_so3(&Vector3::new(0.0, 0.0, 0.02)) * truth.rotation,
            truth.translation + Vector3::new(2.0, -1.5, 5.0),
        );
        let refined = refine_pose(&start, &world, &observed, 20);

        assert_relative_eq!(refined.rotation_deviation_rad(&truth.rotation), 0.0, epsilon = 1e-6);
        assert_relative_eq!(refined.translation, truth.translation, epsilon = 1e-4);
    }

    #[test]
    fn test_refine_fixed_point_at_truth() {
        let truth = Pose::new(Matrix3::identity(), Vector3::new(-100.0, -100.0, 400.0));
        let world = ground_grid();
        let observed: Vec<Vector2<f64>> = world.iter().map(|p| project(&truth, p)).collect();

        let refined = refine_pose(&truth, &world, &observed, 5);
        assert_relative_eq!(refined.translation, truth.translation, epsilon = 1e-9);
    }

    #[test]
    fn test_refine_degenerate_input_returns_start() {
        let start = Pose::identity();
        let refined = refine_pose(&start, &[], &[], 5);
        assert_relative_eq!(refined.translation, start.translation, epsilon = 1e-12);
    }
}
