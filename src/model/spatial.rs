// Spatial algebra helpers over nalgebra for SE(3) and se(3)
//
// Conventions follow screw-theory kinematics: twists and wrenches are
// 6-vectors ordered [angular (3); linear (3)], transforms are homogeneous
// 4x4 matrices.

use nalgebra::{Matrix3, Matrix4, Matrix6, Vector3, Vector6};

/// Homogeneous rigid-body transform
pub type Transform = Matrix4<f64>;

/// Twist / screw axis / wrench, [angular; linear]
pub type Twist = Vector6<f64>;

/// 6x6 spatial inertia or adjoint
pub type SpatialMatrix = Matrix6<f64>;

/// Tolerance used to decide if a norm is "zero"
pub const NEAR_ZERO: f64 = 1e-9;

pub fn near_zero(value: f64) -> bool {
    value.abs() < NEAR_ZERO
}

/// Skew-symmetric matrix [w] such that [w] v = w x v
pub fn vec_to_so3(w: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -w.z, w.y, w.z, 0.0, -w.x, -w.y, w.x, 0.0)
}

/// Inverse of `vec_to_so3`
pub fn so3_to_vec(so3: &Matrix3<f64>) -> Vector3<f64> {
    Vector3::new(so3[(2, 1)], so3[(0, 2)], so3[(1, 0)])
}

pub fn angular(v: &Twist) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}

pub fn linear(v: &Twist) -> Vector3<f64> {
    Vector3::new(v[3], v[4], v[5])
}

/// 4x4 se(3) matrix of a twist
pub fn vec_to_se3(v: &Twist) -> Matrix4<f64> {
    let w = vec_to_so3(&angular(v));
    let mut se3 = Matrix4::zeros();
    se3.fixed_view_mut::<3, 3>(0, 0).copy_from(&w);
    se3.fixed_view_mut::<3, 1>(0, 3).copy_from(&linear(v));
    se3
}

pub fn rotation(t: &Transform) -> Matrix3<f64> {
    t.fixed_view::<3, 3>(0, 0).into_owned()
}

pub fn translation(t: &Transform) -> Vector3<f64> {
    t.fixed_view::<3, 1>(0, 3).into_owned()
}

/// Build a transform from a rotation and a translation
pub fn rp_to_trans(r: &Matrix3<f64>, p: &Vector3<f64>) -> Transform {
    let mut t = Transform::identity();
    t.fixed_view_mut::<3, 3>(0, 0).copy_from(r);
    t.fixed_view_mut::<3, 1>(0, 3).copy_from(p);
    t
}

/// Closed-form inverse of a rigid transform: [R^T, -R^T p; 0, 1]
pub fn trans_inv(t: &Transform) -> Transform {
    let rt = rotation(t).transpose();
    let p = translation(t);
    rp_to_trans(&rt, &(-(rt * p)))
}

/// Adjoint representation [Ad_T] = [R, 0; [p]R, R]
pub fn adjoint(t: &Transform) -> SpatialMatrix {
    let r = rotation(t);
    let p = translation(t);
    let pr = vec_to_so3(&p) * r;
    let mut ad_t = SpatialMatrix::zeros();
    ad_t.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
    ad_t.fixed_view_mut::<3, 3>(3, 0).copy_from(&pr);
    ad_t.fixed_view_mut::<3, 3>(3, 3).copy_from(&r);
    ad_t
}

/// Lie bracket operator [ad_V] = [[w], 0; [v], [w]]
///
/// `ad(v1) * v2` is the bracket [V1, V2]; `ad(v)^T` maps wrenches.
pub fn ad(v: &Twist) -> SpatialMatrix {
    let w = vec_to_so3(&angular(v));
    let vx = vec_to_so3(&linear(v));
    let mut ad_v = SpatialMatrix::zeros();
    ad_v.fixed_view_mut::<3, 3>(0, 0).copy_from(&w);
    ad_v.fixed_view_mut::<3, 3>(3, 0).copy_from(&vx);
    ad_v.fixed_view_mut::<3, 3>(3, 3).copy_from(&w);
    ad_v
}

/// Matrix exponential of an se(3) matrix
pub fn matrix_exp6(se3: &Matrix4<f64>) -> Transform {
    let omgmat_theta = se3.fixed_view::<3, 3>(0, 0).into_owned();
    let v_theta = se3.fixed_view::<3, 1>(0, 3).into_owned();
    let theta = so3_to_vec(&omgmat_theta).norm();

    if near_zero(theta) {
        return rp_to_trans(&Matrix3::identity(), &v_theta);
    }

    let omgmat = omgmat_theta / theta;
    let omgmat_sq = omgmat * omgmat;
    let (s, c) = theta.sin_cos();
    let r = Matrix3::identity() + omgmat * s + omgmat_sq * (1.0 - c);
    let g = Matrix3::identity() * theta + omgmat * (1.0 - c) + omgmat_sq * (theta - s);
    rp_to_trans(&r, &(g * v_theta / theta))
}

/// exp([S] theta) for a screw axis S and joint displacement theta
pub fn screw_exp(screw: &Twist, theta: f64) -> Transform {
    matrix_exp6(&vec_to_se3(&(screw * theta)))
}

/// True if the rotation block is orthonormal with det +1 and the bottom row is [0 0 0 1]
pub fn is_rigid_transform(t: &Transform) -> bool {
    let r = rotation(t);
    let orthonormal = (r.transpose() * r - Matrix3::identity()).abs().max() < 1e-6;
    let proper = (r.determinant() - 1.0).abs() < 1e-6;
    let bottom = t[(3, 0)] == 0.0 && t[(3, 1)] == 0.0 && t[(3, 2)] == 0.0 && t[(3, 3)] == 1.0;
    orthonormal && proper && bottom
}

/// A screw axis must have a unit angular part, or zero angular part and a unit linear part
pub fn is_valid_screw(s: &Twist) -> bool {
    let w = angular(s).norm();
    if near_zero(w) {
        (linear(s).norm() - 1.0).abs() < 1e-6
    } else {
        (w - 1.0).abs() < 1e-6
    }
}

/// Pure translation
pub fn translation_transform(x: f64, y: f64, z: f64) -> Transform {
    rp_to_trans(&Matrix3::identity(), &Vector3::new(x, y, z))
}
