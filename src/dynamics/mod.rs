// Rigid-body dynamics of the serial chain
//
// Inverse dynamics is the recursive Newton-Euler algorithm over the Robot's
// cached home frames, screw axes and spatial inertias. The mass matrix,
// Coriolis/centripetal, gravity and tip-wrench terms are all produced by
// calling inverse dynamics with the other inputs zeroed, so the terms always
// sum to the direct feed-forward torque.

mod friction;
mod integrate;

pub use friction::{friction_torque, friction_torques};
pub use integrate::{SimState, simulate_step};

use nalgebra::{DMatrix, DVector, Vector3};

use crate::model::Robot;
use crate::model::spatial::{Twist, ad, adjoint, screw_exp, trans_inv};

/// One value per joint
pub type JointVector = DVector<f64>;

/// Smallest accepted (min pivot / max pivot)^2 of the mass matrix Cholesky factor
pub const MIN_PIVOT_RATIO: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DynamicsError {
    #[error("{name} has {got} elements, expected {expected}")]
    Dimension {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Mass matrix is not positive definite")]
    SingularMassMatrix,

    #[error("Mass matrix is ill-conditioned (pivot ratio {ratio:e})")]
    IllConditioned { ratio: f64 },

    #[error("Time step must be positive, got {dt}")]
    InvalidTimeStep { dt: f64 },
}

pub type Result<T> = std::result::Result<T, DynamicsError>;

fn check_len(name: &'static str, v: &JointVector, expected: usize) -> Result<()> {
    if v.len() != expected {
        return Err(DynamicsError::Dimension {
            name,
            expected,
            got: v.len(),
        });
    }
    Ok(())
}

/// Joint torques needed for the motion (theta, dtheta, ddtheta) under gravity `g`
/// while the end-effector applies wrench `f_tip` (expressed in the end-effector frame).
///
/// Gravity enters as a base acceleration of -g, so it shares the forward pass
/// with the inertial terms.
pub fn inverse_dynamics(
    robot: &Robot,
    theta: &JointVector,
    dtheta: &JointVector,
    ddtheta: &JointVector,
    g: &Vector3<f64>,
    f_tip: &Twist,
) -> Result<JointVector> {
    let n = robot.dof();
    check_len("theta", theta, n)?;
    check_len("dtheta", dtheta, n)?;
    check_len("ddtheta", ddtheta, n)?;

    let m_list = robot.relative_homes();
    let g_list = robot.spatial_inertias();
    let s_list = robot.screw_axes();

    // Screw axes in link frames, and Ad(T_{i,i-1}) for each link (plus ee)
    let mut a_list: Vec<Twist> = Vec::with_capacity(n);
    let mut ad_list = Vec::with_capacity(n + 1);
    let mut v = vec![Twist::zeros(); n + 1];
    let mut vd = vec![Twist::zeros(); n + 1];
    vd[0] = Twist::new(0.0, 0.0, 0.0, -g.x, -g.y, -g.z);

    // Forward pass: base to tip
    let mut m_i = m_list[0];
    for i in 0..n {
        if i > 0 {
            m_i *= m_list[i];
        }
        let a_i = adjoint(&trans_inv(&m_i)) * s_list[i];
        let ad_i = adjoint(&(screw_exp(&a_i, -theta[i]) * trans_inv(&m_list[i])));

        v[i + 1] = ad_i * v[i] + a_i * dtheta[i];
        vd[i + 1] = ad_i * vd[i] + a_i * ddtheta[i] + ad(&v[i + 1]) * a_i * dtheta[i];

        a_list.push(a_i);
        ad_list.push(ad_i);
    }
    ad_list.push(adjoint(&trans_inv(&m_list[n])));

    // Backward pass: tip to base
    let mut f = *f_tip;
    let mut tau = JointVector::zeros(n);
    for i in (0..n).rev() {
        f = ad_list[i + 1].transpose() * f + g_list[i] * vd[i + 1]
            - ad(&v[i + 1]).transpose() * (g_list[i] * v[i + 1]);
        tau[i] = f.dot(&a_list[i]);
    }

    Ok(tau)
}

/// Feed-forward torque M(theta) ddtheta + c(theta, dtheta) + g(theta) + J^T f_tip,
/// computed in one inverse-dynamics call
pub fn feed_forward(
    robot: &Robot,
    theta: &JointVector,
    dtheta: &JointVector,
    ddtheta: &JointVector,
    g: &Vector3<f64>,
    f_tip: &Twist,
) -> Result<JointVector> {
    inverse_dynamics(robot, theta, dtheta, ddtheta, g, f_tip)
}

/// Joint-space mass matrix; column j is the torque for a unit acceleration of joint j
pub fn mass_matrix(robot: &Robot, theta: &JointVector) -> Result<DMatrix<f64>> {
    let n = robot.dof();
    check_len("theta", theta, n)?;

    let zeros = JointVector::zeros(n);
    let mut m = DMatrix::zeros(n, n);
    for j in 0..n {
        let mut ddtheta = JointVector::zeros(n);
        ddtheta[j] = 1.0;
        let column = inverse_dynamics(
            robot,
            theta,
            &zeros,
            &ddtheta,
            &Vector3::zeros(),
            &Twist::zeros(),
        )?;
        m.set_column(j, &column);
    }
    Ok(m)
}

/// Coriolis and centripetal torques c(theta, dtheta)
pub fn coriolis_torque(
    robot: &Robot,
    theta: &JointVector,
    dtheta: &JointVector,
) -> Result<JointVector> {
    let zeros = JointVector::zeros(robot.dof());
    inverse_dynamics(robot, theta, dtheta, &zeros, &Vector3::zeros(), &Twist::zeros())
}

/// Torques holding the robot still against gravity `g`
pub fn gravity_torque(robot: &Robot, theta: &JointVector, g: &Vector3<f64>) -> Result<JointVector> {
    let zeros = JointVector::zeros(robot.dof());
    inverse_dynamics(robot, theta, &zeros, &zeros, g, &Twist::zeros())
}

/// Torques needed to apply `f_tip` at the end-effector
pub fn tip_wrench_torque(robot: &Robot, theta: &JointVector, f_tip: &Twist) -> Result<JointVector> {
    let zeros = JointVector::zeros(robot.dof());
    inverse_dynamics(robot, theta, &zeros, &zeros, &Vector3::zeros(), f_tip)
}

/// The feed-forward torque split into its terms
#[derive(Debug, Clone, PartialEq)]
pub struct TorqueTerms {
    /// M(theta) ddtheta
    pub inertial: JointVector,
    pub coriolis: JointVector,
    pub gravity: JointVector,
    pub tip_wrench: JointVector,
}

impl TorqueTerms {
    pub fn total(&self) -> JointVector {
        &self.inertial + &self.coriolis + &self.gravity + &self.tip_wrench
    }
}

/// Diagnostic decomposition of `feed_forward`
pub fn decompose(
    robot: &Robot,
    theta: &JointVector,
    dtheta: &JointVector,
    ddtheta: &JointVector,
    g: &Vector3<f64>,
    f_tip: &Twist,
) -> Result<TorqueTerms> {
    check_len("ddtheta", ddtheta, robot.dof())?;
    Ok(TorqueTerms {
        inertial: mass_matrix(robot, theta)? * ddtheta,
        coriolis: coriolis_torque(robot, theta, dtheta)?,
        gravity: gravity_torque(robot, theta, g)?,
        tip_wrench: tip_wrench_torque(robot, theta, f_tip)?,
    })
}

/// Joint accelerations M^-1 (tau - c - g - J^T f_tip)
pub fn forward_dynamics(
    robot: &Robot,
    theta: &JointVector,
    dtheta: &JointVector,
    tau: &JointVector,
    g: &Vector3<f64>,
    f_tip: &Twist,
) -> Result<JointVector> {
    check_len("tau", tau, robot.dof())?;

    let m = mass_matrix(robot, theta)?;
    let rhs = tau
        - coriolis_torque(robot, theta, dtheta)?
        - gravity_torque(robot, theta, g)?
        - tip_wrench_torque(robot, theta, f_tip)?;

    solve_spd(m, &rhs)
}

/// Solve M x = b for a symmetric positive-definite M, refusing badly conditioned systems
fn solve_spd(m: DMatrix<f64>, b: &JointVector) -> Result<JointVector> {
    let chol = m.cholesky().ok_or(DynamicsError::SingularMassMatrix)?;

    let pivots = chol.l_dirty().diagonal();
    let max = pivots.max();
    let min = pivots.min();
    if !(max > 0.0) {
        return Err(DynamicsError::SingularMassMatrix);
    }
    let ratio = (min / max).powi(2);
    if ratio < MIN_PIVOT_RATIO {
        return Err(DynamicsError::IllConditioned { ratio });
    }

    Ok(chol.solve(b))
}
