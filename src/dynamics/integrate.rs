// Semi-implicit Euler integration of the chain

use nalgebra::Vector3;

use crate::model::Robot;
use crate::model::spatial::Twist;

use super::{DynamicsError, JointVector, Result, forward_dynamics};

/// Joint-space state of a simulated robot
#[derive(Debug, Clone, PartialEq)]
pub struct SimState {
    pub theta: JointVector,
    pub dtheta: JointVector,
    /// Acceleration that produced this state
    pub ddtheta: JointVector,
}

impl SimState {
    pub fn at_rest(theta: JointVector) -> Self {
        let n = theta.len();
        Self {
            theta,
            dtheta: JointVector::zeros(n),
            ddtheta: JointVector::zeros(n),
        }
    }
}

/// Advance `state` by `dt` under joint torques `tau`.
///
/// ddtheta = FD(theta, dtheta, tau), then dtheta += ddtheta dt and
/// theta += dtheta_new dt (velocity first, then position).
pub fn simulate_step(
    robot: &Robot,
    state: &SimState,
    tau: &JointVector,
    g: &Vector3<f64>,
    f_tip: &Twist,
    dt: f64,
) -> Result<SimState> {
    if !(dt > 0.0) {
        return Err(DynamicsError::InvalidTimeStep { dt });
    }

    let ddtheta = forward_dynamics(robot, &state.theta, &state.dtheta, tau, g, f_tip)?;
    let dtheta = &state.dtheta + &ddtheta * dt;
    let theta = &state.theta + &dtheta * dt;

    Ok(SimState {
        theta,
        dtheta,
        ddtheta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RobotDescription;

    #[test]
    fn test_rest_is_fixed_point() {
        let robot = RobotDescription::pegasus().build().unwrap();
        let state = SimState::at_rest(JointVector::zeros(5));
        let next = simulate_step(
            &robot,
            &state,
            &JointVector::zeros(5),
            &Vector3::zeros(),
            &Twist::zeros(),
            0.1,
        )
        .unwrap();
        assert!(next.theta.iter().all(|&x| x == 0.0));
        assert!(next.dtheta.iter().all(|&x| x == 0.0));
        assert!(next.ddtheta.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_rest_elsewhere_is_fixed_point() {
        let robot = RobotDescription::pegasus().build().unwrap();
        let theta = JointVector::from_column_slice(&[0.4, -0.3, 0.9, 1.1, -0.2]);
        let state = SimState::at_rest(theta.clone());
        let next = simulate_step(
            &robot,
            &state,
            &JointVector::zeros(5),
            &Vector3::zeros(),
            &Twist::zeros(),
            0.01,
        )
        .unwrap();
        assert_eq!(next.theta, theta);
        assert!(next.dtheta.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_nonzero_inputs_move_the_state() {
        let robot = RobotDescription::pegasus().build().unwrap();
        let state = SimState {
            theta: JointVector::from_column_slice(&[0.4, -0.3, 0.9, 1.1, -0.2]),
            dtheta: JointVector::from_column_slice(&[0.2, 0.5, -0.1, 0.3, 0.7]),
            ddtheta: JointVector::from_column_slice(&[0.1, 0.2, 0.3, 0.4, 0.5]),
        };
        let tau = JointVector::from_column_slice(&[0.3, -0.2, 0.15, 0.05, -0.04]);
        let next = simulate_step(
            &robot,
            &state,
            &tau,
            &Vector3::new(0.0, 0.0, -9.81),
            &Twist::new(0.01, 0.0, 0.02, 0.1, -0.2, 0.3),
            0.1,
        )
        .unwrap();

        for i in 0..5 {
            assert_ne!(next.theta[i], state.theta[i]);
            assert_ne!(next.dtheta[i], state.dtheta[i]);
        }
        // Position update uses the new velocity
        let expected = &state.theta + &next.dtheta * 0.1;
        assert_eq!(next.theta, expected);
    }

    #[test]
    fn test_rejects_non_positive_dt() {
        let robot = RobotDescription::pegasus().build().unwrap();
        let state = SimState::at_rest(JointVector::zeros(5));
        let err = simulate_step(
            &robot,
            &state,
            &JointVector::zeros(5),
            &Vector3::zeros(),
            &Twist::zeros(),
            0.0,
        )
        .unwrap_err();
        assert_eq!(err, DynamicsError::InvalidTimeStep { dt: 0.0 });
    }
}
