// Joint-level drive-train losses

use crate::model::{Friction, Robot};

use super::{DynamicsError, JointVector, Result};

/// Extra torque the drive has to supply on top of `commanded` at joint velocity `velocity`.
///
/// At rest the static term applies; in motion the kinetic term (in the
/// direction of motion) plus viscous damping. The efficiency loss
/// `commanded / efficiency - commanded` applies in both cases.
pub fn friction_torque(friction: &Friction, commanded: f64, velocity: f64) -> f64 {
    let efficiency_loss = commanded / friction.efficiency - commanded;
    if velocity == 0.0 {
        friction.static_torque + efficiency_loss
    } else {
        friction.kinetic_torque * velocity.signum() + friction.viscous * velocity + efficiency_loss
    }
}

/// `friction_torque` for every joint of the robot
pub fn friction_torques(
    robot: &Robot,
    commanded: &JointVector,
    velocity: &JointVector,
) -> Result<JointVector> {
    let n = robot.dof();
    for (name, v) in [("commanded", commanded), ("velocity", velocity)] {
        if v.len() != n {
            return Err(DynamicsError::Dimension {
                name,
                expected: n,
                got: v.len(),
            });
        }
    }

    Ok(JointVector::from_iterator(
        n,
        robot
            .joints()
            .iter()
            .enumerate()
            .map(|(i, joint)| friction_torque(joint.friction(), commanded[i], velocity[i])),
    ))
}
