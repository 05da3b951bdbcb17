// Per-cycle safety checks on the decoded state
//
// Faults are records, not errors: the affected channel is stopped for the
// cycle and the loop carries on.

use tracing::warn;

use super::decoder::TelemetryState;
use super::frame::Direction;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SafetyFault {
    #[error("Joint {joint}: angle jumped from {previous:.4} to {rejected:.4} (bound {bound:.4}), holding previous")]
    CommFault {
        joint: usize,
        previous: f64,
        rejected: f64,
        bound: f64,
    },

    #[error("Joint {joint}: angle {angle:.4} past limit {limit:.4}, stopping {direction:?} motion")]
    LimitStop {
        joint: usize,
        angle: f64,
        limit: f64,
        direction: Direction,
    },
}

impl SafetyFault {
    pub fn joint(&self) -> usize {
        match self {
            SafetyFault::CommFault { joint, .. } | SafetyFault::LimitStop { joint, .. } => *joint,
        }
    }
}

/// Anti-corruption check, run right after a frame is decoded.
///
/// A channel whose angle moved by at least its `max_delta` since the previous
/// frame is held at the previous angle and flagged. The flag is recomputed on
/// every decoded frame. The previous angle is the held value, so a bound that
/// is too tight for the real motion keeps tripping.
pub fn check_comm_faults(state: &mut TelemetryState) -> Vec<SafetyFault> {
    let bounds: Vec<Option<f64>> = (0..state.channels().len())
        .map(|i| state.coupling().max_delta(i))
        .collect();

    let mut faults = Vec::new();
    for (i, (ch, bound)) in state.channels_mut().iter_mut().zip(bounds).enumerate() {
        let Some(bound) = bound else {
            ch.comm_fault = false;
            ch.consecutive_faults = 0;
            continue;
        };

        if (ch.prev_angle - ch.angle).abs() >= bound {
            let fault = SafetyFault::CommFault {
                joint: i,
                previous: ch.prev_angle,
                rejected: ch.angle,
                bound,
            };
            ch.angle = ch.prev_angle;
            ch.velocity = 0.0;
            ch.comm_fault = true;
            ch.consecutive_faults += 1;
            warn!("{} ({} in a row)", fault, ch.consecutive_faults);
            faults.push(fault);
        } else {
            ch.comm_fault = false;
            ch.consecutive_faults = 0;
        }
    }
    faults
}

/// Override the cycle's commands: comm-faulted channels get zero speed and
/// zero homing, and joint channels past a limit that are commanded further
/// out get zero speed. Limit flags are recomputed from scratch.
pub fn enforce(state: &mut TelemetryState) -> Vec<SafetyFault> {
    let limits: Vec<_> = (0..state.channels().len())
        .map(|i| state.coupling().limits(i))
        .collect();

    let mut faults = Vec::new();
    for (i, (ch, limits)) in state.channels_mut().iter_mut().zip(limits).enumerate() {
        if ch.comm_fault {
            ch.command.speed = 0;
            ch.command.homing = 0;
        }

        ch.limit_stop = false;
        let Some(limits) = limits else {
            continue;
        };
        if ch.command.speed == 0 {
            continue;
        }

        let limit = match ch.command.direction {
            Direction::Decreasing if ch.angle < limits.lower => limits.lower,
            Direction::Increasing if ch.angle > limits.upper => limits.upper,
            _ => continue,
        };

        let fault = SafetyFault::LimitStop {
            joint: i,
            angle: ch.angle,
            limit,
            direction: ch.command.direction,
        };
        warn!("{}", fault);
        ch.command.speed = 0;
        ch.limit_stop = true;
        faults.push(fault);
    }
    faults
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RobotDescription;
    use crate::telemetry::frame::{MotorCommand, parse_frame};
    use crate::telemetry::layout::{Coupling, TelemetryLayout};
    use nalgebra::DVector;

    fn state() -> TelemetryState {
        let robot = RobotDescription::pegasus().build().unwrap();
        TelemetryState::new(Coupling::new(&TelemetryLayout::pegasus(), &robot).unwrap())
    }

    /// Counts for joint 0 giving roughly `angle` radians
    fn counts_for(state: &TelemetryState, angle: f64) -> i64 {
        let scale = state.coupling().decode(&[1, 0, 0, 0, 0, 0]).unwrap()[0];
        (angle / scale).round() as i64
    }

    fn frame(c0: i64, gripper: i64) -> String {
        format!("[{}|0][0|0][0|0][0|0][0|0][{}|0]", c0, gripper)
    }

    fn feed(state: &mut TelemetryState, line: &str) -> Vec<SafetyFault> {
        state.decode(&parse_frame(line, 6).unwrap(), 0.02).unwrap();
        check_comm_faults(state)
    }

    #[test]
    fn test_small_step_passes() {
        let mut s = state();
        let c = counts_for(&s, 0.1);
        let faults = feed(&mut s, &frame(c, 0));
        assert!(faults.is_empty());
        assert!(!s.channels()[0].comm_fault);
        assert_eq!(s.channels()[0].angle, s.coupling().decode(&[c, 0, 0, 0, 0, 0]).unwrap()[0]);
    }

    #[test]
    fn test_large_step_is_rejected() {
        let mut s = state();
        let ok = counts_for(&s, 0.2);
        feed(&mut s, &frame(ok, 0));
        let held = s.channels()[0].angle;

        let jump = counts_for(&s, 0.2 + 1.5);
        let faults = feed(&mut s, &frame(jump, 0));
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].joint(), 0);
        assert_eq!(s.channels()[0].angle, held);
        assert_eq!(s.channels()[0].velocity, 0.0);
        assert!(s.channels()[0].comm_fault);
        assert_eq!(s.channels()[0].consecutive_faults, 1);

        // Command is zeroed, homing included
        s.set_joint_commands(&DVector::from_element(5, 80.0), 255, true);
        enforce(&mut s);
        assert_eq!(s.channels()[0].command.speed, 0);
        assert_eq!(s.channels()[0].command.homing, 0);
        assert_eq!(s.channels()[1].command.speed, 80);
        assert_eq!(s.channels()[1].command.homing, 1);

        // Back within bound of the held angle: flag clears
        let faults = feed(&mut s, &frame(ok, 0));
        assert!(faults.is_empty());
        assert!(!s.channels()[0].comm_fault);
        assert_eq!(s.channels()[0].consecutive_faults, 0);
    }

    #[test]
    fn test_corrupt_encoder_stops_its_motor_on_the_wire() {
        let mut s = state();
        let faults = feed(&mut s, "[0|0][0|0][3000|0][0|0][0|0][0|0]");
        assert!(faults.iter().any(|f| f.joint() == 2));
        assert!(s.channels()[2].comm_fault);

        // The elbow motor follows the shoulder through the coupling, unless faulted
        s.set_joint_commands(&DVector::from_column_slice(&[0.0, 80.0, 0.0, 0.0, 0.0]), 255, true);
        enforce(&mut s);
        let motors = s.motor_commands(255);
        assert_eq!(motors[1].speed, 80);
        assert_eq!(motors[2].speed, 0);
        assert_eq!(motors[2].homing, 0);
    }

    #[test]
    fn test_consecutive_faults_counted() {
        let mut s = state();
        let far = counts_for(&s, 2.0);
        for n in 1..=3 {
            feed(&mut s, &frame(far, 0));
            assert_eq!(s.channels()[0].consecutive_faults, n);
            assert_eq!(s.channels()[0].angle, 0.0);
        }
    }

    #[test]
    fn test_terminal_has_no_bound() {
        let mut s = state();
        let faults = feed(&mut s, &frame(0, 5000));
        assert!(faults.is_empty());
        assert_eq!(s.channels()[5].angle, 5000.0);
    }

    #[test]
    fn test_limit_stops_outward_motion() {
        let mut s = state();
        // Joint 0 limits are +-pi; walk past the upper one in small steps
        for k in 1..=14 {
            let c = counts_for(&s, 0.25 * k as f64);
            feed(&mut s, &frame(c, 0));
        }
        assert!(s.channels()[0].angle > std::f64::consts::PI);

        s.set_joint_commands(&DVector::from_column_slice(&[60.0, 0.0, 0.0, 0.0, 0.0]), 255, false);
        let faults = enforce(&mut s);
        assert_eq!(faults.len(), 1);
        assert!(matches!(faults[0], SafetyFault::LimitStop { joint: 0, .. }));
        assert_eq!(s.channels()[0].command.speed, 0);
        assert!(s.channels()[0].limit_stop);

        // Moving back inside is allowed and the flag is not sticky
        s.set_joint_commands(&DVector::from_column_slice(&[-60.0, 0.0, 0.0, 0.0, 0.0]), 255, false);
        let faults = enforce(&mut s);
        assert!(faults.is_empty());
        assert_eq!(s.channels()[0].command.speed, 60);
        assert!(!s.channels()[0].limit_stop);
    }

    #[test]
    fn test_limit_ignores_zero_speed_and_terminal() {
        let mut s = state();
        for k in 1..=14 {
            let c = counts_for(&s, 0.25 * k as f64);
            feed(&mut s, &frame(c, 0));
        }
        s.set_joint_commands(&DVector::zeros(5), 255, false);
        s.set_terminal_command(
            5,
            MotorCommand {
                speed: 200,
                direction: Direction::Increasing,
                homing: 0,
            },
        );
        assert!(enforce(&mut s).is_empty());
        assert!(!s.channels()[0].limit_stop);
        assert_eq!(s.channels()[5].command.speed, 200);
    }
}
