// Long-lived per-session telemetry state
//
// One instance per robot session. `decode` is the only writer of the
// measured fields; the controller writes commands into the same state and
// the safety checks may override them before they are encoded.

use nalgebra::DVector;
use serde::Serialize;
use tracing::debug;

use super::frame::{Direction, FrameError, MotorCommand, Segment};
use super::layout::Coupling;

/// Everything known about one channel after the latest cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChannelState {
    pub count: i64,
    /// Direction the MCU reports the motor is turning
    pub reported_direction: Direction,
    pub homing: u8,
    pub current: Option<f64>,

    pub angle: f64,
    pub prev_angle: f64,
    pub velocity: f64,

    /// Joint-space command for joint channels, raw command for terminal channels
    pub command: MotorCommand,

    pub comm_fault: bool,
    pub consecutive_faults: u32,
    pub limit_stop: bool,
}

#[derive(Debug, Clone)]
pub struct TelemetryState {
    coupling: Coupling,
    channels: Vec<ChannelState>,
    frames: u64,
}

impl TelemetryState {
    /// Every angle starts at zero, so the first frame is checked against zero
    pub fn new(coupling: Coupling) -> Self {
        let channels = vec![ChannelState::default(); coupling.channels()];
        Self {
            coupling,
            channels,
            frames: 0,
        }
    }

    pub fn coupling(&self) -> &Coupling {
        &self.coupling
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [ChannelState] {
        &mut self.channels
    }

    /// Number of frames decoded this session
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Apply one parsed frame. The previous angle of each channel is taken
    /// from the current one before the new angles are written.
    pub fn decode(&mut self, segments: &[Segment], dt: f64) -> Result<(), FrameError> {
        if segments.len() != self.channels.len() {
            return Err(FrameError::SegmentCount {
                expected: self.channels.len(),
                got: segments.len(),
            });
        }

        let counts: Vec<i64> = segments.iter().map(|s| s.count).collect();
        let angles = self.coupling.decode(&counts)?;

        for ((ch, seg), angle) in self.channels.iter_mut().zip(segments).zip(angles) {
            ch.count = seg.count;
            ch.reported_direction = seg.direction;
            if let Some(homing) = seg.homing {
                ch.homing = homing;
            }
            ch.current = seg.current;

            ch.prev_angle = ch.angle;
            ch.angle = angle;
            ch.velocity = if dt > 0.0 { (angle - ch.prev_angle) / dt } else { 0.0 };
        }

        self.frames += 1;
        debug!("Decoded frame {}: {:?}", self.frames, counts);
        Ok(())
    }

    /// Angles of the joint channels
    pub fn joint_angles(&self) -> DVector<f64> {
        let n = self.coupling.joints();
        DVector::from_iterator(n, self.channels[..n].iter().map(|c| c.angle))
    }

    pub fn joint_velocities(&self) -> DVector<f64> {
        let n = self.coupling.joints();
        DVector::from_iterator(n, self.channels[..n].iter().map(|c| c.velocity))
    }

    /// Store a joint-space effort as per-joint speed and direction
    pub fn set_joint_commands(&mut self, effort: &DVector<f64>, max_speed: u16, homing: bool) {
        let n = self.coupling.joints().min(effort.len());
        for (ch, &u) in self.channels[..n].iter_mut().zip(effort.iter()) {
            let (speed, direction) = quantize(u, max_speed);
            ch.command = MotorCommand {
                speed,
                direction,
                homing: homing as u8,
            };
        }
    }

    /// Set the command of a terminal channel directly
    pub fn set_terminal_command(&mut self, channel: usize, command: MotorCommand) {
        if self.coupling.is_terminal(channel) {
            if let Some(ch) = self.channels.get_mut(channel) {
                ch.command = command;
            }
        }
    }

    /// Zero speed and homing on every channel
    pub fn stop_all(&mut self) {
        for ch in &mut self.channels {
            ch.command = MotorCommand::STOP;
        }
    }

    /// Map the joint-space commands to motor space and quantize them for the wire.
    /// A comm-faulted channel is stopped on the wire even when a coupled joint
    /// asks its motor to move.
    pub fn motor_commands(&self, max_speed: u16) -> Vec<MotorCommand> {
        let n = self.coupling.joints();
        let joint = DVector::from_iterator(
            n,
            self.channels[..n]
                .iter()
                .map(|c| c.command.direction.sign() * c.command.speed as f64),
        );
        let motor = self.coupling.joint_to_motor(&joint);

        let mut out: Vec<MotorCommand> = motor
            .iter()
            .zip(&self.channels[..n])
            .map(|(&u, ch)| {
                if ch.comm_fault {
                    return MotorCommand::STOP;
                }
                let (speed, direction) = quantize(u, max_speed);
                MotorCommand {
                    speed,
                    direction,
                    homing: ch.command.homing,
                }
            })
            .collect();
        out.extend(self.channels[n..].iter().map(|c| c.command));
        out
    }
}

/// speed = min(round(|u|), max_speed), direction from the sign of u
pub fn quantize(effort: f64, max_speed: u16) -> (u16, Direction) {
    if effort.is_nan() {
        return (0, Direction::Increasing);
    }
    let speed = effort.abs().round().min(max_speed as f64) as u16;
    (speed, Direction::of(effort))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RobotDescription;
    use crate::telemetry::frame::parse_frame;
    use crate::telemetry::layout::TelemetryLayout;
    use approx::assert_relative_eq;

    fn state() -> TelemetryState {
        let robot = RobotDescription::pegasus().build().unwrap();
        TelemetryState::new(Coupling::new(&TelemetryLayout::pegasus(), &robot).unwrap())
    }

    #[test]
    fn test_decode_carries_previous_angle() {
        let mut s = state();
        let scale = s.coupling().decode(&[1, 0, 0, 0, 0, 0]).unwrap()[0];

        s.decode(&parse_frame("[10|0][0|0][0|0][0|0][0|0][7|1|1|0.5]", 6).unwrap(), 0.02)
            .unwrap();
        assert_relative_eq!(s.channels()[0].angle, 10.0 * scale);
        assert_eq!(s.channels()[0].prev_angle, 0.0);
        assert_eq!(s.channels()[5].angle, 7.0);
        assert_eq!(s.channels()[5].homing, 1);
        assert_eq!(s.channels()[5].current, Some(0.5));
        assert_eq!(s.channels()[5].reported_direction, Direction::Decreasing);

        s.decode(&parse_frame("[15|0][0|0][0|0][0|0][0|0][7|1]", 6).unwrap(), 0.02)
            .unwrap();
        assert_relative_eq!(s.channels()[0].prev_angle, 10.0 * scale);
        assert_relative_eq!(s.channels()[0].angle, 15.0 * scale);
        assert_relative_eq!(s.channels()[0].velocity, 5.0 * scale / 0.02, epsilon = 1e-9);
        // Homing is kept when a frame omits it
        assert_eq!(s.channels()[5].homing, 1);
        assert_eq!(s.channels()[5].current, None);
        assert_eq!(s.frames(), 2);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let mut s = state();
        let segs = parse_frame("[1|0][2|0]", 2).unwrap();
        assert_eq!(
            s.decode(&segs, 0.02),
            Err(FrameError::SegmentCount { expected: 6, got: 2 })
        );
        assert_eq!(s.frames(), 0);
    }

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(12.4, 255), (12, Direction::Increasing));
        assert_eq!(quantize(-12.6, 255), (13, Direction::Decreasing));
        assert_eq!(quantize(900.0, 255), (255, Direction::Increasing));
        assert_eq!(quantize(-900.0, 100), (100, Direction::Decreasing));
        assert_eq!(quantize(f64::NAN, 255), (0, Direction::Increasing));
    }

    #[test]
    fn test_joint_commands_map_to_motors() {
        let mut s = state();
        // Pure wrist roll: both differential motors turn the same way
        let effort = DVector::from_column_slice(&[0.0, 0.0, 0.0, 0.0, 40.0]);
        s.set_joint_commands(&effort, 255, false);
        s.set_terminal_command(
            5,
            MotorCommand {
                speed: 90,
                direction: Direction::Decreasing,
                homing: 0,
            },
        );

        let motors = s.motor_commands(255);
        assert_eq!(motors.len(), 6);
        assert_eq!(motors[3].speed, 40);
        assert_eq!(motors[4].speed, 40);
        assert_eq!(motors[3].direction, Direction::Increasing);
        assert_eq!(motors[4].direction, Direction::Increasing);
        assert_eq!(motors[5].speed, 90);
        assert!(motors[..3].iter().all(|m| m.speed == 0));
    }

    #[test]
    fn test_referenced_joint_holds_when_predecessor_moves() {
        let mut s = state();
        // Shoulder only: the elbow motor must follow to keep its relative angle
        let effort = DVector::from_column_slice(&[0.0, 50.0, 0.0, 0.0, 0.0]);
        s.set_joint_commands(&effort, 255, false);
        let motors = s.motor_commands(255);
        assert_eq!(motors[1].speed, 50);
        assert_eq!(motors[2].speed, 50);
        assert_eq!(motors[2].direction, Direction::Increasing);
    }

    #[test]
    fn test_faulted_motor_stays_stopped_when_coupled() {
        let mut s = state();
        s.channels_mut()[2].comm_fault = true;
        s.channels_mut()[4].comm_fault = true;

        // Shoulder and wrist roll both drive their coupled motors
        let effort = DVector::from_column_slice(&[0.0, 80.0, 0.0, 0.0, 40.0]);
        s.set_joint_commands(&effort, 255, true);
        let motors = s.motor_commands(255);
        assert_eq!(motors[1].speed, 80);
        assert_eq!(motors[1].homing, 1);
        assert_eq!(motors[2], MotorCommand::STOP);
        assert_eq!(motors[3].speed, 40);
        assert_eq!(motors[3].direction, Direction::Decreasing);
        assert_eq!(motors[4], MotorCommand::STOP);
    }

    #[test]
    fn test_stop_all() {
        let mut s = state();
        s.set_joint_commands(&DVector::from_element(5, 100.0), 255, true);
        s.stop_all();
        assert!(s.motor_commands(255).iter().all(|m| *m == MotorCommand::STOP));
    }
}
