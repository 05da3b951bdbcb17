// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::telemetry::{ChannelState, Direction, SafetyFault};

// Joint reference from planners/teleop -> runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointReference {
    /// Desired joint angles in radians, one per arm joint
    pub angles: Vec<f64>,
    /// Signed gripper speed; magnitude is clamped to the max motor speed
    #[serde(default)]
    pub gripper: f64,
    #[serde(default)]
    pub homing: bool,
}

// Per-joint state published by runtime -> observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JointState {
    pub frames: u64,
    pub joints: Vec<JointReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JointReport {
    pub angle: f64,
    pub velocity: f64,
    pub count: i64,
    pub speed: u16,
    pub direction: Direction,
    /// Torque estimate from the motor current reading, joint channels only
    pub torque: Option<f64>,
    pub comm_fault: bool,
    pub consecutive_faults: u32,
    pub limit_stop: bool,
}

impl From<&ChannelState> for JointReport {
    fn from(ch: &ChannelState) -> Self {
        Self {
            angle: ch.angle,
            velocity: ch.velocity,
            count: ch.count,
            speed: ch.command.speed,
            direction: ch.command.direction,
            torque: None,
            comm_fault: ch.comm_fault,
            consecutive_faults: ch.consecutive_faults,
            limit_stop: ch.limit_stop,
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    /// No fresh joint reference; motors held at zero speed
    CmdStale,
    /// Fresh reference but no telemetry frame decoded yet; motors held at zero speed
    AwaitingTelemetry,
    /// The last telemetry line could not be parsed; no command was sent this cycle
    TelemetryError,
    /// At least one joint was stopped by a safety check this cycle
    SafetyStop,
    /// Dynamics or control failed this cycle; motors held at zero speed
    ControlError,
}

/// Serializable form of a safety fault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultReport {
    CommFault {
        joint: usize,
        previous: f64,
        rejected: f64,
    },
    LimitStop {
        joint: usize,
        angle: f64,
        limit: f64,
    },
}

impl From<&SafetyFault> for FaultReport {
    fn from(fault: &SafetyFault) -> Self {
        match *fault {
            SafetyFault::CommFault {
                joint,
                previous,
                rejected,
                ..
            } => FaultReport::CommFault {
                joint,
                previous,
                rejected,
            },
            SafetyFault::LimitStop {
                joint, angle, limit, ..
            } => FaultReport::LimitStop { joint, angle, limit },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_defaults() {
        let r: JointReference = serde_json::from_str(r#"{"angles": [0.1, 0.2]}"#).unwrap();
        assert_eq!(r.angles, vec![0.1, 0.2]);
        assert_eq!(r.gripper, 0.0);
        assert!(!r.homing);
    }

    #[test]
    fn test_health_names() {
        assert_eq!(serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(), "\"cmd_stale\"");
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::TelemetryError).unwrap(),
            "\"telemetry_error\""
        );
    }

    #[test]
    fn test_fault_report() {
        let fault = SafetyFault::LimitStop {
            joint: 2,
            angle: 2.5,
            limit: 2.4,
            direction: Direction::Increasing,
        };
        let json = serde_json::to_string(&FaultReport::from(&fault)).unwrap();
        assert_eq!(json, r#"{"kind":"limit_stop","joint":2,"angle":2.5,"limit":2.4}"#);
    }
}
