// Channel layout: how raw motor encoders map onto joint angles
//
// Each channel is one motor on the MCU. Joint channels come first, in chain
// order, and share their index with the robot joint they measure. Terminal
// channels (grippers) trail the joint channels and carry raw counts.
//
// Decoding is linear in the scaled motor angles m:  q = C m
//   standard               q_i = m_i
//   differential sum       q_i = (m_i + m_p) / 2
//   differential difference q_i = m_p - (m_i + m_p) / 2
//   reference_predecessor  q_i -= m_{i-1}
// Joint-space commands go back to motor space through C^-1.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::model::{JointLimits, Robot};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("Layout has no channels")]
    NoChannels,

    #[error("Layout has {channels} joint channels but the robot has {joints} joints")]
    JointCount { joints: usize, channels: usize },

    #[error("Channel {channel}: joint channels must come before all terminal channels")]
    TerminalNotLast { channel: usize },

    #[error("Channel {channel}: bad differential partner {partner} ({reason})")]
    Partner {
        channel: usize,
        partner: usize,
        reason: &'static str,
    },

    #[error("Channel {channel}: no joint channel precedes it to reference")]
    Predecessor { channel: usize },

    #[error("Channel {channel}: max_delta must be positive, got {value}")]
    MaxDelta { channel: usize, value: f64 },

    #[error("Coupling matrix is singular")]
    SingularCoupling,

    #[error("Expected {expected} counts, got {got}")]
    CountLength { expected: usize, got: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffRole {
    Sum,
    Difference,
}

impl DiffRole {
    fn opposite(self) -> Self {
        match self {
            DiffRole::Sum => DiffRole::Difference,
            DiffRole::Difference => DiffRole::Sum,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Angle is the channel's own scaled count
    #[default]
    Standard,
    /// Raw count, no scaling, no limits
    Terminal,
    /// One half of a differential pair driven by two motors
    Differential { partner: usize, role: DiffRole },
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelSpec {
    #[serde(default)]
    pub kind: ChannelKind,
    /// The encoder measures the absolute angle; subtract the previous motor's angle
    #[serde(default)]
    pub reference_predecessor: bool,
    /// Largest accepted change in decoded angle between two frames
    #[serde(default)]
    pub max_delta: Option<f64>,
}

impl ChannelSpec {
    pub fn standard(max_delta: f64) -> Self {
        Self {
            kind: ChannelKind::Standard,
            reference_predecessor: false,
            max_delta: Some(max_delta),
        }
    }

    pub fn terminal() -> Self {
        Self {
            kind: ChannelKind::Terminal,
            reference_predecessor: false,
            max_delta: None,
        }
    }

    pub fn differential(partner: usize, role: DiffRole, max_delta: f64) -> Self {
        Self {
            kind: ChannelKind::Differential { partner, role },
            reference_predecessor: false,
            max_delta: Some(max_delta),
        }
    }

    pub fn referenced(mut self) -> Self {
        self.reference_predecessor = true;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.kind == ChannelKind::Terminal
    }
}

/// Declarative channel table, as stored in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryLayout {
    pub channels: Vec<ChannelSpec>,
}

impl TelemetryLayout {
    /// Pegasus: yaw, shoulder, elbow (absolute encoder), differential wrist
    /// (pitch is the difference half and also absolute), wrist roll, gripper
    pub fn pegasus() -> Self {
        let bound = 0.3 * PI;
        Self {
            channels: vec![
                ChannelSpec::standard(bound),
                ChannelSpec::standard(bound),
                ChannelSpec::standard(bound).referenced(),
                ChannelSpec::differential(4, DiffRole::Difference, bound).referenced(),
                ChannelSpec::differential(3, DiffRole::Sum, bound),
                ChannelSpec::terminal(),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// A layout validated against a robot, with its scales, limits and coupling matrix
#[derive(Debug, Clone)]
pub struct Coupling {
    channels: Vec<ChannelSpec>,
    scales: Vec<f64>,
    limits: Vec<JointLimits>,
    matrix: DMatrix<f64>,
    inverse: DMatrix<f64>,
}

impl Coupling {
    pub fn new(layout: &TelemetryLayout, robot: &Robot) -> Result<Self, LayoutError> {
        if layout.is_empty() {
            return Err(LayoutError::NoChannels);
        }

        let joints = layout.channels.iter().take_while(|c| !c.is_terminal()).count();
        if let Some(offset) = layout.channels[joints..].iter().position(|c| !c.is_terminal()) {
            return Err(LayoutError::TerminalNotLast {
                channel: joints + offset,
            });
        }
        if joints != robot.dof() {
            return Err(LayoutError::JointCount {
                joints: robot.dof(),
                channels: joints,
            });
        }

        let mut matrix = DMatrix::zeros(joints, joints);
        for (i, spec) in layout.channels.iter().enumerate() {
            if let Some(value) = spec.max_delta {
                if !(value > 0.0) {
                    return Err(LayoutError::MaxDelta { channel: i, value });
                }
            }
            if i >= joints {
                continue;
            }

            match spec.kind {
                ChannelKind::Standard => matrix[(i, i)] = 1.0,
                ChannelKind::Differential { partner, role } => {
                    check_partner(layout, i, partner, role, joints)?;
                    match role {
                        DiffRole::Sum => {
                            matrix[(i, i)] = 0.5;
                            matrix[(i, partner)] = 0.5;
                        }
                        DiffRole::Difference => {
                            matrix[(i, i)] = -0.5;
                            matrix[(i, partner)] = 0.5;
                        }
                    }
                }
                ChannelKind::Terminal => return Err(LayoutError::TerminalNotLast { channel: i }),
            }

            if spec.reference_predecessor {
                if i == 0 {
                    return Err(LayoutError::Predecessor { channel: i });
                }
                matrix[(i, i - 1)] -= 1.0;
            }
        }

        let inverse = matrix
            .clone()
            .try_inverse()
            .ok_or(LayoutError::SingularCoupling)?;

        Ok(Self {
            channels: layout.channels.clone(),
            scales: robot.joints().iter().map(|j| j.enc_scale()).collect(),
            limits: robot.limits().to_vec(),
            matrix,
            inverse,
        })
    }

    /// Total number of channels on the wire
    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of joint (non-terminal) channels
    pub fn joints(&self) -> usize {
        self.scales.len()
    }

    pub fn is_terminal(&self, channel: usize) -> bool {
        channel >= self.joints()
    }

    /// Joint limits of a joint channel; `None` for terminal channels
    pub fn limits(&self, channel: usize) -> Option<JointLimits> {
        self.limits.get(channel).copied()
    }

    pub fn max_delta(&self, channel: usize) -> Option<f64> {
        self.channels[channel].max_delta
    }

    /// Decoded angle of every channel from raw counts (terminal channels pass the count through)
    pub fn decode(&self, counts: &[i64]) -> Result<Vec<f64>, LayoutError> {
        if counts.len() != self.channels() {
            return Err(LayoutError::CountLength {
                expected: self.channels(),
                got: counts.len(),
            });
        }

        let n = self.joints();
        let motor = DVector::from_iterator(
            n,
            counts[..n].iter().zip(&self.scales).map(|(&c, &s)| c as f64 * s),
        );
        let joint = self.motor_to_joint(&motor);

        let mut angles: Vec<f64> = joint.iter().copied().collect();
        angles.extend(counts[n..].iter().map(|&c| c as f64));
        Ok(angles)
    }

    /// Joint angles from scaled motor angles
    pub fn motor_to_joint(&self, motor: &DVector<f64>) -> DVector<f64> {
        &self.matrix * motor
    }

    /// Motor-space vector that produces the given joint-space vector
    pub fn joint_to_motor(&self, joint: &DVector<f64>) -> DVector<f64> {
        &self.inverse * joint
    }
}

fn check_partner(
    layout: &TelemetryLayout,
    channel: usize,
    partner: usize,
    role: DiffRole,
    joints: usize,
) -> Result<(), LayoutError> {
    let fail = |reason| {
        Err(LayoutError::Partner {
            channel,
            partner,
            reason,
        })
    };

    if partner == channel {
        return fail("channel cannot partner itself");
    }
    if partner >= joints {
        return fail("partner is not a joint channel");
    }
    match layout.channels[partner].kind {
        ChannelKind::Differential {
            partner: back,
            role: other,
        } => {
            if back != channel {
                return fail("partner does not point back");
            }
            if other != role.opposite() {
                return fail("pair must have one sum and one difference");
            }
            Ok(())
        }
        _ => fail("partner is not differential"),
    }
}
