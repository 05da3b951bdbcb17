use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use super::link::LinkRef;
use super::spatial::{Twist, is_valid_screw};

/// Frame the screw axis is expressed in at the home configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrewFrame {
    #[default]
    Space,
    /// End-effector body frame
    Body,
}

/// Joint angle limits in radians, [lower, upper]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    pub lower: f64,
    pub upper: f64,
}

impl JointLimits {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }
}

impl Default for JointLimits {
    fn default() -> Self {
        Self::new(-TAU, TAU)
    }
}

/// Drive-train loss model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Friction {
    /// Static friction torque (N m)
    pub static_torque: f64,
    /// Kinetic friction torque (N m)
    pub kinetic_torque: f64,
    /// Viscous damping coefficient (N m / (rad/s))
    pub viscous: f64,
    /// Torque efficiency in (0, 1]
    pub efficiency: f64,
}

impl Friction {
    /// No losses at all
    pub fn lossless() -> Self {
        Self {
            static_torque: 0.0,
            kinetic_torque: 0.0,
            viscous: 0.0,
            efficiency: 1.0,
        }
    }
}

impl Default for Friction {
    fn default() -> Self {
        Self::lossless()
    }
}

/// Everything needed to build a joint
#[derive(Debug, Clone, PartialEq)]
pub struct JointParams {
    pub screw_axis: Twist,
    pub frame: ScrewFrame,
    /// Reduction 1:gear_ratio between motor shaft and joint
    pub gear_ratio: f64,
    /// Motor torque constant (N m / A)
    pub motor_constant: f64,
    /// Encoder counts per revolution of the motor shaft
    pub counts_per_rev: u32,
    pub limits: JointLimits,
    pub friction: Friction,
    /// Neighbouring bodies [prev, next]
    pub links: [LinkRef; 2],
}

/// A single actuated revolute/prismatic joint
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    screw_axis: Twist,
    frame: ScrewFrame,
    gear_ratio: f64,
    motor_constant: f64,
    enc_scale: f64,
    limits: JointLimits,
    friction: Friction,
    links: [LinkRef; 2],
}

impl Joint {
    pub fn new(index: usize, params: JointParams) -> Result<Self, ConfigError> {
        if !is_valid_screw(&params.screw_axis) {
            return Err(ConfigError::InvalidScrew { joint: index });
        }
        if !(params.gear_ratio > 0.0) {
            return Err(ConfigError::NonPositive {
                joint: index,
                field: "gear_ratio",
                value: params.gear_ratio,
            });
        }
        if params.counts_per_rev == 0 {
            return Err(ConfigError::NonPositive {
                joint: index,
                field: "counts_per_rev",
                value: 0.0,
            });
        }
        if params.limits.lower > params.limits.upper {
            return Err(ConfigError::InvertedLimits {
                joint: index,
                lower: params.limits.lower,
                upper: params.limits.upper,
            });
        }

        let friction = params.friction;
        if !(friction.efficiency > 0.0 && friction.efficiency <= 1.0) {
            return Err(ConfigError::InvalidEfficiency {
                joint: index,
                value: friction.efficiency,
            });
        }
        if friction.static_torque < 0.0 || friction.kinetic_torque < 0.0 || friction.viscous < 0.0 {
            return Err(ConfigError::NegativeFriction { joint: index });
        }

        let enc_scale = TAU / (params.counts_per_rev as f64 * params.gear_ratio);

        Ok(Self {
            screw_axis: params.screw_axis,
            frame: params.frame,
            gear_ratio: params.gear_ratio,
            motor_constant: params.motor_constant,
            enc_scale,
            limits: params.limits,
            friction,
            links: params.links,
        })
    }

    /// Screw axis as given, in `self.frame()`
    pub fn screw_axis(&self) -> &Twist {
        &self.screw_axis
    }

    pub fn frame(&self) -> ScrewFrame {
        self.frame
    }

    /// Radians of joint travel per encoder count: 2pi / (cpr * gear_ratio)
    pub fn enc_scale(&self) -> f64 {
        self.enc_scale
    }

    pub fn limits(&self) -> JointLimits {
        self.limits
    }

    pub fn friction(&self) -> &Friction {
        &self.friction
    }

    pub fn links(&self) -> [LinkRef; 2] {
        self.links
    }

    /// Estimated joint torque for a motor current reading (A)
    pub fn current_to_torque(&self, current: f64) -> f64 {
        self.motor_constant * self.gear_ratio * current
    }
}
