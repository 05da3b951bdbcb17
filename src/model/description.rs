// Serializable robot description
//
// Matrices are given row by row so a description reads naturally in JSON.
// Dimensions are checked when the description is built into a Robot.

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::{Matrix3, SMatrix, Vector3};
use serde::{Deserialize, Serialize};

use super::joint::{Friction, Joint, JointLimits, JointParams, ScrewFrame};
use super::link::{Link, LinkRef};
use super::robot::Robot;
use super::ConfigError;
use super::spatial::{Transform, Twist, translation_transform};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDescription {
    /// 3x3 rotational inertia about the link frame
    pub inertia: Vec<Vec<f64>>,
    /// kg
    pub mass: f64,
    /// 4x4 link frame in the space frame at home
    pub home: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDescription {
    pub screw_axis: Vec<f64>,
    #[serde(default)]
    pub frame: ScrewFrame,
    pub gear_ratio: f64,
    pub motor_constant: f64,
    pub counts_per_rev: u32,
    #[serde(default)]
    pub limits: JointLimits,
    #[serde(default)]
    pub friction: Friction,
    /// Defaults to [previous link (or base), own link]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<[LinkRef; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotDescription {
    pub links: Vec<LinkDescription>,
    pub joints: Vec<JointDescription>,
    /// 4x4 end-effector frame in the space frame at home
    pub end_effector: Vec<Vec<f64>>,
}

/// Copy row-major nested vectors into a fixed-size matrix, None on a shape mismatch
fn to_matrix<const R: usize, const C: usize>(rows: &[Vec<f64>]) -> Option<SMatrix<f64, R, C>> {
    if rows.len() != R || rows.iter().any(|row| row.len() != C) {
        return None;
    }
    Some(SMatrix::from_fn(|r, c| rows[r][c]))
}

/// (rows, widest row) of a nested vector, for error messages
fn shape(rows: &[Vec<f64>]) -> (usize, usize) {
    (rows.len(), rows.iter().map(Vec::len).max().unwrap_or(0))
}

fn to_rows<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> Vec<Vec<f64>> {
    (0..R).map(|r| (0..C).map(|c| m[(r, c)]).collect()).collect()
}

impl RobotDescription {
    /// Validate the description and build the Robot
    pub fn build(&self) -> Result<Robot, ConfigError> {
        let mut links: Vec<Link> = Vec::with_capacity(self.links.len());
        for (i, desc) in self.links.iter().enumerate() {
            let inertia: Matrix3<f64> = to_matrix(&desc.inertia).ok_or_else(|| {
                let (rows, cols) = shape(&desc.inertia);
                ConfigError::InertiaDimension { link: i, rows, cols }
            })?;
            let home: Transform = to_matrix(&desc.home).ok_or_else(|| {
                let (rows, cols) = shape(&desc.home);
                ConfigError::TransformDimension { link: i, rows, cols }
            })?;
            let link = Link::new(i, inertia, desc.mass, home, links.last())?;
            links.push(link);
        }

        let joints = self
            .joints
            .iter()
            .enumerate()
            .map(|(i, desc)| {
                if desc.screw_axis.len() != 6 {
                    return Err(ConfigError::ScrewDimension {
                        joint: i,
                        len: desc.screw_axis.len(),
                    });
                }
                let prev = if i == 0 { LinkRef::Base } else { LinkRef::Link(i - 1) };
                Joint::new(
                    i,
                    JointParams {
                        screw_axis: Twist::from_column_slice(&desc.screw_axis),
                        frame: desc.frame,
                        gear_ratio: desc.gear_ratio,
                        motor_constant: desc.motor_constant,
                        counts_per_rev: desc.counts_per_rev,
                        limits: desc.limits,
                        friction: desc.friction,
                        links: desc.links.unwrap_or([prev, LinkRef::Link(i)]),
                    },
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ee_home: Transform =
            to_matrix(&self.end_effector).ok_or(ConfigError::InvalidEndEffector)?;

        Robot::new(joints, links, ee_home)
    }

    /// The Pegasus arm: base yaw, shoulder pitch, elbow pitch, and a
    /// differential wrist (pitch + roll). Home configuration points straight up.
    pub fn pegasus() -> Self {
        let link = |inertia: [f64; 3], mass: f64, z: f64| LinkDescription {
            inertia: to_rows(&Matrix3::from_diagonal(&Vector3::from(inertia))),
            mass,
            home: to_rows(&translation(z)),
        };

        let friction = Friction {
            static_torque: 0.02,
            kinetic_torque: 0.015,
            viscous: 0.04,
            efficiency: 0.8,
        };
        let joint = |screw: [f64; 6], gear_ratio: f64, lower: f64, upper: f64| JointDescription {
            screw_axis: screw.to_vec(),
            frame: ScrewFrame::Space,
            gear_ratio,
            motor_constant: 0.03,
            counts_per_rev: 512,
            limits: JointLimits::new(lower, upper),
            friction,
            links: None,
        };

        Self {
            links: vec![
                link([0.002, 0.002, 0.003], 0.8, 0.05),
                link([0.006, 0.006, 0.0008], 0.6, 0.225),
                link([0.003, 0.003, 0.0005], 0.4, 0.45),
                link([0.0004, 0.0004, 0.0003], 0.25, 0.58),
                link([0.0003, 0.0003, 0.0002], 0.3, 0.63),
            ],
            joints: vec![
                joint([0.0, 0.0, 1.0, 0.0, 0.0, 0.0], 10.0, -PI, PI),
                joint([0.0, 1.0, 0.0, -0.10, 0.0, 0.0], 10.0, -FRAC_PI_2, FRAC_PI_2),
                joint([0.0, 1.0, 0.0, -0.35, 0.0, 0.0], 10.0, -2.4, 2.4),
                joint([0.0, 1.0, 0.0, -0.55, 0.0, 0.0], 1.5, -1.8, 1.8),
                joint([0.0, 0.0, 1.0, 0.0, 0.0, 0.0], 1.5, -2.0 * PI, 2.0 * PI),
            ],
            end_effector: to_rows(&translation(0.68)),
        }
    }
}

fn translation(z: f64) -> Transform {
    translation_transform(0.0, 0.0, z)
}
