// Robot model for a serial-chain manipulator
//
// Provides:
// - Spatial algebra helpers (SE(3) exp, adjoint, Lie bracket)
// - Links (spatial inertia + home frames) and joints (screw axis + drive train)
// - The immutable Robot chain with its derived caches
// - A serde robot description, including the built-in Pegasus arm

pub mod description;
mod joint;
mod link;
mod robot;
pub mod spatial;

pub use description::{JointDescription, LinkDescription, RobotDescription};
pub use joint::{Friction, Joint, JointLimits, JointParams, ScrewFrame};
pub use link::{Link, LinkRef};
pub use robot::Robot;

/// Malformed robot description
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Link {link}: inertia must be 3x3, got {rows}x{cols}")]
    InertiaDimension { link: usize, rows: usize, cols: usize },

    #[error("Link {link}: inertia matrix is not symmetric")]
    InertiaNotSymmetric { link: usize },

    #[error("Link {link}: mass must be positive, got {mass}")]
    NonPositiveMass { link: usize, mass: f64 },

    #[error("Link {link}: home transform must be 4x4, got {rows}x{cols}")]
    TransformDimension { link: usize, rows: usize, cols: usize },

    #[error("Link {link}: home transform is not a rigid transform")]
    InvalidTransform { link: usize },

    #[error("End-effector home transform must be a 4x4 rigid transform")]
    InvalidEndEffector,

    #[error("Joint {joint}: screw axis must have 6 elements, got {len}")]
    ScrewDimension { joint: usize, len: usize },

    #[error("Joint {joint}: screw axis is not a valid twist")]
    InvalidScrew { joint: usize },

    #[error("Joint {joint}: {field} must be positive, got {value}")]
    NonPositive {
        joint: usize,
        field: &'static str,
        value: f64,
    },

    #[error("Joint {joint}: efficiency must be in (0, 1], got {value}")]
    InvalidEfficiency { joint: usize, value: f64 },

    #[error("Joint {joint}: friction terms must be non-negative")]
    NegativeFriction { joint: usize },

    #[error("Joint {joint}: lower limit {lower} exceeds upper limit {upper}")]
    InvertedLimits { joint: usize, lower: f64, upper: f64 },

    #[error("Joint {joint}: expected links [{expected_prev}, {expected_next}], got [{prev}, {next}]")]
    LinkMismatch {
        joint: usize,
        expected_prev: LinkRef,
        expected_next: LinkRef,
        prev: LinkRef,
        next: LinkRef,
    },

    #[error("Expected one link per joint: {joints} joints, {links} links")]
    ChainLength { joints: usize, links: usize },

    #[error("Robot needs at least one joint")]
    EmptyChain,
}
