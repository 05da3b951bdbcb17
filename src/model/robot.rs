use tracing::debug;

use super::ConfigError;
use super::joint::{Joint, JointLimits, ScrewFrame};
use super::link::{Link, LinkRef};
use super::spatial::{SpatialMatrix, Transform, Twist, adjoint, is_rigid_transform, trans_inv};

/// An open serial chain: N joints, N links and an end-effector frame.
///
/// Joint i connects link i-1 (the base for i = 0) to link i. Everything the
/// dynamics needs is derived once here; changing a parameter means building a
/// new Robot.
#[derive(Debug, Clone)]
pub struct Robot {
    joints: Vec<Joint>,
    links: Vec<Link>,
    /// Space-frame screw axes at home
    screw_axes: Vec<Twist>,
    limits: Vec<JointLimits>,
    spatial_inertias: Vec<SpatialMatrix>,
    /// M_{i-1,i} for every link, then M_{N-1,ee}
    relative_homes: Vec<Transform>,
    ee_home: Transform,
}

impl Robot {
    pub fn new(
        joints: Vec<Joint>,
        links: Vec<Link>,
        ee_home: Transform,
    ) -> Result<Self, ConfigError> {
        if joints.is_empty() {
            return Err(ConfigError::EmptyChain);
        }
        if joints.len() != links.len() {
            return Err(ConfigError::ChainLength {
                joints: joints.len(),
                links: links.len(),
            });
        }
        if !is_rigid_transform(&ee_home) {
            return Err(ConfigError::InvalidEndEffector);
        }

        for (i, joint) in joints.iter().enumerate() {
            let expected_prev = if i == 0 { LinkRef::Base } else { LinkRef::Link(i - 1) };
            let expected_next = LinkRef::Link(i);
            let [prev, next] = joint.links();
            if prev != expected_prev || next != expected_next {
                return Err(ConfigError::LinkMismatch {
                    joint: i,
                    expected_prev,
                    expected_next,
                    prev,
                    next,
                });
            }
        }

        let ee_adjoint = adjoint(&ee_home);
        let screw_axes = joints
            .iter()
            .map(|joint| match joint.frame() {
                ScrewFrame::Space => *joint.screw_axis(),
                ScrewFrame::Body => ee_adjoint * joint.screw_axis(),
            })
            .collect();
        let limits = joints.iter().map(Joint::limits).collect();
        let spatial_inertias = links.iter().map(|link| *link.spatial_inertia()).collect();

        let mut relative_homes: Vec<Transform> =
            links.iter().map(|link| *link.relative_home()).collect();
        // links is non-empty, checked above
        let last_home = links[links.len() - 1].home();
        relative_homes.push(trans_inv(last_home) * ee_home);

        debug!("Built robot with {} joints", joints.len());

        Ok(Self {
            joints,
            links,
            screw_axes,
            limits,
            spatial_inertias,
            relative_homes,
            ee_home,
        })
    }

    /// Number of joints
    pub fn dof(&self) -> usize {
        self.joints.len()
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn screw_axes(&self) -> &[Twist] {
        &self.screw_axes
    }

    pub fn limits(&self) -> &[JointLimits] {
        &self.limits
    }

    pub fn spatial_inertias(&self) -> &[SpatialMatrix] {
        &self.spatial_inertias
    }

    /// N + 1 entries, the last one is the end-effector relative to the last link
    pub fn relative_homes(&self) -> &[Transform] {
        &self.relative_homes
    }

    /// End-effector frame in the space frame at home
    pub fn ee_home(&self) -> &Transform {
        &self.ee_home
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::joint::{Friction, JointParams};
    use crate::model::spatial::translation_transform;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;

    fn joint(index: usize, screw: Twist, frame: ScrewFrame) -> Joint {
        let prev = if index == 0 { LinkRef::Base } else { LinkRef::Link(index - 1) };
        Joint::new(
            index,
            JointParams {
                screw_axis: screw,
                frame,
                gear_ratio: 1.0,
                motor_constant: 0.1,
                counts_per_rev: 100,
                limits: JointLimits::default(),
                friction: Friction::lossless(),
                links: [prev, LinkRef::Link(index)],
            },
        )
        .unwrap()
    }

    fn two_links() -> Vec<Link> {
        let first = Link::new(
            0,
            Matrix3::identity() * 0.01,
            1.0,
            translation_transform(0.0, 0.0, 0.1),
            None,
        )
        .unwrap();
        let second = Link::new(
            1,
            Matrix3::identity() * 0.01,
            1.0,
            translation_transform(0.0, 0.0, 0.4),
            Some(&first),
        )
        .unwrap();
        vec![first, second]
    }

    #[test]
    fn test_derived_caches() {
        let joints = vec![
            joint(0, Twist::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0), ScrewFrame::Space),
            joint(1, Twist::new(0.0, 1.0, 0.0, -0.2, 0.0, 0.0), ScrewFrame::Space),
        ];
        let robot = Robot::new(joints, two_links(), translation_transform(0.0, 0.0, 0.5)).unwrap();

        assert_eq!(robot.dof(), 2);
        assert_eq!(robot.screw_axes().len(), 2);
        assert_eq!(robot.limits().len(), 2);
        assert_eq!(robot.spatial_inertias().len(), 2);
        assert_eq!(robot.relative_homes().len(), 3);
        assert_relative_eq!(
            robot.relative_homes()[2],
            translation_transform(0.0, 0.0, 0.1),
            epsilon = 1e-12
        );
        assert_eq!(*robot.ee_home(), translation_transform(0.0, 0.0, 0.5));
    }

    #[test]
    fn test_body_screw_converted_to_space() {
        // Rotation about the ee z axis, ee sits 0.5 above the origin
        let joints = vec![
            joint(0, Twist::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0), ScrewFrame::Space),
            joint(1, Twist::new(0.0, 1.0, 0.0, 0.0, 0.0, 0.0), ScrewFrame::Body),
        ];
        let robot = Robot::new(joints, two_links(), translation_transform(0.0, 0.0, 0.5)).unwrap();
        // y axis through (0, 0, 0.5): v = -w x q = (-0.5, 0, 0)
        assert_relative_eq!(
            robot.screw_axes()[1],
            Twist::new(0.0, 1.0, 0.0, -0.5, 0.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_count_mismatch() {
        let joints = vec![joint(0, Twist::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0), ScrewFrame::Space)];
        let err = Robot::new(joints, two_links(), Transform::identity()).unwrap_err();
        assert_eq!(err, ConfigError::ChainLength { joints: 1, links: 2 });
        assert_eq!(
            Robot::new(vec![], vec![], Transform::identity()).unwrap_err(),
            ConfigError::EmptyChain
        );
    }

    #[test]
    fn test_link_references_checked() {
        let bad = Joint::new(
            1,
            JointParams {
                screw_axis: Twist::new(0.0, 1.0, 0.0, 0.0, 0.0, 0.0),
                frame: ScrewFrame::Space,
                gear_ratio: 1.0,
                motor_constant: 0.1,
                counts_per_rev: 100,
                limits: JointLimits::default(),
                friction: Friction::lossless(),
                links: [LinkRef::Link(1), LinkRef::Link(0)],
            },
        )
        .unwrap();
        let yaw = joint(0, Twist::new(0.0, 0.0, 1.0, 0.0, 0.0, 0.0), ScrewFrame::Space);
        let joints = vec![yaw, bad];
        assert!(matches!(
            Robot::new(joints, two_links(), Transform::identity()),
            Err(ConfigError::LinkMismatch { joint: 1, .. })
        ));
    }
}
