use std::fmt;

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use super::ConfigError;
use super::spatial::{SpatialMatrix, Transform, is_rigid_transform, trans_inv};

/// Index-based reference to a neighbouring body of a joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkRef {
    /// The fixed world the chain is mounted on
    Base,
    Link(usize),
}

impl fmt::Display for LinkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkRef::Base => write!(f, "base"),
            LinkRef::Link(i) => write!(f, "link {}", i),
        }
    }
}

/// A rigid link, with its frame placed at the centre of mass
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    spatial_inertia: SpatialMatrix,
    /// Link frame {i} in the space frame at the home configuration
    home: Transform,
    /// Link frame {i} relative to {i-1} at the home configuration
    relative_home: Transform,
}

impl Link {
    /// Build link `index` from its rotational inertia (about the link frame), mass and home frame.
    ///
    /// `prev` is the previous link in the chain, `None` for the first link.
    pub fn new(
        index: usize,
        inertia: Matrix3<f64>,
        mass: f64,
        home: Transform,
        prev: Option<&Link>,
    ) -> Result<Self, ConfigError> {
        if (inertia - inertia.transpose()).abs().max() > 1e-12 {
            return Err(ConfigError::InertiaNotSymmetric { link: index });
        }
        if !(mass > 0.0) {
            return Err(ConfigError::NonPositiveMass { link: index, mass });
        }
        if !is_rigid_transform(&home) {
            return Err(ConfigError::InvalidTransform { link: index });
        }

        // G = [I, 0; 0, m 1]
        let mut g = SpatialMatrix::zeros();
        g.fixed_view_mut::<3, 3>(0, 0).copy_from(&inertia);
        let linear = Matrix3::identity() * mass;
        g.fixed_view_mut::<3, 3>(3, 3).copy_from(&linear);

        let relative_home = match prev {
            Some(prev) => trans_inv(&prev.home) * home,
            None => home,
        };

        Ok(Self {
            spatial_inertia: g,
            home,
            relative_home,
        })
    }

    pub fn spatial_inertia(&self) -> &SpatialMatrix {
        &self.spatial_inertia
    }

    pub fn home(&self) -> &Transform {
        &self.home
    }

    pub fn relative_home(&self) -> &Transform {
        &self.relative_home
    }

    pub fn mass(&self) -> f64 {
        self.spatial_inertia[(3, 3)]
    }
}
