use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Joint angles in radians, ordered the way the planning group lists its joints.
pub type JointValues = Vec<f64>;

/// Position and orientation of a link.
///
/// Orientation is a raw quaternion and is not normalised.
/// Values such as `(0, 0.707, 0, 0.707)` are passed through to the planner as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: na::Vector3<f64>,
    /// Serialized as `[x, y, z, w]`
    pub orientation: na::Quaternion<f64>,
}

impl Pose {
    pub fn new(position: na::Vector3<f64>, orientation: na::Quaternion<f64>) -> Pose {
        Pose {
            position,
            orientation,
        }
    }

    /// Pose at `position` with identity orientation
    pub fn from_position(position: na::Vector3<f64>) -> Pose {
        Pose::new(position, na::Quaternion::identity())
    }

    /// Build orientation from `x, y, z, w` the way pose messages list it
    pub fn from_xyzw(position: na::Vector3<f64>, x: f64, y: f64, z: f64, w: f64) -> Pose {
        Pose::new(position, na::Quaternion::new(w, x, y, z))
    }

    /// `[px, py, pz, ox, oy, oz, ow]`
    pub fn to_list(&self) -> [f64; 7] {
        [
            self.position.x,
            self.position.y,
            self.position.z,
            self.orientation.i,
            self.orientation.j,
            self.orientation.k,
            self.orientation.w,
        ]
    }

    pub fn translated(&self, offset: &na::Vector3<f64>) -> Pose {
        Pose::new(self.position + offset, self.orientation)
    }

    pub fn scaled(&self, scale: f64) -> Pose {
        Pose::new(self.position * scale, self.orientation)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Pose::from_position(na::Vector3::zeros())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    pub frame_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseStamped {
    pub header: Header,
    pub pose: Pose,
}

impl PoseStamped {
    pub fn new(frame_id: &str, pose: Pose) -> PoseStamped {
        PoseStamped {
            header: Header {
                frame_id: frame_id.to_owned(),
            },
            pose,
        }
    }

    pub fn frame_id(&self) -> &str {
        &self.header.frame_id
    }
}
