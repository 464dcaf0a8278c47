use crate::geometry::PoseStamped;
use crate::middleware::{PlanningSceneInterface, Result};
use crate::shutdown::ShutdownSignal;
use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectShape {
    /// Full extents along x, y and z in meters
    Box { size: na::Vector3<f64> },
    Mesh {
        path: PathBuf,
        scale: na::Vector3<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionObject {
    pub name: String,
    pub pose: PoseStamped,
    pub shape: ObjectShape,
}

impl CollisionObject {
    pub fn new_box(name: &str, pose: PoseStamped, size: na::Vector3<f64>) -> Self {
        Self {
            name: name.to_owned(),
            pose,
            shape: ObjectShape::Box { size },
        }
    }

    pub fn new_mesh(
        name: &str,
        pose: PoseStamped,
        path: impl Into<PathBuf>,
        scale: na::Vector3<f64>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            pose,
            shape: ObjectShape::Mesh {
                path: path.into(),
                scale,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedObject {
    pub link_name: String,
    pub object: CollisionObject,
    /// Links allowed to touch the object without counting as collision
    pub touch_links: Vec<String>,
}

/// What the scene reports about a single object
///
/// Attaching an object removes it from the known world objects,
/// so `known` and `attached` are not both expected to be true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectState {
    pub known: bool,
    pub attached: bool,
}

impl ObjectState {
    pub fn new(known: bool, attached: bool) -> Self {
        Self { known, attached }
    }

    pub fn known() -> Self {
        Self::new(true, false)
    }

    pub fn attached() -> Self {
        Self::new(false, true)
    }

    pub fn absent() -> Self {
        Self::new(false, false)
    }
}

pub async fn observe_object_state(
    scene: &dyn PlanningSceneInterface,
    name: &str,
) -> Result<ObjectState> {
    let attached = !scene
        .attached_objects(&[name.to_owned()])
        .await?
        .is_empty();
    let known = scene
        .known_object_names()
        .await?
        .iter()
        .any(|known_name| known_name == name);
    Ok(ObjectState { known, attached })
}

/// Poll the scene until `name` reaches `expected`
///
/// Returns `Ok(false)` when `timeout` elapses or shutdown is requested first.
pub async fn wait_for_object_state(
    scene: &dyn PlanningSceneInterface,
    name: &str,
    expected: ObjectState,
    timeout: Duration,
    poll_interval: Duration,
    shutdown: &ShutdownSignal,
) -> Result<bool> {
    let start = Instant::now();
    while start.elapsed() < timeout && !shutdown.is_shutdown() {
        let state = observe_object_state(scene, name).await?;
        if state == expected {
            tracing::debug!(
                "Object {} reached {:?} after {:?}",
                name,
                expected,
                start.elapsed()
            );
            return Ok(true);
        }
        sleep(poll_interval).await;
    }
    if shutdown.is_shutdown() {
        tracing::warn!("Stopped waiting for object {} because of shutdown", name);
    } else {
        tracing::warn!("Timed out waiting for object {} to reach {:?}", name, expected);
    }
    Ok(false)
}
