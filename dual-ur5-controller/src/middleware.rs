use crate::geometry::{JointValues, Pose, PoseStamped};
use crate::planning_scene::{AttachedObject, CollisionObject};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MiddlewareError {
    #[error("unknown planning group {0}")]
    UnknownGroup(String),
    #[error("unknown link {0}")]
    UnknownLink(String),
    #[error("object {0} is not in the planning scene")]
    UnknownObject(String),
    #[error("joint target has {actual} values but group has {expected} joints")]
    JointCountMismatch { expected: usize, actual: usize },
    #[error("no motion target set")]
    NoTarget,
    #[error("planning failed: {0}")]
    PlanningFailed(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("lost connection to motion planning middleware")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, MiddlewareError>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotState {
    pub joint_names: Vec<String>,
    pub positions: JointValues,
    pub attached_objects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointTrajectoryPoint {
    pub positions: JointValues,
    pub velocities: Vec<f64>,
    pub accelerations: Vec<f64>,
    pub time_from_start: Duration,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointTrajectory {
    pub joint_names: Vec<String>,
    pub points: Vec<JointTrajectoryPoint>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultiDofTrajectoryPoint {
    pub transforms: Vec<Pose>,
    pub time_from_start: Duration,
}

/// Trajectory of whole link poses, one transform per named link
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MultiDofJointTrajectory {
    pub joint_names: Vec<String>,
    pub points: Vec<MultiDofTrajectoryPoint>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotTrajectory {
    pub joint_trajectory: JointTrajectory,
    pub multi_dof_joint_trajectory: MultiDofJointTrajectory,
}

impl RobotTrajectory {
    pub fn is_empty(&self) -> bool {
        self.joint_trajectory.points.is_empty()
            && self.multi_dof_joint_trajectory.points.is_empty()
    }

    pub fn duration(&self) -> Duration {
        let joint_end = self
            .joint_trajectory
            .points
            .last()
            .map(|point| point.time_from_start)
            .unwrap_or_default();
        let multi_dof_end = self
            .multi_dof_joint_trajectory
            .points
            .last()
            .map(|point| point.time_from_start)
            .unwrap_or_default();
        joint_end.max(multi_dof_end)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CartesianPlan {
    pub trajectory: RobotTrajectory,
    /// Part of the requested path that could be planned, 0.0 to 1.0
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplayTrajectory {
    pub trajectory_start: RobotState,
    pub trajectory: Vec<RobotTrajectory>,
}

/// Robot model and state queries
#[async_trait]
pub trait RobotInterface: Send + Sync {
    async fn group_names(&self) -> Result<Vec<String>>;
    async fn current_state(&self) -> Result<RobotState>;
    async fn link_names(&self, group: &str) -> Result<Vec<String>>;
}

/// Collision objects tracked around the robot
#[async_trait]
pub trait PlanningSceneInterface: Send + Sync {
    async fn add_object(&mut self, object: CollisionObject) -> Result<()>;
    /// Attach object that is already in the scene to `link`
    async fn attach_object(&mut self, link: &str, name: &str, touch_links: &[String])
        -> Result<()>;
    /// `None` detaches every object attached to `link`
    async fn remove_attached_object(&mut self, link: &str, name: Option<&str>) -> Result<()>;
    /// `None` removes every world object
    async fn remove_world_object(&mut self, name: Option<&str>) -> Result<()>;
    async fn known_object_names(&self) -> Result<Vec<String>>;
    /// Empty `names` returns all attached objects
    async fn attached_objects(&self, names: &[String])
        -> Result<BTreeMap<String, AttachedObject>>;
}

/// Planning and execution for one planning group
#[async_trait]
pub trait MoveGroupInterface: Send + Sync {
    fn name(&self) -> &str;
    async fn planning_frame(&self) -> Result<String>;
    async fn end_effector_link(&self) -> Result<String>;
    async fn current_joint_values(&self) -> Result<JointValues>;
    /// `None` uses the group end effector link
    async fn current_pose(&self, link: Option<&str>) -> Result<PoseStamped>;
    async fn set_joint_value_target(&mut self, joints: &[f64]) -> Result<()>;
    async fn set_pose_target(&mut self, pose: &Pose, link: Option<&str>) -> Result<()>;
    async fn clear_pose_targets(&mut self) -> Result<()>;
    /// Plan to the current target and execute it
    async fn go(&mut self, wait: bool) -> Result<bool>;
    async fn stop(&mut self) -> Result<()>;
    async fn compute_cartesian_path(
        &mut self,
        waypoints: &[Pose],
        eef_step: f64,
        jump_threshold: f64,
    ) -> Result<CartesianPlan>;
    async fn execute(&mut self, trajectory: &RobotTrajectory, wait: bool) -> Result<bool>;
}

/// Sink for trajectories shown in the planner visualisation
#[async_trait]
pub trait TrajectoryDisplay: Send + Sync {
    async fn publish(&mut self, display: &DisplayTrajectory) -> Result<()>;
}

/// Handles to one middleware connection
pub struct Middleware {
    pub robot: Box<dyn RobotInterface>,
    pub scene: Box<dyn PlanningSceneInterface>,
    pub group: Box<dyn MoveGroupInterface>,
    pub display: Box<dyn TrajectoryDisplay>,
}
