//! In process stand in for the motion planning middleware.
//!
//! Motion is instantaneous and there is no kinematic model.
//! Joint values and end effector poses are tracked independently,
//! a joint target only moves joints and a pose target only moves the targeted link.
//! Scene changes become visible after a configurable latency.

use crate::geometry::{JointValues, Pose, PoseStamped};
use crate::middleware::{
    CartesianPlan, DisplayTrajectory, JointTrajectory, JointTrajectoryPoint, Middleware,
    MiddlewareError, MoveGroupInterface, MultiDofJointTrajectory, MultiDofTrajectoryPoint,
    PlanningSceneInterface, Result, RobotInterface, RobotState, RobotTrajectory,
    TrajectoryDisplay,
};
use crate::planning_scene::{AttachedObject, CollisionObject};
use async_trait::async_trait;
use lazy_static::lazy_static;
use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

lazy_static! {
    static ref INCLUDED: SimulationSettings = {
        let json = include_str!("../config/simulation.json");
        serde_json::from_str(json).expect("included simulation settings are valid")
    };
}

/// Upper bound on interpolated points in one Cartesian plan
const MAX_CARTESIAN_POINTS: usize = 100_000;
const MAX_SCENE_LATENCY: Duration = Duration::from_secs(3600);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub group_name: String,
    pub planning_frame: String,
    pub end_effector_link: String,
    pub joint_names: Vec<String>,
    pub initial_joints: JointValues,
    /// Initial pose of every link that accepts pose targets
    pub end_effectors: BTreeMap<String, Pose>,
    pub groups: BTreeMap<String, Vec<String>>,
    /// Pose targets further than this from the planning frame origin fail to plan
    pub reach: f64,
    pub scene_latency_secs: f64,
    /// End effector speed used to time Cartesian paths in m/s
    pub cartesian_speed: f64,
}

impl SimulationSettings {
    pub fn included() -> SimulationSettings {
        INCLUDED.clone()
    }

    fn scene_latency(&self) -> Duration {
        Duration::try_from_secs_f64(self.scene_latency_secs.max(0.0))
            .unwrap_or(MAX_SCENE_LATENCY)
            .min(MAX_SCENE_LATENCY)
    }

    fn is_known_link(&self, link: &str) -> bool {
        self.end_effectors.contains_key(link)
            || self
                .groups
                .values()
                .any(|links| links.iter().any(|known| known == link))
    }
}

pub struct LinearMotion {
    target: na::Vector3<f64>,
    current: na::Vector3<f64>,
    max_step: f64,
}

impl LinearMotion {
    pub fn new(start: na::Vector3<f64>, target: na::Vector3<f64>, max_step: f64) -> Self {
        LinearMotion {
            target,
            current: start,
            max_step,
        }
    }
}

impl Iterator for LinearMotion {
    type Item = na::Vector3<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.current.move_towards(&self.target, self.max_step) {
            Some(next) => {
                self.current = next;
                Some(next)
            }
            None => None,
        }
    }
}

trait MoveTowards: Sized {
    fn move_towards(&self, target: &Self, max_step: f64) -> Option<Self>;
}

impl MoveTowards for na::Vector3<f64> {
    fn move_towards(&self, target: &Self, max_step: f64) -> Option<Self> {
        if self == target {
            return None;
        }
        let distance = na::distance(&na::Point3::from(*self), &na::Point3::from(*target));
        if distance <= max_step {
            return Some(*target);
        }
        let translation = target - self;
        let next = self + (translation.normalize() * max_step);
        Some(next)
    }
}

#[derive(Debug, Clone)]
enum MotionTarget {
    Joints(JointValues),
    Poses(BTreeMap<String, Pose>),
}

#[derive(Debug, Clone)]
enum SceneChange {
    Add(CollisionObject),
    Attach {
        link: String,
        name: String,
        touch_links: Vec<String>,
    },
    Detach {
        link: String,
        name: Option<String>,
    },
    Remove(Option<String>),
}

struct PendingChange {
    visible_at: Instant,
    change: SceneChange,
}

struct SimulatedWorld {
    settings: SimulationSettings,
    joints: JointValues,
    link_poses: BTreeMap<String, Pose>,
    target: Option<MotionTarget>,
    world_objects: BTreeMap<String, CollisionObject>,
    attached: BTreeMap<String, AttachedObject>,
    pending: Vec<PendingChange>,
    displayed: Vec<DisplayTrajectory>,
    stop_count: usize,
}

impl SimulatedWorld {
    fn new(settings: SimulationSettings) -> Self {
        Self {
            joints: settings.initial_joints.clone(),
            link_poses: settings.end_effectors.clone(),
            settings,
            target: None,
            world_objects: BTreeMap::new(),
            attached: BTreeMap::new(),
            pending: vec![],
            displayed: vec![],
            stop_count: 0,
        }
    }

    fn reachable(&self, pose: &Pose) -> bool {
        pose.position.norm() <= self.settings.reach
    }

    fn pose_link<'a>(&'a self, link: Option<&'a str>) -> Result<&'a str> {
        let link = link.unwrap_or(self.settings.end_effector_link.as_str());
        if self.link_poses.contains_key(link) {
            Ok(link)
        } else {
            Err(MiddlewareError::UnknownLink(link.to_owned()))
        }
    }

    fn queue(&mut self, change: SceneChange) {
        let visible_at = Instant::now() + self.settings.scene_latency();
        self.pending.push(PendingChange { visible_at, change });
        self.settle();
    }

    /// Apply every queued change whose latency has passed
    fn settle(&mut self) {
        let now = Instant::now();
        let ready_count = self
            .pending
            .iter()
            .take_while(|pending| pending.visible_at <= now)
            .count();
        let ready: Vec<_> = self.pending.drain(..ready_count).collect();
        for pending in ready {
            self.apply(pending.change);
        }
    }

    fn apply(&mut self, change: SceneChange) {
        match change {
            SceneChange::Add(object) => {
                self.world_objects.insert(object.name.clone(), object);
            }
            SceneChange::Attach {
                link,
                name,
                touch_links,
            } => match self.world_objects.remove(&name) {
                Some(object) => {
                    self.attached.insert(
                        name,
                        AttachedObject {
                            link_name: link,
                            object,
                            touch_links,
                        },
                    );
                }
                None => tracing::warn!("Cannot attach unknown object {}", name),
            },
            SceneChange::Detach { link, name } => {
                let detached: Vec<String> = self
                    .attached
                    .iter()
                    .filter(|(attached_name, attached)| {
                        attached.link_name == link
                            && name.as_ref().map_or(true, |name| name == *attached_name)
                    })
                    .map(|(attached_name, _)| attached_name.clone())
                    .collect();
                for attached_name in detached {
                    if let Some(attached) = self.attached.remove(&attached_name) {
                        self.world_objects.insert(attached_name, attached.object);
                    }
                }
            }
            SceneChange::Remove(Some(name)) => {
                self.world_objects.remove(&name);
            }
            SceneChange::Remove(None) => self.world_objects.clear(),
        }
    }

    fn cartesian_path(&self, waypoints: &[Pose], eef_step: f64) -> Result<CartesianPlan> {
        if !(eef_step.is_finite() && eef_step > 0.0) {
            return Err(MiddlewareError::PlanningFailed(format!(
                "end effector step must be positive, got {}",
                eef_step
            )));
        }
        let speed = self.settings.cartesian_speed;
        if !(speed.is_finite() && speed > 0.0) {
            return Err(MiddlewareError::PlanningFailed(format!(
                "cartesian speed must be positive, got {}",
                speed
            )));
        }
        let link = self.pose_link(None)?.to_owned();
        let mut current = self.link_poses[&link].position;
        let (path_length, _) = waypoints
            .iter()
            .fold((0.0, current), |(length, from), waypoint| {
                (length + (waypoint.position - from).norm(), waypoint.position)
            });
        let step_count = path_length / eef_step;
        if !(step_count <= MAX_CARTESIAN_POINTS as f64) {
            return Err(MiddlewareError::PlanningFailed(format!(
                "path of {} m needs {} steps of {} m, limit is {}",
                path_length, step_count, eef_step, MAX_CARTESIAN_POINTS
            )));
        }
        let mut travelled = 0.0;
        let mut reached = 0;
        let mut joint_points = vec![];
        let mut pose_points = vec![];
        for waypoint in waypoints {
            if !self.reachable(waypoint) {
                tracing::debug!("Cartesian waypoint {:?} out of reach", waypoint.position);
                break;
            }
            for position in LinearMotion::new(current, waypoint.position, eef_step) {
                travelled += (position - current).norm();
                current = position;
                let time_from_start =
                    Duration::from_secs_f64(travelled / speed);
                joint_points.push(JointTrajectoryPoint {
                    positions: self.joints.clone(),
                    velocities: vec![0.0; self.joints.len()],
                    accelerations: vec![0.0; self.joints.len()],
                    time_from_start,
                });
                pose_points.push(MultiDofTrajectoryPoint {
                    transforms: vec![Pose::new(position, waypoint.orientation)],
                    time_from_start,
                });
            }
            reached += 1;
        }
        let fraction = if waypoints.is_empty() {
            0.0
        } else {
            reached as f64 / waypoints.len() as f64
        };
        Ok(CartesianPlan {
            trajectory: RobotTrajectory {
                joint_trajectory: JointTrajectory {
                    joint_names: self.settings.joint_names.clone(),
                    points: joint_points,
                },
                multi_dof_joint_trajectory: MultiDofJointTrajectory {
                    joint_names: vec![link],
                    points: pose_points,
                },
            },
            fraction,
        })
    }
}

/// Shared handle to the simulated world
///
/// Every clone talks to the same world so one instance can serve
/// as robot, scene, move group and display at once.
#[derive(Clone)]
pub struct SimulatedMiddleware {
    world: Arc<Mutex<SimulatedWorld>>,
    group_name: String,
}

impl SimulatedMiddleware {
    pub fn new(settings: SimulationSettings) -> Self {
        let group_name = settings.group_name.clone();
        Self {
            world: Arc::new(Mutex::new(SimulatedWorld::new(settings))),
            group_name,
        }
    }

    pub fn included() -> Self {
        Self::new(SimulationSettings::included())
    }

    pub fn middleware(&self) -> Middleware {
        Middleware {
            robot: Box::new(self.clone()),
            scene: Box::new(self.clone()),
            group: Box::new(self.clone()),
            display: Box::new(self.clone()),
        }
    }

    pub async fn displayed_trajectories(&self) -> Vec<DisplayTrajectory> {
        self.world.lock().await.displayed.clone()
    }

    pub async fn link_pose(&self, link: &str) -> Option<Pose> {
        self.world.lock().await.link_poses.get(link).cloned()
    }

    pub async fn stop_count(&self) -> usize {
        self.world.lock().await.stop_count
    }
}

#[async_trait]
impl RobotInterface for SimulatedMiddleware {
    async fn group_names(&self) -> Result<Vec<String>> {
        let world = self.world.lock().await;
        Ok(world.settings.groups.keys().cloned().collect())
    }

    async fn current_state(&self) -> Result<RobotState> {
        let mut world = self.world.lock().await;
        world.settle();
        Ok(RobotState {
            joint_names: world.settings.joint_names.clone(),
            positions: world.joints.clone(),
            attached_objects: world.attached.keys().cloned().collect(),
        })
    }

    async fn link_names(&self, group: &str) -> Result<Vec<String>> {
        let world = self.world.lock().await;
        world
            .settings
            .groups
            .get(group)
            .cloned()
            .ok_or_else(|| MiddlewareError::UnknownGroup(group.to_owned()))
    }
}

#[async_trait]
impl PlanningSceneInterface for SimulatedMiddleware {
    async fn add_object(&mut self, object: CollisionObject) -> Result<()> {
        tracing::debug!("Adding {} to simulated scene", object.name);
        self.world.lock().await.queue(SceneChange::Add(object));
        Ok(())
    }

    async fn attach_object(
        &mut self,
        link: &str,
        name: &str,
        touch_links: &[String],
    ) -> Result<()> {
        let mut world = self.world.lock().await;
        if !world.settings.is_known_link(link) {
            return Err(MiddlewareError::UnknownLink(link.to_owned()));
        }
        world.queue(SceneChange::Attach {
            link: link.to_owned(),
            name: name.to_owned(),
            touch_links: touch_links.to_vec(),
        });
        Ok(())
    }

    async fn remove_attached_object(&mut self, link: &str, name: Option<&str>) -> Result<()> {
        let mut world = self.world.lock().await;
        if !world.settings.is_known_link(link) {
            return Err(MiddlewareError::UnknownLink(link.to_owned()));
        }
        world.queue(SceneChange::Detach {
            link: link.to_owned(),
            name: name.map(str::to_owned),
        });
        Ok(())
    }

    async fn remove_world_object(&mut self, name: Option<&str>) -> Result<()> {
        self.world
            .lock()
            .await
            .queue(SceneChange::Remove(name.map(str::to_owned)));
        Ok(())
    }

    async fn known_object_names(&self) -> Result<Vec<String>> {
        let mut world = self.world.lock().await;
        world.settle();
        Ok(world.world_objects.keys().cloned().collect())
    }

    async fn attached_objects(
        &self,
        names: &[String],
    ) -> Result<BTreeMap<String, AttachedObject>> {
        let mut world = self.world.lock().await;
        world.settle();
        Ok(world
            .attached
            .iter()
            .filter(|(name, _)| names.is_empty() || names.contains(name))
            .map(|(name, attached)| (name.clone(), attached.clone()))
            .collect())
    }
}

#[async_trait]
impl MoveGroupInterface for SimulatedMiddleware {
    fn name(&self) -> &str {
        &self.group_name
    }

    async fn planning_frame(&self) -> Result<String> {
        Ok(self.world.lock().await.settings.planning_frame.clone())
    }

    async fn end_effector_link(&self) -> Result<String> {
        Ok(self.world.lock().await.settings.end_effector_link.clone())
    }

    async fn current_joint_values(&self) -> Result<JointValues> {
        Ok(self.world.lock().await.joints.clone())
    }

    async fn current_pose(&self, link: Option<&str>) -> Result<PoseStamped> {
        let world = self.world.lock().await;
        let link = world.pose_link(link)?;
        Ok(PoseStamped::new(
            &world.settings.planning_frame,
            world.link_poses[link].clone(),
        ))
    }

    async fn set_joint_value_target(&mut self, joints: &[f64]) -> Result<()> {
        let mut world = self.world.lock().await;
        if joints.len() != world.joints.len() {
            return Err(MiddlewareError::JointCountMismatch {
                expected: world.joints.len(),
                actual: joints.len(),
            });
        }
        world.target = Some(MotionTarget::Joints(joints.to_vec()));
        Ok(())
    }

    async fn set_pose_target(&mut self, pose: &Pose, link: Option<&str>) -> Result<()> {
        let mut world = self.world.lock().await;
        let link = world.pose_link(link)?.to_owned();
        match &mut world.target {
            Some(MotionTarget::Poses(poses)) => {
                poses.insert(link, pose.clone());
            }
            target => {
                let mut poses = BTreeMap::new();
                poses.insert(link, pose.clone());
                *target = Some(MotionTarget::Poses(poses));
            }
        }
        Ok(())
    }

    async fn clear_pose_targets(&mut self) -> Result<()> {
        let mut world = self.world.lock().await;
        if let Some(MotionTarget::Poses(_)) = world.target {
            world.target = None;
        }
        Ok(())
    }

    async fn go(&mut self, _wait: bool) -> Result<bool> {
        let mut world = self.world.lock().await;
        match world.target.clone() {
            None => Err(MiddlewareError::NoTarget),
            Some(MotionTarget::Joints(joints)) => {
                world.joints = joints;
                Ok(true)
            }
            Some(MotionTarget::Poses(poses)) => {
                if let Some((link, _)) = poses.iter().find(|(_, pose)| !world.reachable(pose)) {
                    tracing::warn!("Pose target for {} is out of reach", link);
                    return Ok(false);
                }
                world.link_poses.extend(poses);
                Ok(true)
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.world.lock().await.stop_count += 1;
        Ok(())
    }

    async fn compute_cartesian_path(
        &mut self,
        waypoints: &[Pose],
        eef_step: f64,
        jump_threshold: f64,
    ) -> Result<CartesianPlan> {
        if jump_threshold > 0.0 {
            tracing::debug!("Simulation ignores jump threshold {}", jump_threshold);
        }
        self.world.lock().await.cartesian_path(waypoints, eef_step)
    }

    async fn execute(&mut self, trajectory: &RobotTrajectory, _wait: bool) -> Result<bool> {
        if trajectory.is_empty() {
            tracing::warn!("Refusing to execute empty trajectory");
            return Ok(false);
        }
        let mut world = self.world.lock().await;
        if let Some(last) = trajectory.joint_trajectory.points.last() {
            if last.positions.len() != world.joints.len() {
                return Err(MiddlewareError::JointCountMismatch {
                    expected: world.joints.len(),
                    actual: last.positions.len(),
                });
            }
        }
        let links = &trajectory.multi_dof_joint_trajectory.joint_names;
        if let Some(unknown) = links
            .iter()
            .find(|link| !world.link_poses.contains_key(link.as_str()))
        {
            return Err(MiddlewareError::UnknownLink(unknown.clone()));
        }
        if let Some(last) = trajectory.joint_trajectory.points.last() {
            world.joints = last.positions.clone();
        }
        if let Some(last) = trajectory.multi_dof_joint_trajectory.points.last() {
            for (link, pose) in links.iter().zip(last.transforms.iter()) {
                world.link_poses.insert(link.clone(), pose.clone());
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl TrajectoryDisplay for SimulatedMiddleware {
    async fn publish(&mut self, display: &DisplayTrajectory) -> Result<()> {
        self.world.lock().await.displayed.push(display.clone());
        Ok(())
    }
}
