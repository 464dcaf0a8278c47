use crate::arm_config::ArmConfig;
use crate::geometry::{JointValues, Pose, PoseStamped};
use crate::middleware::{
    CartesianPlan, DisplayTrajectory, Middleware, MiddlewareError, MoveGroupInterface,
    PlanningSceneInterface, RobotInterface, RobotTrajectory, TrajectoryDisplay,
};
use crate::planning_scene::{self, CollisionObject, ObjectState};
use crate::shutdown::ShutdownSignal;
use crate::tolerance::all_close;
use nalgebra as na;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommanderError {
    #[error("middleware call failed")]
    Middleware(#[from] MiddlewareError),
    #[error("interrupted by shutdown")]
    Interrupted,
}

type Result<T> = std::result::Result<T, CommanderError>;

/// Result of a plan and execute request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionOutcome {
    /// Planner found a plan and execution finished
    pub executed: bool,
    /// Group ended within tolerance of the goal
    pub reached: bool,
}

/// Drives a planning group and its planning scene through the middleware
pub struct DualArmCommander {
    robot: Box<dyn RobotInterface>,
    scene: Box<dyn PlanningSceneInterface>,
    group: Box<dyn MoveGroupInterface>,
    display: Box<dyn TrajectoryDisplay>,
    config: ArmConfig,
    shutdown: ShutdownSignal,
    box_name: String,
    planning_frame: String,
    eef_link: String,
    group_names: Vec<String>,
}

impl DualArmCommander {
    pub async fn new(
        middleware: Middleware,
        config: ArmConfig,
        shutdown: ShutdownSignal,
    ) -> Result<Self> {
        let Middleware {
            robot,
            scene,
            group,
            display,
        } = middleware;
        if group.name() != config.group_name {
            tracing::warn!(
                "Move group {} does not match configured group {}",
                group.name(),
                config.group_name
            );
        }
        let planning_frame = group.planning_frame().await?;
        tracing::info!("Reference frame: {}", planning_frame);
        let eef_link = group.end_effector_link().await?;
        tracing::info!("End effector: {}", eef_link);
        let group_names = robot.group_names().await?;
        tracing::info!("Robot groups: {:?}", group_names);
        let state = robot.current_state().await?;
        tracing::info!("Robot state: {:?}", state);
        Ok(Self {
            robot,
            scene,
            group,
            display,
            config,
            shutdown,
            box_name: String::new(),
            planning_frame,
            eef_link,
            group_names,
        })
    }

    pub fn config(&self) -> &ArmConfig {
        &self.config
    }

    pub fn planning_frame(&self) -> &str {
        &self.planning_frame
    }

    pub fn end_effector_link(&self) -> &str {
        &self.eef_link
    }

    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    /// Name of the last box added through this commander
    pub fn box_name(&self) -> &str {
        &self.box_name
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutdown.is_shutdown() {
            Err(CommanderError::Interrupted)
        } else {
            Ok(())
        }
    }

    pub async fn current_joint_values(&self) -> Result<JointValues> {
        Ok(self.group.current_joint_values().await?)
    }

    pub async fn current_pose(&self, link: Option<&str>) -> Result<PoseStamped> {
        Ok(self.group.current_pose(link).await?)
    }

    pub async fn link_names(&self, group: &str) -> Result<Vec<String>> {
        Ok(self.robot.link_names(group).await?)
    }

    /// Move every joint of the group to `goal`
    pub async fn go_to_joint_state(&mut self, goal: &[f64]) -> Result<bool> {
        self.ensure_running()?;
        let mut joint_goal = self.group.current_joint_values().await?;
        if joint_goal.len() != goal.len() {
            return Err(MiddlewareError::JointCountMismatch {
                expected: joint_goal.len(),
                actual: goal.len(),
            }
            .into());
        }
        joint_goal.copy_from_slice(goal);
        self.group.set_joint_value_target(&joint_goal).await?;
        let executed = self.group.go(true).await?;
        // no residual movement
        self.group.stop().await?;
        let current_joints = self.group.current_joint_values().await?;
        let reached = all_close(&joint_goal, &current_joints, self.config.tolerance);
        tracing::info!("Joint goal executed: {} reached: {}", executed, reached);
        Ok(reached)
    }

    /// Plan and execute to `pose` for `link`, or the group end effector when `None`
    pub async fn move_to_pose(
        &mut self,
        pose: &Pose,
        link: Option<&str>,
    ) -> Result<MotionOutcome> {
        self.ensure_running()?;
        self.group.set_pose_target(pose, link).await?;
        let executed = self.group.go(true).await;
        // targets are cleared even when planning fails
        self.group.stop().await?;
        self.group.clear_pose_targets().await?;
        let executed = executed?;
        let current_pose = self.group.current_pose(link).await?.pose;
        let reached = all_close(pose, &current_pose, self.config.tolerance);
        tracing::info!(
            "Pose goal {:?} executed: {} reached: {}",
            pose.position,
            executed,
            reached
        );
        Ok(MotionOutcome { executed, reached })
    }

    pub async fn go_to_pose_goal(&mut self, pose: &Pose) -> Result<bool> {
        Ok(self.move_to_pose(pose, None).await?.reached)
    }

    /// Initial point of the Cartesian demo
    pub async fn go_left_goal(&mut self) -> Result<MotionOutcome> {
        let goal = self.config.left_goal.clone();
        self.move_to_pose(&goal, None).await
    }

    pub async fn go_right_goal(&mut self) -> Result<MotionOutcome> {
        let goal = self.config.right_goal.clone();
        self.move_to_pose(&goal, None).await
    }

    /// Shift both end effectors by the given offsets in one motion
    pub async fn move_dual_arms(
        &mut self,
        left_offset: &na::Vector3<f64>,
        right_offset: &na::Vector3<f64>,
    ) -> Result<MotionOutcome> {
        self.ensure_running()?;
        let left_link = self.config.left_end_effector.clone();
        let right_link = self.config.right_end_effector.clone();
        let left_target = self
            .group
            .current_pose(Some(left_link.as_str()))
            .await?
            .pose
            .translated(left_offset);
        let right_target = self
            .group
            .current_pose(Some(right_link.as_str()))
            .await?
            .pose
            .translated(right_offset);
        self.group
            .set_pose_target(&left_target, Some(left_link.as_str()))
            .await?;
        self.group
            .set_pose_target(&right_target, Some(right_link.as_str()))
            .await?;
        let executed = self.group.go(true).await;
        self.group.stop().await?;
        self.group.clear_pose_targets().await?;
        let executed = executed?;
        let left_pose = self.group.current_pose(Some(left_link.as_str())).await?.pose;
        let right_pose = self.group.current_pose(Some(right_link.as_str())).await?.pose;
        let reached = all_close(&left_target, &left_pose, self.config.tolerance)
            && all_close(&right_target, &right_pose, self.config.tolerance);
        tracing::info!("Dual arm motion executed: {} reached: {}", executed, reached);
        Ok(MotionOutcome { executed, reached })
    }

    /// Plan through `mid_point` to the configured goal, both scaled by `scale`
    ///
    /// Only plans, nothing moves.
    pub async fn plan_cartesian_path(
        &mut self,
        mid_point: &na::Vector3<f64>,
        scale: f64,
    ) -> Result<CartesianPlan> {
        self.ensure_running()?;
        let settings = self.config.cartesian.clone();
        let orientation = settings.goal.orientation;
        let waypoints = vec![
            Pose::new(mid_point * scale, orientation),
            settings.goal.scaled(scale),
        ];
        let plan = self
            .group
            .compute_cartesian_path(&waypoints, settings.eef_step, settings.jump_threshold)
            .await?;
        tracing::info!(
            "Cartesian path planned {:.1}% with {} points",
            plan.fraction * 100.0,
            plan.trajectory.joint_trajectory.points.len()
        );
        Ok(plan)
    }

    pub async fn display_trajectory(&mut self, plan: &RobotTrajectory) -> Result<()> {
        let display = DisplayTrajectory {
            trajectory_start: self.robot.current_state().await?,
            trajectory: vec![plan.clone()],
        };
        self.display.publish(&display).await?;
        Ok(())
    }

    pub async fn execute_plan(&mut self, plan: &RobotTrajectory) -> Result<bool> {
        self.ensure_running()?;
        let executed = self.group.execute(plan, true).await?;
        tracing::info!("Executed trajectory of {:?}: {}", plan.duration(), executed);
        Ok(executed)
    }

    /// Poll the scene until `name` is known and attached as expected
    pub async fn wait_for_state_update(
        &self,
        name: &str,
        known: bool,
        attached: bool,
        timeout: Duration,
    ) -> Result<bool> {
        self.wait_for_object(name, ObjectState::new(known, attached), timeout)
            .await
    }

    async fn wait_for_object(
        &self,
        name: &str,
        expected: ObjectState,
        timeout: Duration,
    ) -> Result<bool> {
        Ok(planning_scene::wait_for_object_state(
            self.scene.as_ref(),
            name,
            expected,
            timeout,
            self.config.poll_interval(),
            &self.shutdown,
        )
        .await?)
    }

    /// Add the configured box at the origin of the configured frame
    pub async fn add_box(&mut self, timeout: Duration) -> Result<bool> {
        let box_name = self.config.box_name.clone();
        let box_pose = PoseStamped::new(&self.config.box_frame, Pose::default());
        let object = CollisionObject::new_box(&box_name, box_pose, self.config.box_size);
        self.scene.add_object(object).await?;
        self.box_name = box_name;
        self.wait_for_object(&self.box_name, ObjectState::known(), timeout)
            .await
    }

    /// Add a box with identity orientation at `position` in `frame_id`
    pub async fn add_object(
        &mut self,
        name: &str,
        position: na::Vector3<f64>,
        size: na::Vector3<f64>,
        frame_id: &str,
        timeout: Duration,
    ) -> Result<bool> {
        let pose = PoseStamped::new(frame_id, Pose::from_position(position));
        self.scene
            .add_object(CollisionObject::new_box(name, pose, size))
            .await?;
        self.box_name = name.to_owned();
        self.wait_for_object(name, ObjectState::known(), timeout)
            .await
    }

    pub async fn add_mesh(
        &mut self,
        name: &str,
        pose: PoseStamped,
        path: &Path,
        scale: na::Vector3<f64>,
        timeout: Duration,
    ) -> Result<bool> {
        self.scene
            .add_object(CollisionObject::new_mesh(name, pose, path, scale))
            .await?;
        self.wait_for_object(name, ObjectState::known(), timeout)
            .await
    }

    /// Attach the current box to the end effector
    pub async fn attach_box(&mut self, timeout: Duration) -> Result<bool> {
        let link = self.eef_link.clone();
        let box_name = self.box_name.clone();
        let grasping_group = self.config.box_grasping_group.clone();
        self.attach_object(&link, &box_name, &grasping_group, timeout)
            .await
    }

    /// Attach object `name` to `link`, links of `grasping_group` may touch it
    pub async fn attach_object(
        &mut self,
        link: &str,
        name: &str,
        grasping_group: &str,
        timeout: Duration,
    ) -> Result<bool> {
        let touch_links = self.robot.link_names(grasping_group).await?;
        self.scene.attach_object(link, name, &touch_links).await?;
        // attaching removes the object from the known world objects
        self.wait_for_object(name, ObjectState::attached(), timeout)
            .await
    }

    pub async fn detach_box(&mut self, timeout: Duration) -> Result<bool> {
        let link = self.eef_link.clone();
        let box_name = self.box_name.clone();
        self.detach_object(&link, &box_name, timeout).await
    }

    pub async fn detach_object(
        &mut self,
        link: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<bool> {
        self.scene.remove_attached_object(link, Some(name)).await?;
        self.wait_for_object(name, ObjectState::known(), timeout)
            .await
    }

    pub async fn remove_box(&mut self, timeout: Duration) -> Result<bool> {
        let box_name = self.box_name.clone();
        self.remove_object(&box_name, timeout).await
    }

    pub async fn remove_object(&mut self, name: &str, timeout: Duration) -> Result<bool> {
        self.scene.remove_world_object(Some(name)).await?;
        self.wait_for_object(name, ObjectState::absent(), timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{SimulatedMiddleware, SimulationSettings};
    use approx::assert_relative_eq;

    const TIMEOUT: Duration = Duration::from_secs(4);

    async fn commander(sim: &SimulatedMiddleware) -> DualArmCommander {
        DualArmCommander::new(
            sim.middleware(),
            ArmConfig::included(),
            ShutdownSignal::new(),
        )
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn caches_group_information() {
        let sim = SimulatedMiddleware::included();
        let commander = commander(&sim).await;
        assert_eq!(commander.planning_frame(), "world");
        assert_eq!(commander.end_effector_link(), "left_ee_link");
        assert!(commander.group_names().contains(&"dual_arms".to_owned()));
        assert_eq!(commander.box_name(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn joint_state_goal_is_reached() {
        let sim = SimulatedMiddleware::included();
        let mut commander = commander(&sim).await;
        let goal = commander.config().joint_goal.clone();
        assert!(commander.go_to_joint_state(&goal).await.unwrap());
        assert_eq!(commander.current_joint_values().await.unwrap(), goal);
        assert_eq!(sim.stop_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn joint_state_goal_with_wrong_length_fails() {
        let sim = SimulatedMiddleware::included();
        let mut commander = commander(&sim).await;
        let error = commander.go_to_joint_state(&[0.0; 6]).await.unwrap_err();
        assert_eq!(
            error,
            CommanderError::Middleware(MiddlewareError::JointCountMismatch {
                expected: 12,
                actual: 6
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pose_goals_are_reached() {
        let sim = SimulatedMiddleware::included();
        let mut commander = commander(&sim).await;
        let goal = commander.config().pose_goal.clone();
        assert!(commander.go_to_pose_goal(&goal).await.unwrap());
        let outcome = commander.go_left_goal().await.unwrap();
        assert_eq!(
            outcome,
            MotionOutcome {
                executed: true,
                reached: true
            }
        );
        let outcome = commander.go_right_goal().await.unwrap();
        assert!(outcome.executed && outcome.reached);
        let pose = sim.link_pose("left_ee_link").await.unwrap();
        assert_eq!(pose, commander.config().right_goal);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_pose_goal_is_reported() {
        let settings = SimulationSettings {
            reach: 0.3,
            ..SimulationSettings::included()
        };
        let sim = SimulatedMiddleware::new(settings);
        let mut commander = commander(&sim).await;
        let outcome = commander.go_right_goal().await.unwrap();
        assert_eq!(
            outcome,
            MotionOutcome {
                executed: false,
                reached: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dual_arm_offsets_move_both_arms() {
        let sim = SimulatedMiddleware::included();
        let mut commander = commander(&sim).await;
        let left_before = sim.link_pose("left_ee_link").await.unwrap();
        let right_before = sim.link_pose("right_ee_link").await.unwrap();
        let offsets = commander.config().dual_arm_offsets.clone();
        let outcome = commander
            .move_dual_arms(&offsets.left, &offsets.right)
            .await
            .unwrap();
        assert!(outcome.reached);
        let left_after = sim.link_pose("left_ee_link").await.unwrap();
        let right_after = sim.link_pose("right_ee_link").await.unwrap();
        assert_relative_eq!(left_after.position - left_before.position, offsets.left);
        assert_relative_eq!(right_after.position - right_before.position, offsets.right);
    }

    #[tokio::test(start_paused = true)]
    async fn cartesian_path_is_planned_displayed_and_executed() {
        let sim = SimulatedMiddleware::included();
        let mut commander = commander(&sim).await;
        assert!(commander.go_left_goal().await.unwrap().reached);
        let mid_point = commander.config().cartesian.mid_point;
        let plan = commander.plan_cartesian_path(&mid_point, 1.0).await.unwrap();
        assert_relative_eq!(plan.fraction, 1.0);

        commander.display_trajectory(&plan.trajectory).await.unwrap();
        let displayed = sim.displayed_trajectories().await;
        assert_eq!(displayed.len(), 1);
        assert_eq!(displayed[0].trajectory[0], plan.trajectory);

        assert!(commander.execute_plan(&plan.trajectory).await.unwrap());
        let pose = sim.link_pose("left_ee_link").await.unwrap();
        assert_relative_eq!(pose.position, na::Vector3::new(0.5, 0.35, 0.315));
    }

    #[tokio::test(start_paused = true)]
    async fn mirrored_cartesian_path() {
        let sim = SimulatedMiddleware::included();
        let mut commander = commander(&sim).await;
        let mid_point = commander.config().cartesian.mid_point;
        let plan = commander.plan_cartesian_path(&mid_point, -1.0).await.unwrap();
        let last = plan
            .trajectory
            .multi_dof_joint_trajectory
            .points
            .last()
            .unwrap();
        assert_relative_eq!(
            last.transforms[0].position,
            na::Vector3::new(-0.5, -0.35, -0.315)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn box_lifecycle() {
        let sim = SimulatedMiddleware::included();
        let mut commander = commander(&sim).await;
        assert!(commander.add_box(TIMEOUT).await.unwrap());
        assert_eq!(commander.box_name(), "box");
        assert!(commander.attach_box(TIMEOUT).await.unwrap());
        assert!(commander.detach_box(TIMEOUT).await.unwrap());
        assert!(commander.remove_box(TIMEOUT).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn state_update_matches_attached_flags() {
        let sim = SimulatedMiddleware::included();
        let mut commander = commander(&sim).await;
        assert!(commander.add_box(TIMEOUT).await.unwrap());
        assert!(!commander
            .wait_for_state_update("box", false, true, Duration::from_millis(500))
            .await
            .unwrap());
        assert!(commander.attach_box(TIMEOUT).await.unwrap());
        assert!(commander
            .wait_for_state_update("box", false, true, TIMEOUT)
            .await
            .unwrap());
        assert!(!commander
            .wait_for_state_update("box", true, false, Duration::ZERO)
            .await
            .unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn scene_wait_times_out_when_latency_exceeds_timeout() {
        let settings = SimulationSettings {
            scene_latency_secs: 10.0,
            ..SimulationSettings::included()
        };
        let sim = SimulatedMiddleware::new(settings);
        let mut commander = commander(&sim).await;
        assert!(!commander.add_box(TIMEOUT).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn attaching_missing_object_times_out() {
        let sim = SimulatedMiddleware::included();
        let mut commander = commander(&sim).await;
        let attached = commander
            .attach_object(
                "right_ee_link",
                "ghost",
                "right_gripper",
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(!attached);
    }

    #[tokio::test(start_paused = true)]
    async fn object_and_mesh_lifecycle() {
        let sim = SimulatedMiddleware::included();
        let mut commander = commander(&sim).await;
        let table = commander.config().table_objects[0].clone();
        assert!(commander
            .add_object(
                &table.name,
                table.position,
                table.size,
                &table.frame_id,
                TIMEOUT
            )
            .await
            .unwrap());
        let mesh = commander.config().meshes[0].clone();
        assert!(commander
            .add_mesh(
                &mesh.name,
                mesh.stamped_pose(),
                &mesh.path,
                mesh.scale,
                TIMEOUT
            )
            .await
            .unwrap());
        assert!(commander
            .attach_object(&mesh.link, &mesh.name, &mesh.grasping_group, TIMEOUT)
            .await
            .unwrap());
        assert!(commander
            .detach_object(&mesh.link, &mesh.name, TIMEOUT)
            .await
            .unwrap());
        assert!(commander.remove_object(&mesh.name, TIMEOUT).await.unwrap());
        assert!(commander.remove_object(&table.name, TIMEOUT).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_motion() {
        let sim = SimulatedMiddleware::included();
        let mut commander = commander(&sim).await;
        commander.shutdown_signal().trigger();
        let goal = commander.config().pose_goal.clone();
        assert_eq!(
            commander.go_to_pose_goal(&goal).await.unwrap_err(),
            CommanderError::Interrupted
        );
        // scene polling gives up instead of erroring
        assert!(!commander.add_box(TIMEOUT).await.unwrap());
    }
}
