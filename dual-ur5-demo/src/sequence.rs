use crate::error::DemoError;
use crate::prompt::Prompt;
use dual_ur5_controller::commander::DualArmCommander;
use dual_ur5_controller::middleware::CartesianPlan;
use dual_ur5_controller::trajectory_dataset::TrajectoryDataset;
use nalgebra as na;
use std::path::PathBuf;

type Result<T> = std::result::Result<T, DemoError>;

/// Where a planned Cartesian path gets stored
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTarget {
    pub path: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemoOptions {
    pub joint_state: bool,
    pub table: bool,
    pub export: Option<ExportTarget>,
}

/// Steps through the demo, asking the prompt before each one
pub struct DemoRunner<P: Prompt> {
    commander: DualArmCommander,
    prompt: P,
}

impl<P: Prompt> DemoRunner<P> {
    pub fn new(commander: DualArmCommander, prompt: P) -> Self {
        Self { commander, prompt }
    }

    pub fn commander(&self) -> &DualArmCommander {
        &self.commander
    }

    fn ensure_running(&self) -> Result<()> {
        if self.commander.shutdown_signal().is_shutdown() {
            Err(DemoError::Interrupted)
        } else {
            Ok(())
        }
    }

    async fn step(&mut self, message: &str) -> Result<()> {
        self.ensure_running()?;
        self.prompt.confirm(message).await?;
        self.ensure_running()
    }

    fn report(action: &str, success: bool) {
        if success {
            tracing::info!("{} succeeded", action);
        } else {
            tracing::warn!("{} did not converge", action);
        }
    }

    pub async fn run_joint_state(&mut self) -> Result<bool> {
        self.step("execute a movement using a joint state goal")
            .await?;
        let goal = self.commander.config().joint_goal.clone();
        let reached = self.commander.go_to_joint_state(&goal).await?;
        Self::report("Joint state goal", reached);
        Ok(reached)
    }

    pub async fn run_pose_goal(&mut self) -> Result<bool> {
        self.step("execute a movement using a pose goal").await?;
        let goal = self.commander.config().pose_goal.clone();
        let reached = self.commander.go_to_pose_goal(&goal).await?;
        Self::report("Pose goal", reached);
        Ok(reached)
    }

    pub async fn add_table(&mut self) -> Result<()> {
        self.step("add the table to the planning scene").await?;
        let timeout = self.commander.config().scene_timeout();
        for object in self.commander.config().table_objects.clone() {
            let added = self
                .commander
                .add_object(
                    &object.name,
                    object.position,
                    object.size,
                    &object.frame_id,
                    timeout,
                )
                .await?;
            Self::report(&format!("Adding {}", object.name), added);
        }
        Ok(())
    }

    pub async fn remove_table(&mut self) -> Result<()> {
        self.step("remove the table from the planning scene").await?;
        let timeout = self.commander.config().scene_timeout();
        for object in self.commander.config().table_objects.clone() {
            let removed = self.commander.remove_object(&object.name, timeout).await?;
            Self::report(&format!("Removing {}", object.name), removed);
        }
        Ok(())
    }

    /// Add the tool meshes, then attach, detach and remove the ones marked for grasping
    pub async fn run_meshes(&mut self) -> Result<()> {
        self.step("add the tool meshes to the planning scene").await?;
        let timeout = self.commander.config().scene_timeout();
        let meshes = self.commander.config().meshes.clone();
        for mesh in &meshes {
            let added = self
                .commander
                .add_mesh(
                    &mesh.name,
                    mesh.stamped_pose(),
                    &mesh.path,
                    mesh.scale,
                    timeout,
                )
                .await?;
            Self::report(&format!("Adding mesh {}", mesh.name), added);
        }
        for mesh in meshes.iter().filter(|mesh| mesh.attach) {
            self.step(&format!("attach {} to {}", mesh.name, mesh.link))
                .await?;
            let attached = self
                .commander
                .attach_object(&mesh.link, &mesh.name, &mesh.grasping_group, timeout)
                .await?;
            Self::report(&format!("Attaching {}", mesh.name), attached);

            self.step(&format!("detach {} from {}", mesh.name, mesh.link))
                .await?;
            let detached = self
                .commander
                .detach_object(&mesh.link, &mesh.name, timeout)
                .await?;
            Self::report(&format!("Detaching {}", mesh.name), detached);

            self.step(&format!("remove {} from the planning scene", mesh.name))
                .await?;
            let removed = self.commander.remove_object(&mesh.name, timeout).await?;
            Self::report(&format!("Removing {}", mesh.name), removed);
        }
        Ok(())
    }

    pub async fn run_dual_arm_offsets(&mut self) -> Result<bool> {
        self.step("move both arms by their offsets").await?;
        let offsets = self.commander.config().dual_arm_offsets.clone();
        let outcome = self
            .commander
            .move_dual_arms(&offsets.left, &offsets.right)
            .await?;
        Self::report("Dual arm motion", outcome.reached);
        Ok(outcome.reached)
    }

    pub async fn run_initial_point(&mut self) -> Result<bool> {
        self.step("go to the initial point of the Cartesian path")
            .await?;
        let outcome = self.commander.go_left_goal().await?;
        Self::report("Initial point", outcome.reached);
        Ok(outcome.reached)
    }

    /// Plan through `mid_point`, show the plan, execute it and optionally store it
    pub async fn run_cartesian(
        &mut self,
        mid_point: &na::Vector3<f64>,
        scale: f64,
        export: Option<&ExportTarget>,
    ) -> Result<CartesianPlan> {
        self.step("plan and display a Cartesian path").await?;
        let plan = self.commander.plan_cartesian_path(mid_point, scale).await?;
        if plan.fraction < 1.0 {
            tracing::warn!(
                "Cartesian path only covers {:.1}% of the waypoints",
                plan.fraction * 100.0
            );
        }
        self.commander.display_trajectory(&plan.trajectory).await?;

        if let Some(export) = export {
            TrajectoryDataset::append_to_file(&export.path, &export.name, &plan.trajectory)?;
        }

        self.step("execute a saved path").await?;
        if plan.trajectory.is_empty() {
            tracing::warn!("Planned trajectory is empty, skipping execution");
        } else {
            let executed = self.commander.execute_plan(&plan.trajectory).await?;
            Self::report("Cartesian path execution", executed);
        }
        Ok(plan)
    }

    /// Add, attach, carry along the mirrored path, detach and remove the box
    pub async fn run_box_cycle(&mut self) -> Result<()> {
        let timeout = self.commander.config().scene_timeout();

        self.step("add a box to the planning scene").await?;
        let added = self.commander.add_box(timeout).await?;
        Self::report("Adding box", added);

        self.step("attach a box to the robot").await?;
        let attached = self.commander.attach_box(timeout).await?;
        Self::report("Attaching box", attached);

        let mid_point = self.commander.config().cartesian.mid_point;
        self.run_cartesian(&mid_point, -1.0, None).await?;

        self.step("detach the box from the robot").await?;
        let detached = self.commander.detach_box(timeout).await?;
        Self::report("Detaching box", detached);

        self.step("remove the box from the planning scene").await?;
        let removed = self.commander.remove_box(timeout).await?;
        Self::report("Removing box", removed);
        Ok(())
    }

    /// Full demo in the fixed order
    pub async fn run_demo(&mut self, options: &DemoOptions) -> Result<()> {
        if options.joint_state {
            self.run_joint_state().await?;
        }
        if options.table {
            self.add_table().await?;
        }
        self.run_meshes().await?;
        self.run_dual_arm_offsets().await?;

        self.run_initial_point().await?;
        let mid_point = self.commander.config().cartesian.mid_point;
        self.run_cartesian(&mid_point, 1.0, options.export.as_ref())
            .await?;

        if options.table {
            self.remove_table().await?;
        }
        self.run_box_cycle().await?;
        tracing::info!("Demo complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::AutoConfirm;
    use async_trait::async_trait;
    use dual_ur5_controller::arm_config::ArmConfig;
    use dual_ur5_controller::shutdown::ShutdownSignal;
    use dual_ur5_controller::simulation::SimulatedMiddleware;

    async fn runner<P: Prompt>(sim: &SimulatedMiddleware, prompt: P) -> DemoRunner<P> {
        let commander = DualArmCommander::new(
            sim.middleware(),
            ArmConfig::included(),
            ShutdownSignal::new(),
        )
        .await
        .unwrap();
        DemoRunner::new(commander, prompt)
    }

    /// Confirms a fixed number of steps and then behaves like a closed stdin
    struct CountingPrompt {
        messages: Vec<String>,
        remaining: usize,
    }

    #[async_trait]
    impl Prompt for CountingPrompt {
        async fn confirm(&mut self, message: &str) -> Result<()> {
            if self.remaining == 0 {
                return Err(DemoError::InputClosed);
            }
            self.remaining -= 1;
            self.messages.push(message.to_owned());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_demo_runs_on_simulation() {
        let sim = SimulatedMiddleware::included();
        let mut runner = runner(&sim, AutoConfirm).await;
        let options = DemoOptions {
            joint_state: true,
            table: true,
            export: None,
        };
        runner.run_demo(&options).await.unwrap();
        // box was taken through the whole cycle
        assert_eq!(runner.commander().box_name(), "box");
        let displayed = sim.displayed_trajectories().await;
        assert_eq!(displayed.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn joint_state_and_pose_goal_steps() {
        let sim = SimulatedMiddleware::included();
        let mut runner = runner(&sim, AutoConfirm).await;
        assert!(runner.run_joint_state().await.unwrap());
        assert!(runner.run_pose_goal().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_input_ends_the_demo() {
        let sim = SimulatedMiddleware::included();
        let prompt = CountingPrompt {
            messages: vec![],
            remaining: 1,
        };
        let mut runner = runner(&sim, prompt).await;
        let error = runner.run_demo(&DemoOptions::default()).await.unwrap_err();
        assert!(matches!(error, DemoError::InputClosed));
        assert!(error.is_user_exit());
        assert_eq!(
            runner.prompt.messages,
            vec!["add the tool meshes to the planning scene".to_owned()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_before_next_step() {
        let sim = SimulatedMiddleware::included();
        let mut runner = runner(&sim, AutoConfirm).await;
        runner.commander().shutdown_signal().trigger();
        let error = runner.run_pose_goal().await.unwrap_err();
        assert!(matches!(error, DemoError::Interrupted));
    }

    #[tokio::test(start_paused = true)]
    async fn cartesian_path_is_exported() {
        let path = std::env::temp_dir().join(format!("dual_ur5_export_{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let sim = SimulatedMiddleware::included();
        let mut runner = runner(&sim, AutoConfirm).await;
        let export = ExportTarget {
            path: path.clone(),
            name: "imi_path_1".to_owned(),
        };
        let mid_point = runner.commander().config().cartesian.mid_point;
        let plan = runner
            .run_cartesian(&mid_point, 1.0, Some(&export))
            .await
            .unwrap();

        let dataset = TrajectoryDataset::open(&path).unwrap();
        let record = dataset.get("imi_path_1").unwrap();
        assert_eq!(record.len(), plan.trajectory.joint_trajectory.points.len());

        // same name twice is refused
        let error = runner
            .run_cartesian(&mid_point, 1.0, Some(&export))
            .await
            .unwrap_err();
        assert!(matches!(error, DemoError::DatasetError(_)));
        std::fs::remove_file(&path).unwrap();
    }
}
