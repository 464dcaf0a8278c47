use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dual_ur5_controller::{
    arm_config::ArmConfig, commander::DualArmCommander, shutdown::ShutdownSignal,
    simulation::SimulatedMiddleware,
};
use dual_ur5_demo::{
    error::DemoError,
    logging,
    prompt::{AutoConfirm, Prompt, StdinPrompt},
    sequence::{DemoOptions, DemoRunner, ExportTarget},
};
use nalgebra as na;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Demo config in json or yaml, defaults to the included one
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run every step without waiting for Enter
    #[arg(short, long)]
    yes: bool,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log as json
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Full demo
    Demo {
        /// Go to the configured joint state first
        #[arg(long)]
        joint_state: bool,
        /// Add the table objects for the duration of the demo
        #[arg(long)]
        table: bool,
        #[command(flatten)]
        export: ExportArgs,
    },
    JointState,
    PoseGoal,
    /// Go to the initial point and run one Cartesian path
    Cartesian {
        /// Mid point override as x y z
        #[arg(long, num_args = 3, allow_negative_numbers = true)]
        mid_point: Option<Vec<f64>>,
        #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
        scale: f64,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Box add, attach, detach and remove
    Scene,
    Meshes,
}

#[derive(clap::Args)]
struct ExportArgs {
    /// Append the planned path to this dataset file
    #[arg(long)]
    export: Option<PathBuf>,
    #[arg(long, default_value = "imi_path_1")]
    path_name: String,
}

impl ExportArgs {
    fn target(self) -> Option<ExportTarget> {
        let path_name = self.path_name;
        self.export.map(|path| ExportTarget {
            path,
            name: path_name,
        })
    }
}

async fn run<P: Prompt>(
    command: Command,
    runner: &mut DemoRunner<P>,
) -> std::result::Result<(), DemoError> {
    match command {
        Command::Demo {
            joint_state,
            table,
            export,
        } => {
            let options = DemoOptions {
                joint_state,
                table,
                export: export.target(),
            };
            runner.run_demo(&options).await?;
        }
        Command::JointState => {
            runner.run_joint_state().await?;
        }
        Command::PoseGoal => {
            runner.run_pose_goal().await?;
        }
        Command::Cartesian {
            mid_point,
            scale,
            export,
        } => {
            let mid_point = match mid_point.as_deref() {
                Some([x, y, z]) => na::Vector3::new(*x, *y, *z),
                _ => runner.commander().config().cartesian.mid_point,
            };
            runner.run_initial_point().await?;
            runner
                .run_cartesian(&mid_point, scale, export.target().as_ref())
                .await?;
        }
        Command::Scene => runner.run_box_cycle().await?,
        Command::Meshes => runner.run_meshes().await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbose, args.json_logs);

    let config = match &args.config {
        Some(path) => ArmConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ArmConfig::included(),
    };

    let shutdown = ShutdownSignal::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Detected Ctrl+c");
                    shutdown.trigger();
                }
                Err(error) => tracing::error!("Failed to wait for Ctrl+c {}", error),
            }
        }
    });

    let middleware = SimulatedMiddleware::included().middleware();
    let commander = DualArmCommander::new(middleware, config, shutdown.clone())
        .await
        .context("Failed to connect to the move group")?;

    let result = if args.yes {
        run(args.command, &mut DemoRunner::new(commander, AutoConfirm)).await
    } else {
        let prompt = StdinPrompt::new(shutdown);
        run(args.command, &mut DemoRunner::new(commander, prompt)).await
    };

    match result {
        Err(error) if error.is_user_exit() => {
            tracing::info!("Exiting: {}", error);
            Ok(())
        }
        other => other.context("Demo failed"),
    }
}
