use crate::middleware::RobotTrajectory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("error while accessing dataset")]
    IoError(#[from] std::io::Error),
    #[error("error while parsing dataset json")]
    DeserializationError(#[from] serde_json::Error),
    #[error("path {0} already exists in dataset")]
    DuplicatePath(String),
    #[error("trajectory has no joint points")]
    EmptyTrajectory,
}

type Result<T> = std::result::Result<T, DatasetError>;

/// Joint samples of one planned path
///
/// One row per trajectory point, one column per joint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub joint_names: Vec<String>,
    pub pos: Vec<Vec<f64>>,
    pub vel: Vec<Vec<f64>>,
    pub acc: Vec<Vec<f64>>,
    /// Seconds
    pub time_from_start: Vec<f64>,
}

impl TrajectoryRecord {
    pub fn from_trajectory(trajectory: &RobotTrajectory) -> Result<Self> {
        let joint_trajectory = &trajectory.joint_trajectory;
        if joint_trajectory.points.is_empty() {
            return Err(DatasetError::EmptyTrajectory);
        }
        let joint_count = joint_trajectory.joint_names.len();
        let mut record = TrajectoryRecord {
            joint_names: joint_trajectory.joint_names.clone(),
            ..Default::default()
        };
        for point in &joint_trajectory.points {
            record.pos.push(padded(&point.positions, joint_count));
            record.vel.push(padded(&point.velocities, joint_count));
            record.acc.push(padded(&point.accelerations, joint_count));
            record
                .time_from_start
                .push(point.time_from_start.as_secs_f64());
        }
        Ok(record)
    }

    pub fn len(&self) -> usize {
        self.time_from_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_from_start.is_empty()
    }
}

/// Missing velocities or accelerations are stored as zeros so every row has one value per joint
fn padded(values: &[f64], joint_count: usize) -> Vec<f64> {
    let mut row = values.to_vec();
    row.resize(joint_count.max(values.len()), 0.0);
    row
}

/// Named trajectory records kept in one json file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectoryDataset {
    pub paths: BTreeMap<String, TrajectoryRecord>,
}

impl TrajectoryDataset {
    /// Load existing dataset or start an empty one if the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(TrajectoryDataset::default());
        }
        let text = fs::read_to_string(path)?;
        let dataset = serde_json::from_str(&text)?;
        Ok(dataset)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn insert(&mut self, name: &str, record: TrajectoryRecord) -> Result<()> {
        if self.paths.contains_key(name) {
            return Err(DatasetError::DuplicatePath(name.to_owned()));
        }
        self.paths.insert(name.to_owned(), record);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TrajectoryRecord> {
        self.paths.get(name)
    }

    /// Open `path`, add the trajectory under `name` and write it back
    pub fn append_to_file(
        path: impl AsRef<Path>,
        name: &str,
        trajectory: &RobotTrajectory,
    ) -> Result<()> {
        let path = path.as_ref();
        let record = TrajectoryRecord::from_trajectory(trajectory)?;
        let mut dataset = TrajectoryDataset::open(path)?;
        dataset.insert(name, record)?;
        dataset.save(path)?;
        tracing::info!("Stored {} in {}", name, path.display());
        Ok(())
    }
}
