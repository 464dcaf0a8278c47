use crate::geometry::{JointValues, Pose, PoseStamped};
use crate::planning_scene::CollisionObject;
use lazy_static::lazy_static;
use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error while accessing configuration")]
    IoError(#[from] std::io::Error),
    #[error("error while parsing json")]
    JsonError(#[from] serde_json::Error),
    #[error("error while parsing yaml")]
    YamlError(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

type Result<T> = std::result::Result<T, ConfigError>;

lazy_static! {
    static ref INCLUDED: ArmConfig = {
        let json = include_str!("../config/dual_ur5.json");
        ArmConfig::parse_json(json).expect("included config is valid")
    };
}

/// Smallest Cartesian interpolation step accepted from a config file
pub const MIN_EEF_STEP: f64 = 1e-4;

fn check_seconds(field: &str, seconds: f64, positive: bool) -> Result<()> {
    let in_range = if positive {
        seconds > 0.0
    } else {
        seconds >= 0.0
    };
    if in_range && Duration::try_from_secs_f64(seconds).is_ok() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} is not a usable number of seconds: {}",
            field, seconds
        )))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CartesianSettings {
    pub mid_point: na::Vector3<f64>,
    pub goal: Pose,
    /// Interpolation resolution of the end effector in meters
    pub eef_step: f64,
    /// 0.0 disables the jump check
    pub jump_threshold: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DualArmOffsets {
    pub left: na::Vector3<f64>,
    pub right: na::Vector3<f64>,
}

/// Box placed in the world with identity orientation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BoxSettings {
    pub name: String,
    pub frame_id: String,
    pub position: na::Vector3<f64>,
    pub size: na::Vector3<f64>,
}

/// Mesh placed relative to a robot link
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MeshSettings {
    pub name: String,
    pub link: String,
    pub pose: Pose,
    pub path: PathBuf,
    pub scale: na::Vector3<f64>,
    /// Group whose links may touch the mesh once attached
    pub grasping_group: String,
    #[serde(default)]
    pub attach: bool,
}

impl MeshSettings {
    pub fn stamped_pose(&self) -> PoseStamped {
        PoseStamped::new(&self.link, self.pose.clone())
    }

    pub fn collision_object(&self) -> CollisionObject {
        CollisionObject::new_mesh(&self.name, self.stamped_pose(), &self.path, self.scale)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArmConfig {
    pub group_name: String,
    pub left_end_effector: String,
    pub right_end_effector: String,
    pub box_name: String,
    pub box_frame: String,
    pub box_size: na::Vector3<f64>,
    pub box_grasping_group: String,
    /// Allowed difference when checking a reached goal
    pub tolerance: f64,
    pub scene_timeout_secs: f64,
    pub poll_interval_secs: f64,
    pub joint_goal: JointValues,
    pub pose_goal: Pose,
    /// Initial point of the Cartesian demo
    pub left_goal: Pose,
    pub right_goal: Pose,
    pub cartesian: CartesianSettings,
    pub dual_arm_offsets: DualArmOffsets,
    #[serde(default)]
    pub table_objects: Vec<BoxSettings>,
    #[serde(default)]
    pub meshes: Vec<MeshSettings>,
}

impl ArmConfig {
    /// Dual UR5 comes with an included config file.
    ///
    /// This file is packaged with the binary
    /// This method retrieves this included version
    pub fn included() -> ArmConfig {
        INCLUDED.clone()
    }

    /// Saturates instead of failing, values are range checked by `validate`
    pub fn scene_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.scene_timeout_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Reject numbers the commander cannot turn into durations or path steps
    pub fn validate(&self) -> Result<()> {
        check_seconds("scene_timeout_secs", self.scene_timeout_secs, false)?;
        check_seconds("poll_interval_secs", self.poll_interval_secs, true)?;
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tolerance must be a non negative number, got {}",
                self.tolerance
            )));
        }
        let eef_step = self.cartesian.eef_step;
        if !(eef_step.is_finite() && eef_step >= MIN_EEF_STEP) {
            return Err(ConfigError::Invalid(format!(
                "cartesian.eef_step must be at least {} m, got {}",
                MIN_EEF_STEP, eef_step
            )));
        }
        Ok(())
    }

    pub fn parse_json(text: &str) -> Result<ArmConfig> {
        let config: ArmConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse_yaml(text: &str) -> Result<ArmConfig> {
        let config: ArmConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn serialize_to_json(&self) -> Result<String> {
        let json = serde_json::to_string_pretty(self)?;
        Ok(json)
    }

    pub fn serialize_to_yaml(&self) -> Result<String> {
        let yaml = serde_yaml::to_string(self)?;
        Ok(yaml)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.serialize_to_json()?)?;
        Ok(())
    }

    pub fn save_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.serialize_to_yaml()?)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<ArmConfig> {
        let text = fs::read_to_string(path)?;
        ArmConfig::parse_json(&text)
    }

    pub fn load_yaml(path: impl AsRef<Path>) -> Result<ArmConfig> {
        let text = fs::read_to_string(path)?;
        ArmConfig::parse_yaml(&text)
    }

    /// Pick the parser from the file extension, json unless it ends in yaml or yml
    pub fn load(path: impl AsRef<Path>) -> Result<ArmConfig> {
        let path = path.as_ref();
        match path.extension().and_then(|extension| extension.to_str()) {
            Some("yaml") | Some("yml") => ArmConfig::load_yaml(path),
            _ => ArmConfig::load_json(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn check_included() {
        let config = ArmConfig::included();
        assert_eq!(config.group_name, "dual_arms");
        assert_eq!(config.joint_goal.len(), 12);
        assert_relative_eq!(config.joint_goal[1], PI / 4.0);
        assert_relative_eq!(config.joint_goal[7], PI * 0.75);
        assert_eq!(config.scene_timeout(), Duration::from_secs(4));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn included_meshes() {
        let config = ArmConfig::included();
        let names: Vec<_> = config.meshes.iter().map(|mesh| mesh.name.as_str()).collect();
        assert_eq!(names, vec!["flash_body", "flash_hat"]);
        let body = config.meshes[0].collision_object();
        assert_eq!(body.pose.frame_id(), "right_ee_link");
        assert_relative_eq!(body.pose.pose.position.x, 0.16);
    }

    #[test]
    fn serialize_to_json() {
        let config = ArmConfig::included();
        let json = config.serialize_to_json().unwrap();
        let parsed_config = ArmConfig::parse_json(&json).unwrap();
        assert_eq!(config, parsed_config);
    }

    #[test]
    fn serialize_to_yaml() {
        let config = ArmConfig::included();
        let yaml = config.serialize_to_yaml().unwrap();
        let parsed_config = ArmConfig::parse_yaml(&yaml).unwrap();
        assert_eq!(config, parsed_config);
    }

    #[test]
    fn parse_json_as_yaml() {
        let json = include_str!("../config/dual_ur5.json");
        let config = ArmConfig::parse_yaml(json).unwrap();
        assert_eq!(config, ArmConfig::included());
    }

    #[test]
    fn load_picks_format_from_extension() {
        let dir = std::env::temp_dir().join(format!("dual_ur5_config_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let mut config = ArmConfig::included();
        config.tolerance = 0.02;
        let yaml_path = dir.join("config.yaml");
        config.save_yaml(&yaml_path).unwrap();
        assert_eq!(ArmConfig::load(&yaml_path).unwrap(), config);
        let json_path = dir.join("config.json");
        config.save_json(&json_path).unwrap();
        assert_eq!(ArmConfig::load(&json_path).unwrap(), config);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn infinite_timeout_in_yaml_is_rejected() {
        let mut config = ArmConfig::included();
        config.scene_timeout_secs = f64::INFINITY;
        let yaml = config.serialize_to_yaml().unwrap();
        assert!(yaml.contains("scene_timeout_secs: .inf"));
        let error = ArmConfig::parse_yaml(&yaml).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(message) if message.contains("scene_timeout_secs")));
    }

    #[test]
    fn huge_poll_interval_in_json_is_rejected() {
        let mut config = ArmConfig::included();
        config.poll_interval_secs = 1e300;
        let json = config.serialize_to_json().unwrap();
        let error = ArmConfig::parse_json(&json).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(message) if message.contains("poll_interval_secs")));
    }

    #[test]
    fn bad_eef_step_is_rejected() {
        let mut config = ArmConfig::included();
        for eef_step in [f64::NAN, 0.0, -0.01, 1e-300, f64::INFINITY] {
            config.cartesian.eef_step = eef_step;
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "eef_step {} accepted",
                eef_step
            );
        }
    }

    #[test]
    fn durations_saturate_instead_of_panicking() {
        let mut config = ArmConfig::included();
        config.scene_timeout_secs = f64::INFINITY;
        config.poll_interval_secs = f64::NAN;
        assert_eq!(config.scene_timeout(), Duration::MAX);
        assert_eq!(config.poll_interval(), Duration::ZERO);
    }

    #[test]
    fn included_config_is_valid() {
        ArmConfig::included().validate().unwrap();
    }

    #[test]
    fn missing_file_is_io_error() {
        let error = ArmConfig::load("does/not/exist.json").unwrap_err();
        assert!(matches!(error, ConfigError::IoError(_)));
    }
}
