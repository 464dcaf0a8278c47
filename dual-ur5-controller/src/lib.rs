#![doc = include_str!("../../doc_include.md")]

pub mod arm_config;
pub mod commander;
pub mod geometry;
pub mod middleware;
pub mod planning_scene;
pub mod shutdown;
pub mod simulation;
pub mod tolerance;
pub mod trajectory_dataset;
