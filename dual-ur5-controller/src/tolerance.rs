use crate::geometry::{Pose, PoseStamped};

/// Values that can be compared element wise after flattening into a list of floats
pub trait ToleranceList {
    fn to_tolerance_list(&self) -> Vec<f64>;
}

impl ToleranceList for [f64] {
    fn to_tolerance_list(&self) -> Vec<f64> {
        self.to_vec()
    }
}

impl ToleranceList for Vec<f64> {
    fn to_tolerance_list(&self) -> Vec<f64> {
        self.clone()
    }
}

impl<const N: usize> ToleranceList for [f64; N] {
    fn to_tolerance_list(&self) -> Vec<f64> {
        self.to_vec()
    }
}

impl ToleranceList for Pose {
    fn to_tolerance_list(&self) -> Vec<f64> {
        self.to_list().to_vec()
    }
}

impl ToleranceList for PoseStamped {
    fn to_tolerance_list(&self) -> Vec<f64> {
        self.pose.to_tolerance_list()
    }
}

/// Check that every value in `actual` is within `tolerance` of its counterpart in `goal`
///
/// Lists of different length are never close.
/// A NaN on either side fails the check.
/// Two empty lists are close.
pub fn all_close<T: ToleranceList + ?Sized>(goal: &T, actual: &T, tolerance: f64) -> bool {
    let goal = goal.to_tolerance_list();
    let actual = actual.to_tolerance_list();
    if goal.len() != actual.len() {
        tracing::debug!(
            "Comparing lists of different length {} and {}",
            goal.len(),
            actual.len()
        );
        return false;
    }
    if goal.is_empty() {
        tracing::debug!("Comparing empty lists");
    }
    goal.iter()
        .zip(actual.iter())
        .all(|(goal, actual)| (actual - goal).abs() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra as na;

    #[test]
    fn within_tolerance() {
        assert!(all_close(&[0.0, 0.0, 0.0], &[0.005, 0.0, 0.0], 0.01));
    }

    #[test]
    fn outside_tolerance() {
        assert!(!all_close(&[0.0, 0.0, 0.0], &[0.02, 0.0, 0.0], 0.01));
    }

    #[test]
    fn tolerance_bound_is_inclusive() {
        assert!(all_close(&[1.0, 2.0], &[1.5, 2.5], 0.5));
    }

    #[test]
    fn single_violation_fails() {
        let goal = vec![0.0, 0.785, -1.571, 0.0, -1.571, 0.0];
        let mut actual = goal.clone();
        actual[4] += 0.011;
        assert!(!all_close(&goal, &actual, 0.01));
    }

    #[test]
    fn empty_lists_are_close() {
        let empty: Vec<f64> = vec![];
        assert!(all_close(&empty, &empty, 0.01));
    }

    #[test]
    fn different_lengths_are_not_close() {
        let goal = vec![0.0, 0.0];
        let actual = vec![0.0, 0.0, 0.0];
        assert!(!all_close(&goal, &actual, 0.01));
        assert!(!all_close(&actual, &goal, 0.01));
    }

    #[test]
    fn nan_is_not_close() {
        assert!(!all_close(&[0.0], &[f64::NAN], 0.01));
    }

    #[test]
    fn pose_matches_flattened_list() {
        let goal = Pose::from_xyzw(na::Vector3::new(0.5, 0.35, 0.315), 0.0, 0.707, 0.0, 0.707);
        let close = Pose::from_xyzw(
            na::Vector3::new(0.505, 0.35, 0.31),
            0.0,
            0.707,
            0.003,
            0.707,
        );
        let far = Pose::from_xyzw(na::Vector3::new(0.5, 0.35, 0.315), 0.0, 0.0, 0.0, 1.0);
        assert_eq!(
            all_close(&goal, &close, 0.01),
            all_close(&goal.to_list(), &close.to_list(), 0.01)
        );
        assert!(all_close(&goal, &close, 0.01));
        assert!(!all_close(&goal, &far, 0.01));
    }

    #[test]
    fn stamped_pose_compares_pose_only() {
        let pose = Pose::from_position(na::Vector3::new(0.2, 0.0, 0.285));
        let goal = PoseStamped::new("world", pose.clone());
        let actual = PoseStamped::new(
            "left_ee_link",
            pose.translated(&na::Vector3::new(0.0, 0.0, 0.005)),
        );
        assert!(all_close(&goal, &actual, 0.01));
    }
}
