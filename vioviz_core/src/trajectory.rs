//! Trajectory Accumulator
//!
//! Append-only pose history. The full path is always drawn as one polyline
//! (`trajectory`), while only the last N poses keep a camera frustum. Frustum
//! widgets are keyed by their position in the window (`frustum/{i}`), so the
//! window slides by overwriting widgets instead of accumulating them.

use nalgebra::Point3;
use tracing::trace;
use vioviz_env::{CameraIntrinsics, Color, Image, Pose, Primitive, WidgetId};

use crate::error::Result;
use crate::registry::SceneRegistry;

/// Identity of the trajectory polyline.
pub const TRAJECTORY_ID: &str = "trajectory";

/// Identity of the frustum at `position` in the window (0 is the oldest).
pub fn frustum_id(position: usize) -> WidgetId {
    WidgetId::new(format!("frustum/{}", position))
}

/// Pose history and frustum window publisher.
#[derive(Debug, Clone)]
pub struct TrajectoryAccumulator {
    poses: Vec<Pose>,
    intrinsics: CameraIntrinsics,
    frustum_scale: f64,
    published_frustums: usize,
}

impl Default for TrajectoryAccumulator {
    fn default() -> Self {
        Self::new(CameraIntrinsics::default())
    }
}

impl TrajectoryAccumulator {
    pub fn new(intrinsics: CameraIntrinsics) -> Self {
        Self {
            poses: Vec::new(),
            intrinsics,
            frustum_scale: 0.2,
            published_frustums: 0,
        }
    }

    /// Appends a copy of `pose`.
    pub fn append(&mut self, pose: Pose) {
        self.poses.push(pose);
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// The most recent `n` poses, oldest first (all of them if fewer exist).
    pub fn last_n(&self, n: usize) -> &[Pose] {
        let start = self.poses.len().saturating_sub(n);
        &self.poses[start..]
    }

    pub fn latest(&self) -> Option<&Pose> {
        self.poses.last()
    }

    /// Camera positions along the whole path.
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.poses.iter().map(|p| p.position()).collect()
    }

    /// Number of frustum widgets currently published.
    pub fn published_frustums(&self) -> usize {
        self.published_frustums
    }

    /// Upserts the trajectory polyline and the frustum window.
    ///
    /// The newest frustum carries `image` when given. Frustums beyond the
    /// window left over from a larger window are removed.
    pub fn publish(
        &mut self,
        registry: &mut SceneRegistry,
        window: usize,
        image: Option<&Image>,
    ) -> Result<()> {
        if self.poses.is_empty() {
            return Ok(());
        }

        registry.upsert(
            TRAJECTORY_ID,
            Primitive::Polyline {
                points: self.positions(),
                color: Color::YELLOW,
            },
            Pose::identity(),
        )?;

        let visible = self.last_n(window);
        let count = visible.len();
        for (i, pose) in visible.iter().enumerate() {
            let newest = i + 1 == count;
            let primitive = Primitive::Frustum {
                intrinsics: self.intrinsics,
                scale: self.frustum_scale,
                image: if newest { image.cloned() } else { None },
                color: if newest { Color::GREEN } else { Color::WHITE },
            };
            registry.upsert(frustum_id(i), primitive, *pose)?;
        }

        for i in count..self.published_frustums {
            registry.remove(&frustum_id(i));
        }
        self.published_frustums = count;

        trace!("Published trajectory ({} poses, {} frustums)", self.poses.len(), count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pose(i: usize) -> Pose {
        Pose::from_translation(i as f64, 0.0, 0.0)
    }

    #[test]
    fn test_last_n_chronological() {
        let mut trajectory = TrajectoryAccumulator::default();
        for i in 1..=5 {
            trajectory.append(pose(i));
        }

        let last = trajectory.last_n(3);
        assert_eq!(last.len(), 3);
        assert_relative_eq!(last[0].translation().x, 3.0);
        assert_relative_eq!(last[2].translation().x, 5.0);

        assert_eq!(trajectory.last_n(10).len(), 5);
        assert_eq!(trajectory.len(), 5);
    }

    #[test]
    fn test_window_of_ten_over_fifteen_poses() {
        let mut registry = SceneRegistry::new();
        let mut trajectory = TrajectoryAccumulator::default();

        for i in 1..=15 {
            trajectory.append(pose(i));
            trajectory.publish(&mut registry, 10, None).unwrap();
        }

        let frustums = registry.ids_with_prefix("frustum/");
        assert_eq!(frustums.len(), 10);

        // P6..P15 in window order
        for i in 0..10 {
            let entry = registry.get(&frustum_id(i)).unwrap();
            assert_relative_eq!(entry.pose.translation().x, (i + 6) as f64);
        }

        match &registry.get_str(TRAJECTORY_ID).unwrap().primitive {
            Primitive::Polyline { points, .. } => {
                assert_eq!(points.len(), 15);
                assert_relative_eq!(points[0].x, 1.0);
            }
            other => panic!("unexpected primitive {:?}", other.kind()),
        }
    }

    #[test]
    fn test_newest_frustum_carries_image() {
        let mut registry = SceneRegistry::new();
        let mut trajectory = TrajectoryAccumulator::default();
        trajectory.append(pose(1));
        trajectory.append(pose(2));

        let image = Image::filled(4, 4, 7);
        trajectory.publish(&mut registry, 10, Some(&image)).unwrap();

        let has_image = |i: usize| match &registry.get(&frustum_id(i)).unwrap().primitive {
            Primitive::Frustum { image, .. } => image.is_some(),
            _ => false,
        };
        assert!(!has_image(0));
        assert!(has_image(1));
    }

    #[test]
    fn test_shrinking_window_removes_excess() {
        let mut registry = SceneRegistry::new();
        let mut trajectory = TrajectoryAccumulator::default();
        for i in 0..6 {
            trajectory.append(pose(i));
        }

        trajectory.publish(&mut registry, 5, None).unwrap();
        trajectory.publish(&mut registry, 2, None).unwrap();

        assert_eq!(registry.ids_with_prefix("frustum/").len(), 2);
        assert_eq!(trajectory.published_frustums(), 2);
    }

    #[test]
    fn test_publish_empty_is_noop() {
        let mut registry = SceneRegistry::new();
        let mut trajectory = TrajectoryAccumulator::default();
        trajectory.publish(&mut registry, 10, None).unwrap();
        assert!(registry.is_empty());
    }
}
