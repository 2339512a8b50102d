//! Property tests for the scene engine invariants.

use std::collections::BTreeSet;

use nalgebra::{Point3, Vector3};
use proptest::prelude::*;
use vioviz_core::plane_lines::{line_id, LandmarkPositions};
use vioviz_core::trajectory::TRAJECTORY_ID;
use vioviz_core::{
    Mesh3d, MeshColorizer, PlaneLineTracker, PlaneReport, SceneRegistry, TrajectoryAccumulator,
    TriangleCluster,
};
use vioviz_env::{Color, Pose, Primitive};

fn positions() -> LandmarkPositions {
    (0..64u64)
        .map(|id| (id, Point3::new(id as f64, 0.5, 2.0)))
        .collect()
}

fn inlier_set() -> impl Strategy<Value = BTreeSet<u64>> {
    prop::collection::btree_set(0..64u64, 0..20)
}

fn text(s: &str) -> Primitive {
    Primitive::Text {
        position: Point3::origin(),
        text: s.to_string(),
        color: Color::WHITE,
    }
}

proptest! {
    /// Property: any sequence of upserts leaves at most one entry per identity
    #[test]
    fn test_registry_never_duplicates(ids in prop::collection::vec(0..8u8, 1..100)) {
        let mut registry = SceneRegistry::new();
        for id in &ids {
            registry.upsert(format!("w/{}", id), text("x"), Pose::identity()).unwrap();
        }

        let distinct: BTreeSet<_> = ids.iter().collect();
        prop_assert_eq!(registry.len(), distinct.len());

        let adds = registry.drain_commands().iter().filter(|c| c.is_add()).count();
        prop_assert_eq!(adds, distinct.len());
    }

    /// Property: after reconcile, owned lines equal the inlier set exactly
    #[test]
    fn test_reconcile_subset_equality(frames in prop::collection::vec(inlier_set(), 1..10)) {
        let mut registry = SceneRegistry::new();
        let mut tracker = PlaneLineTracker::default();
        let lmks = positions();
        let mut was_active = false;

        for inliers in frames {
            let report = PlaneReport::new(3, Vector3::z(), 1.0, inliers.iter().copied());
            tracker.reconcile(&mut registry, &report, &lmks).unwrap();
            was_active |= !inliers.is_empty();

            if was_active {
                prop_assert_eq!(tracker.owned_lines(3).unwrap(), &inliers);
            }
            let live = registry.ids_with_prefix("plane/3/line/");
            prop_assert_eq!(live.len(), inliers.len());
            for lmk in &inliers {
                prop_assert!(registry.contains(&line_id(3, *lmk)));
            }
        }
    }

    /// Property: degenerate plane geometry never leaves lines out of sync with the inliers
    #[test]
    fn test_degenerate_reports_keep_lines_consistent(
        frames in prop::collection::vec((inlier_set(), any::<bool>()), 1..12),
    ) {
        let mut registry = SceneRegistry::new();
        let mut tracker = PlaneLineTracker::default();
        let lmks = positions();

        for (inliers, degenerate) in frames {
            let normal = if degenerate { Vector3::zeros() } else { Vector3::z() };
            let report = PlaneReport::new(3, normal, 1.0, inliers.iter().copied());
            let result = tracker.reconcile(&mut registry, &report, &lmks);

            if tracker.is_active(3) {
                let stats = result.unwrap();
                prop_assert_eq!(stats.failures.len(), usize::from(degenerate));
                prop_assert_eq!(tracker.owned_lines(3).unwrap(), &inliers);
                prop_assert_eq!(registry.ids_with_prefix("plane/3/line/").len(), inliers.len());
                prop_assert!(registry.contains_str("plane/3"));
            } else {
                prop_assert_eq!(result.is_err(), degenerate && !inliers.is_empty());
                prop_assert!(registry.ids_with_prefix("plane/3").is_empty());
            }
        }
    }

    /// Property: reconciling the same inliers twice mutates nothing the second time
    #[test]
    fn test_reconcile_idempotent(first in inlier_set(), second in inlier_set()) {
        let mut registry = SceneRegistry::new();
        let mut tracker = PlaneLineTracker::default();
        let lmks = positions();

        let a = PlaneReport::new(1, Vector3::y(), 2.0, first);
        let b = PlaneReport::new(1, Vector3::y(), 2.0, second);
        tracker.reconcile(&mut registry, &a, &lmks).unwrap();
        tracker.reconcile(&mut registry, &b, &lmks).unwrap();

        let before = registry.mutation_count();
        tracker.reconcile(&mut registry, &b, &lmks).unwrap();
        prop_assert_eq!(registry.mutation_count(), before);
    }

    /// Property: colorize is deterministic and the last claiming cluster wins
    #[test]
    fn test_colorize_last_cluster_wins(
        n in 1..200usize,
        clusters in prop::collection::vec((0..16u32, prop::collection::vec(0..200usize, 0..50)), 0..6),
    ) {
        let mesh = Mesh3d::new(vec![Point3::origin(); n], vec![]);
        let clusters: Vec<TriangleCluster> = clusters
            .into_iter()
            .map(|(label, idx)| TriangleCluster::labeled(label, idx.into_iter().filter(|&i| i < n)))
            .collect();

        let colorizer = MeshColorizer::default();
        let colors = colorizer.colorize(&mesh, &clusters).unwrap();
        prop_assert_eq!(&colors, &colorizer.colorize(&mesh, &clusters).unwrap());

        for (v, color) in colors.iter().enumerate() {
            let expected = clusters
                .iter()
                .rev()
                .find(|c| c.vertex_indices.contains(&v))
                .map(|c| colorizer.label_color(c.label))
                .unwrap_or(Color::GRAY);
            prop_assert_eq!(*color, expected);
        }
    }

    /// Property: frustum widgets never exceed the window, one trajectory polyline holds every pose
    #[test]
    fn test_frustum_window_bound(k in 1..60usize, window in 1..15usize) {
        let mut registry = SceneRegistry::new();
        let mut trajectory = TrajectoryAccumulator::default();

        for i in 0..k {
            trajectory.append(Pose::from_translation(i as f64, 0.0, 0.0));
            trajectory.publish(&mut registry, window, None).unwrap();
            prop_assert!(registry.ids_with_prefix("frustum/").len() <= window);
        }

        prop_assert_eq!(registry.ids_with_prefix("frustum/").len(), k.min(window));
        prop_assert_eq!(registry.ids_with_prefix(TRAJECTORY_ID).len(), 1);
        match &registry.get_str(TRAJECTORY_ID).unwrap().primitive {
            Primitive::Polyline { points, .. } => prop_assert_eq!(points.len(), k),
            other => prop_assert!(false, "unexpected primitive {:?}", other.kind()),
        }
    }
}
