//! Frame Assembler
//!
//! Turns one frame of pipeline output into a [`VisualizerOutput`]: the
//! ordered render commands for this frame plus any 2D overlays and per-step
//! errors. The assembler holds configuration and collaborators only; all
//! scene state lives in a [`SceneState`] passed in by the caller.
//!
//! Steps run in a fixed order:
//! 1. trajectory append and frustum window
//! 2. mesh colorization (and cluster hulls, mesh logging)
//! 3. plane reconcile / retire
//! 4. landmark, point cloud and mesh upserts; landmarks and clouds missing
//!    from the frame are removed
//!
//! A failing step is recorded in `errors` and skipped; the other steps still
//! run.

use std::collections::BTreeSet;
use std::path::Path;

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vioviz_env::{CameraIntrinsics, Color, Image, Pose, Primitive, RenderCommand, WidgetId};

use crate::colorizer::{MeshColorizer, TriangleCluster};
use crate::config::{VisualizationType, VisualizerConfig};
use crate::error::{Result, VizError};
use crate::exporter::{load_ply_mesh, MeshLogger};
use crate::hull::cluster_hull;
use crate::mesh::{texturize, Landmark, LandmarkType, Mesh2d, Mesh3d, PlaneId};
use crate::plane_lines::{LandmarkPositions, PlaneLineTracker, PlaneReport};
use crate::registry::SceneRegistry;
use crate::trajectory::TrajectoryAccumulator;

// ============================================================================
// WIDGET IDENTITIES
// ============================================================================

pub const MESH_ID: &str = "mesh";
pub const LANDMARKS_ID: &str = "points";
pub const CLOUD_ID: &str = "cloud";
pub const WORLD_FRAME_ID: &str = "world";
pub const PLY_MESH_ID: &str = "ply_mesh";

/// Identity of the hull outline of cluster `label`.
pub fn hull_id(label: u32) -> WidgetId {
    WidgetId::new(format!("cluster/{}/hull", label))
}

// ============================================================================
// INPUT / OUTPUT
// ============================================================================

/// Dense point cloud from the pipeline, optionally colored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub points: Vec<Point3<f64>>,
    pub colors: Option<Vec<Color>>,
}

/// One frame of pipeline output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualizerInput {
    /// Monotonically increasing timestamp in nanoseconds
    pub timestamp: u64,

    /// Current camera pose in the world frame
    pub pose: Pose,

    /// Current (left) image, if any
    pub image: Option<Image>,

    /// 3D mesh in the world frame
    pub mesh_3d: Option<Mesh3d>,

    /// 2D triangulation matching `mesh_3d` vertex for vertex
    pub mesh_2d: Option<Mesh2d>,

    /// Cluster set for this frame, in priority order
    pub clusters: Vec<TriangleCluster>,

    /// Planes reported this frame
    pub planes: Vec<PlaneReport>,

    /// Sparse landmarks with their parameterization
    pub landmarks: Vec<Landmark>,

    /// Dense point cloud
    pub point_cloud: Option<PointCloud>,
}

impl VisualizerInput {
    pub fn new(timestamp: u64, pose: Pose) -> Self {
        Self {
            timestamp,
            pose,
            ..Default::default()
        }
    }

    fn landmark_positions(&self) -> LandmarkPositions {
        self.landmarks.iter().map(|l| (l.id, l.position)).collect()
    }
}

/// Image with 2D line segments to draw over it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOverlay {
    pub name: String,
    pub image: Image,
    pub segments: Vec<[Point2<f64>; 2]>,
}

/// What one frame changes, ready for a render backend.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizerOutput {
    pub frame: u64,
    pub timestamp: u64,
    pub mode: VisualizationType,

    /// Registry commands in application order
    pub commands: Vec<RenderCommand>,

    /// 2D overlays (mode Mesh2d)
    pub images: Vec<ImageOverlay>,

    /// Steps that failed and were skipped
    pub errors: Vec<VizError>,

    /// Pose of the newest frustum
    pub frustum_pose: Option<Pose>,
}

impl VisualizerOutput {
    fn new(frame: u64, timestamp: u64, mode: VisualizationType) -> Self {
        Self {
            frame,
            timestamp,
            mode,
            commands: Vec::new(),
            images: Vec::new(),
            errors: Vec::new(),
            frustum_pose: None,
        }
    }

    /// Nothing to draw and nothing went wrong.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.images.is_empty() && self.errors.is_empty()
    }

    /// Number of commands of each kind: (adds, updates, removes).
    pub fn command_counts(&self) -> (usize, usize, usize) {
        self.commands.iter().fold((0, 0, 0), |(a, u, r), c| match c {
            RenderCommand::Add { .. } => (a + 1, u, r),
            RenderCommand::Update { .. } => (a, u + 1, r),
            RenderCommand::Remove { .. } => (a, u, r + 1),
        })
    }
}

// ============================================================================
// SCENE STATE
// ============================================================================

/// Everything that persists between frames, owned by the assembling thread.
#[derive(Debug)]
pub struct SceneState {
    pub registry: SceneRegistry,
    pub trajectory: TrajectoryAccumulator,
    pub tracker: PlaneLineTracker,
    logger: Option<MeshLogger>,
    hulls: BTreeSet<u32>,
    frame: u64,
    world_frame_drawn: bool,
}

impl SceneState {
    /// Fresh state; a mesh logger is attached when `config.log_mesh` is set.
    pub fn new(config: &VisualizerConfig) -> Self {
        Self::with_intrinsics(config, CameraIntrinsics::default())
    }

    pub fn with_intrinsics(config: &VisualizerConfig, intrinsics: CameraIntrinsics) -> Self {
        let logger = config
            .log_mesh
            .then(|| MeshLogger::new(&config.output_dir, config.log_accumulated_mesh));
        Self {
            registry: SceneRegistry::new(),
            trajectory: TrajectoryAccumulator::new(intrinsics),
            tracker: PlaneLineTracker::default(),
            logger,
            hulls: BTreeSet::new(),
            frame: 0,
            world_frame_drawn: false,
        }
    }

    /// Number of frames assembled so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn logger(&self) -> Option<&MeshLogger> {
        self.logger.as_ref()
    }
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// Stateless per-frame orchestration.
#[derive(Debug)]
pub struct FrameAssembler {
    config: VisualizerConfig,
    colorizer: MeshColorizer,
}

impl FrameAssembler {
    /// Creates an assembler after validating the configuration.
    pub fn new(config: VisualizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            colorizer: MeshColorizer::default(),
        })
    }

    /// Replaces the colorizer (palette, properties hook).
    pub fn with_colorizer(mut self, colorizer: MeshColorizer) -> Self {
        self.colorizer = colorizer;
        self
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    /// Builds the delta for one frame.
    pub fn assemble(&self, state: &mut SceneState, input: &VisualizerInput) -> VisualizerOutput {
        state.frame += 1;
        let frame = state.frame;
        state.registry.begin_frame(frame);

        let mode = self.config.mode;
        let mut output = VisualizerOutput::new(frame, input.timestamp, mode);

        // (a) trajectory
        state.trajectory.append(input.pose);
        if mode == VisualizationType::None {
            output.commands = state.registry.drain_commands();
            return output;
        }
        self.draw_world_frame(state, &mut output);
        if let Err(e) = state.trajectory.publish(
            &mut state.registry,
            self.config.frustum_window,
            input.image.as_ref(),
        ) {
            output.errors.push(e);
        }
        output.frustum_pose = state.trajectory.latest().copied();

        // (b) mesh colorization
        let colored_mesh = match mode {
            VisualizationType::Mesh3d => self.colorize_mesh(state, input, &mut output),
            VisualizationType::Mesh2d => {
                self.overlay_mesh_2d(input, &mut output);
                None
            }
            _ => None,
        };

        // (c) planes
        if self.config.backend_type.draws_planes() {
            self.reconcile_planes(state, input, &mut output);
        }

        // (d) clouds and mesh
        if matches!(mode, VisualizationType::Mesh3d | VisualizationType::PointCloud) {
            self.upsert_landmarks(state, input, &mut output);
            self.upsert_point_cloud(state, input, &mut output);
        }
        if let Some(primitive) = colored_mesh {
            if let Err(e) = state.registry.upsert(MESH_ID, primitive, Pose::identity()) {
                output.errors.push(e);
            }
        }

        // Landmarks and clouds not supplied this frame
        state.registry.evict_stale(frame);

        output.commands = state.registry.drain_commands();

        for e in &output.errors {
            warn!("Frame {}: {}", frame, e);
        }
        let (adds, updates, removes) = output.command_counts();
        debug!(
            "Frame {} assembled: {} adds, {} updates, {} removes, {} errors",
            frame,
            adds,
            updates,
            removes,
            output.errors.len()
        );

        output
    }

    /// Loads a PLY mesh and shows it as the `ply_mesh` widget.
    pub fn visualize_ply_mesh(&self, state: &mut SceneState, path: impl AsRef<Path>) -> Result<Vec<RenderCommand>> {
        let loaded = load_ply_mesh(path)?;
        state.registry.upsert(
            PLY_MESH_ID,
            Primitive::Mesh {
                vertices: loaded.mesh.vertices,
                triangles: loaded.mesh.triangles,
                colors: loaded.colors,
                tcoords: None,
            },
            Pose::identity(),
        )?;
        Ok(state.registry.drain_commands())
    }

    fn draw_world_frame(&self, state: &mut SceneState, output: &mut VisualizerOutput) {
        if !self.config.draw_coordinate_frame || state.world_frame_drawn {
            return;
        }
        match state.registry.upsert(
            WORLD_FRAME_ID,
            Primitive::CoordinateFrame { scale: 0.2 },
            Pose::identity(),
        ) {
            Ok(_) => state.world_frame_drawn = true,
            Err(e) => output.errors.push(e),
        }
    }

    /// Colors the mesh, refreshes cluster hulls and logs the mesh.
    ///
    /// Returns the mesh primitive to upsert in step (d).
    fn colorize_mesh(
        &self,
        state: &mut SceneState,
        input: &VisualizerInput,
        output: &mut VisualizerOutput,
    ) -> Option<Primitive> {
        let mesh = input.mesh_3d.as_ref()?;

        if let Err(e) = mesh.validate() {
            output.errors.push(e);
            return None;
        }

        let colors = match self.colorizer.colorize(mesh, &input.clusters) {
            Ok(colors) => colors,
            Err(e) => {
                output.errors.push(e);
                return None;
            }
        };

        self.refresh_hulls(state, mesh, &input.clusters, output);

        if let Some(logger) = state.logger.as_mut() {
            if let Err(e) = logger.log_mesh(mesh, &colors, input.timestamp) {
                output.errors.push(e);
            }
        }

        let tcoords = match (&input.mesh_2d, &input.image) {
            (Some(mesh_2d), Some(image)) => {
                match texturize(mesh_2d, mesh, image.width, image.height) {
                    Ok(tcoords) => Some(tcoords),
                    Err(e) => {
                        output.errors.push(e);
                        None
                    }
                }
            }
            _ => None,
        };

        Some(Primitive::Mesh {
            vertices: mesh.vertices.clone(),
            triangles: mesh.triangles.clone(),
            colors,
            tcoords,
        })
    }

    fn refresh_hulls(
        &self,
        state: &mut SceneState,
        mesh: &Mesh3d,
        clusters: &[TriangleCluster],
        output: &mut VisualizerOutput,
    ) {
        let mut current = BTreeSet::new();
        for cluster in clusters {
            let Some(label) = cluster.label else { continue };
            let Some(outline) = cluster_hull(mesh, cluster) else {
                continue;
            };
            let primitive = Primitive::Polyline {
                points: outline,
                color: self.colorizer.label_color(Some(label)),
            };
            match state.registry.upsert(hull_id(label), primitive, Pose::identity()) {
                Ok(_) => {
                    current.insert(label);
                }
                Err(e) => output.errors.push(e),
            }
        }

        for label in state.hulls.difference(&current) {
            state.registry.remove(&hull_id(*label));
        }
        state.hulls = current;
    }

    fn overlay_mesh_2d(&self, input: &VisualizerInput, output: &mut VisualizerOutput) {
        let (Some(mesh_2d), Some(image)) = (&input.mesh_2d, &input.image) else {
            return;
        };
        match mesh_2d.edges() {
            Ok(segments) => output.images.push(ImageOverlay {
                name: "mesh_2d".to_string(),
                image: image.clone(),
                segments,
            }),
            Err(e) => output.errors.push(e),
        }
    }

    fn reconcile_planes(
        &self,
        state: &mut SceneState,
        input: &VisualizerInput,
        output: &mut VisualizerOutput,
    ) {
        let landmarks = input.landmark_positions();
        let mut reported: BTreeSet<PlaneId> = BTreeSet::new();

        for report in &input.planes {
            reported.insert(report.id);
            match state.tracker.reconcile(&mut state.registry, report, &landmarks) {
                Ok(stats) => output.errors.extend(stats.errors(report.id)),
                Err(e) => output.errors.push(e),
            }
        }

        let retired = state.tracker.retire_absent(&mut state.registry, &reported);
        if !retired.is_empty() {
            debug!("Retired planes {:?}", retired);
        }
    }

    fn upsert_landmarks(
        &self,
        state: &mut SceneState,
        input: &VisualizerInput,
        output: &mut VisualizerOutput,
    ) {
        if input.landmarks.is_empty() {
            return;
        }
        let points = input.landmarks.iter().map(|l| l.position).collect();
        let colors = input
            .landmarks
            .iter()
            .map(|l| match l.kind {
                LandmarkType::Smart => Color::WHITE,
                LandmarkType::Projection => Color::GREEN,
            })
            .collect();

        if let Err(e) = state.registry.upsert_transient(
            LANDMARKS_ID,
            Primitive::PointCloud {
                points,
                colors: Some(colors),
            },
            Pose::identity(),
        ) {
            output.errors.push(e);
        }
    }

    fn upsert_point_cloud(
        &self,
        state: &mut SceneState,
        input: &VisualizerInput,
        output: &mut VisualizerOutput,
    ) {
        let Some(cloud) = &input.point_cloud else { return };
        if let Err(e) = state.registry.upsert_transient(
            CLOUD_ID,
            Primitive::PointCloud {
                points: cloud.points.clone(),
                colors: cloud.colors.clone(),
            },
            Pose::identity(),
        ) {
            output.errors.push(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendType;
    use crate::plane_lines::{line_id, plane_label_id, plane_normal_id, plane_widget_id};
    use nalgebra::Vector3;

    fn pose(i: usize) -> Pose {
        Pose::from_translation(i as f64, 0.0, 0.0)
    }

    fn grid_mesh(n: usize) -> Mesh3d {
        let vertices = (0..n).map(|i| Point3::new(i as f64, (i % 3) as f64, 0.0)).collect();
        let triangles = (0..n.saturating_sub(2)).map(|i| [i, i + 1, i + 2]).collect();
        Mesh3d::new(vertices, triangles)
    }

    fn landmarks(ids: impl IntoIterator<Item = u64>) -> Vec<Landmark> {
        ids.into_iter()
            .map(|id| Landmark::new(id, Point3::new(id as f64, 1.0, 2.0), LandmarkType::Smart))
            .collect()
    }

    fn planes_config() -> VisualizerConfig {
        VisualizerConfig::default().with_backend_type(BackendType::StructuralRegularities)
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = VisualizerConfig::default().with_frustum_window(0);
        assert!(matches!(FrameAssembler::new(config), Err(VizError::Config(_))));
    }

    #[test]
    fn test_first_frame_adds_world_trajectory_frustum() {
        let config = VisualizerConfig::default();
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        let output = assembler.assemble(&mut state, &VisualizerInput::new(1, pose(0)));

        assert_eq!(output.frame, 1);
        assert_eq!(output.command_counts(), (3, 0, 0));
        assert!(state.registry.contains_str(WORLD_FRAME_ID));
        assert!(state.registry.contains_str("trajectory"));
        assert!(state.registry.contains_str("frustum/0"));
        assert_eq!(output.frustum_pose, Some(pose(0)));
    }

    #[test]
    fn test_mode_none_keeps_history_only() {
        let config = VisualizerConfig::default().with_mode(VisualizationType::None);
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        for i in 0..3 {
            let output = assembler.assemble(&mut state, &VisualizerInput::new(i, pose(i as usize)));
            assert!(output.is_empty());
        }
        assert_eq!(state.trajectory.len(), 3);
        assert!(state.registry.is_empty());
    }

    #[test]
    fn test_bad_cluster_skips_mesh_only() {
        let config = planes_config();
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        let mut input = VisualizerInput::new(1, pose(0));
        input.mesh_3d = Some(grid_mesh(10));
        input.clusters = vec![TriangleCluster::labeled(1, [0, 99])];
        input.landmarks = landmarks(0..5);
        input.planes = vec![PlaneReport::new(7, Vector3::z(), 1.0, [1, 2])];

        let output = assembler.assemble(&mut state, &input);

        assert_eq!(output.errors.len(), 1);
        assert!(matches!(output.errors[0], VizError::MalformedInput(_)));
        assert!(!state.registry.contains_str(MESH_ID));
        assert!(state.registry.contains(&line_id(7, 1)));
        assert!(state.registry.contains_str(LANDMARKS_ID));
    }

    #[test]
    fn test_mesh_colored_and_hulls_follow_clusters() {
        let config = VisualizerConfig::default();
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        let mut input = VisualizerInput::new(1, pose(0));
        input.mesh_3d = Some(grid_mesh(12));
        input.clusters = vec![TriangleCluster::labeled(3, 0..6).with_normal(Vector3::z())];
        assembler.assemble(&mut state, &input);

        assert!(state.registry.contains_str(MESH_ID));
        assert!(state.registry.contains(&hull_id(3)));

        input.timestamp = 2;
        input.clusters.clear();
        let output = assembler.assemble(&mut state, &input);

        assert!(!state.registry.contains(&hull_id(3)));
        assert!(output
            .commands
            .iter()
            .any(|c| c.is_remove() && *c.id() == hull_id(3)));
        match &state.registry.get_str(MESH_ID).unwrap().primitive {
            Primitive::Mesh { colors, .. } => assert!(colors.iter().all(|c| *c == Color::GRAY)),
            other => panic!("unexpected primitive {:?}", other.kind()),
        }
    }

    #[test]
    fn test_planes_ignored_for_stereo_imu_backend() {
        let config = VisualizerConfig::default();
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        let mut input = VisualizerInput::new(1, pose(0));
        input.landmarks = landmarks(0..5);
        input.planes = vec![PlaneReport::new(7, Vector3::z(), 1.0, [1, 2])];
        assembler.assemble(&mut state, &input);

        assert!(state.tracker.active_planes().is_empty());
        assert!(state.registry.ids_with_prefix("plane/").is_empty());
    }

    #[test]
    fn test_absent_plane_retired() {
        let config = planes_config();
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        let mut input = VisualizerInput::new(1, pose(0));
        input.landmarks = landmarks(0..10);
        input.planes = vec![PlaneReport::new(7, Vector3::z(), 1.0, [3, 4, 5])];
        assembler.assemble(&mut state, &input);

        input.timestamp = 2;
        input.planes.clear();
        let output = assembler.assemble(&mut state, &input);

        let (_, _, removes) = output.command_counts();
        assert_eq!(removes, 6);
        assert!(state.registry.ids_with_prefix("plane/").is_empty());
    }

    #[test]
    fn test_mesh_2d_overlay() {
        let config = VisualizerConfig::default().with_mode(VisualizationType::Mesh2d);
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        let mut input = VisualizerInput::new(1, pose(0));
        input.image = Some(Image::filled(8, 8, 0));
        input.mesh_2d = Some(Mesh2d::new(
            vec![Point2::new(0.0, 0.0), Point2::new(4.0, 0.0), Point2::new(0.0, 4.0)],
            vec![[0, 1, 2]],
        ));

        let output = assembler.assemble(&mut state, &input);
        assert_eq!(output.images.len(), 1);
        assert_eq!(output.images[0].segments.len(), 3);
        assert!(!state.registry.contains_str(MESH_ID));
    }

    #[test]
    fn test_cloud_color_mismatch_reported() {
        let config = VisualizerConfig::default().with_mode(VisualizationType::PointCloud);
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        let mut input = VisualizerInput::new(1, pose(0));
        input.point_cloud = Some(PointCloud {
            points: vec![Point3::origin(); 3],
            colors: Some(vec![Color::RED]),
        });

        let output = assembler.assemble(&mut state, &input);
        assert_eq!(output.errors.len(), 1);
        assert!(!state.registry.contains_str(CLOUD_ID));
        assert!(state.registry.contains_str("trajectory"));
    }

    #[test]
    fn test_texture_coordinates_attached() {
        let config = VisualizerConfig::default();
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        let mesh = grid_mesh(3);
        let mut input = VisualizerInput::new(1, pose(0));
        input.image = Some(Image::filled(10, 10, 0));
        input.mesh_2d = Some(Mesh2d::new(
            vec![Point2::new(0.0, 0.0), Point2::new(5.0, 5.0), Point2::new(10.0, 10.0)],
            mesh.triangles.clone(),
        ));
        input.mesh_3d = Some(mesh);
        assembler.assemble(&mut state, &input);

        match &state.registry.get_str(MESH_ID).unwrap().primitive {
            Primitive::Mesh { tcoords, .. } => {
                assert_eq!(tcoords.as_ref().map(|t| t[1]), Some([0.5, 0.5]));
            }
            other => panic!("unexpected primitive {:?}", other.kind()),
        }
    }

    #[test]
    fn test_degenerate_plane_does_not_leak_into_next_frame() {
        let config = planes_config();
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        let mut input = VisualizerInput::new(1, pose(0));
        input.landmarks = landmarks(0..10);
        input.planes = vec![PlaneReport::new(7, Vector3::zeros(), 1.0, [1, 2])];
        let output = assembler.assemble(&mut state, &input);

        assert_eq!(output.errors.len(), 1);
        assert!(state.tracker.active_planes().is_empty());
        assert!(state.registry.ids_with_prefix("plane/").is_empty());
        assert!(state.registry.contains_str(LANDMARKS_ID));

        input.timestamp = 2;
        input.planes = vec![PlaneReport::new(7, Vector3::z(), 1.0, [2, 3])];
        let output = assembler.assemble(&mut state, &input);

        assert!(output.errors.is_empty());
        let owned: Vec<_> = state.tracker.owned_lines(7).unwrap().iter().copied().collect();
        assert_eq!(owned, vec![2, 3]);
        let mut expected = vec![
            plane_widget_id(7),
            plane_label_id(7),
            line_id(7, 2),
            line_id(7, 3),
            plane_normal_id(7),
        ];
        expected.sort();
        assert_eq!(state.registry.ids_with_prefix("plane/"), expected);
    }

    #[test]
    fn test_degenerate_update_reports_and_reconciles() {
        let config = planes_config();
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        let mut input = VisualizerInput::new(1, pose(0));
        input.landmarks = landmarks(0..10);
        input.planes = vec![PlaneReport::new(7, Vector3::z(), 1.0, [3, 4, 5])];
        assembler.assemble(&mut state, &input);

        input.timestamp = 2;
        input.planes = vec![PlaneReport::new(7, Vector3::zeros(), 1.0, [4, 5, 6])];
        let output = assembler.assemble(&mut state, &input);

        assert_eq!(output.errors.len(), 1);
        assert!(matches!(output.errors[0], VizError::MalformedInput(_)));
        assert!(!state.registry.contains(&line_id(7, 3)));
        assert!(state.registry.contains(&line_id(7, 6)));
        assert!(state.registry.contains(&plane_widget_id(7)));
    }

    #[test]
    fn test_missing_cloud_and_landmarks_removed() {
        let config = VisualizerConfig::default().with_mode(VisualizationType::PointCloud);
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        let mut input = VisualizerInput::new(1, pose(0));
        input.landmarks = landmarks(0..4);
        input.point_cloud = Some(PointCloud {
            points: vec![Point3::origin(); 3],
            colors: None,
        });
        assembler.assemble(&mut state, &input);
        assert!(state.registry.contains_str(CLOUD_ID));

        // Same data again: updated in place
        input.timestamp = 2;
        let output = assembler.assemble(&mut state, &input);
        assert!(!output.commands.iter().any(|c| c.is_remove()));

        input.timestamp = 3;
        input.point_cloud = None;
        let output = assembler.assemble(&mut state, &input);
        assert!(!state.registry.contains_str(CLOUD_ID));
        assert!(state.registry.contains_str(LANDMARKS_ID));
        assert!(output
            .commands
            .iter()
            .any(|c| c.is_remove() && c.id().as_str() == CLOUD_ID));

        input.timestamp = 4;
        input.landmarks.clear();
        assembler.assemble(&mut state, &input);
        assert!(!state.registry.contains_str(LANDMARKS_ID));
        assert!(state.registry.contains_str("trajectory"));
    }
}
