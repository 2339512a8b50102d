//! vioviz Core - Incremental Scene Maintenance for VIO/SLAM Visualization
//!
//! This library keeps a 3D scene in sync with the output of a visual-inertial
//! odometry pipeline, frame after frame, without leaking or duplicating
//! widgets:
//! 1. **Scene Registry**: one entry per stable widget identity; every change is
//!    an add, an in-place update or a remove
//! 2. **Plane/Landmark Lines**: set-difference reconciliation of constraint
//!    lines, idempotent across frames
//! 3. **Mesh Colorizer**: deterministic per-vertex colors from overlapping
//!    clusters (last cluster wins)
//! 4. **Trajectory**: full path polyline plus a sliding window of frustums
//!
//! The [`FrameAssembler`] runs these steps for one frame and produces a
//! [`VisualizerOutput`]; a [`RenderThread`] applies outputs to a render
//! backend from a single dedicated thread.

pub mod assembler;
pub mod colorizer;
pub mod config;
pub mod display;
pub mod error;
pub mod exporter;
pub mod hull;
pub mod mesh;
pub mod plane_lines;
pub mod registry;
pub mod trajectory;

#[cfg(feature = "visualization")]
pub mod visualization;

// Re-export key types for convenience
pub use assembler::{
    FrameAssembler, ImageOverlay, PointCloud, SceneState, VisualizerInput, VisualizerOutput,
};
pub use colorizer::{MeshColorizer, MeshPropertiesHook, Palette, TriangleCluster};
pub use config::{BackendType, VisualizationType, VisualizerConfig};
pub use display::{apply_output, DisplayRequest, RenderStats, RenderThread};
pub use error::{Result, VizError};
pub use exporter::{load_ply_mesh, MeshLogger};
pub use mesh::{Landmark, LandmarkId, LandmarkType, Mesh2d, Mesh3d, PlaneId};
pub use plane_lines::{PlaneLineTracker, PlaneReport};
pub use registry::SceneRegistry;
pub use trajectory::TrajectoryAccumulator;

#[cfg(feature = "visualization")]
pub use visualization::RerunBackend;
