//! Visualizer configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VizError};

/// What the 3D view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationType {
    /// 2D triangulation drawn over the current image
    Mesh2d,
    /// 3D mesh colored by clusters, plus landmarks
    #[default]
    Mesh3d,
    /// Landmarks / dense cloud only
    PointCloud,
    /// Nothing is drawn; history is still kept
    None,
}

impl VisualizationType {
    pub fn name(&self) -> &'static str {
        match self {
            VisualizationType::Mesh2d => "mesh2d",
            VisualizationType::Mesh3d => "mesh3d",
            VisualizationType::PointCloud => "pointcloud",
            VisualizationType::None => "none",
        }
    }
}

impl std::fmt::Display for VisualizationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for VisualizationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mesh2d" | "mesh_2d" => Ok(VisualizationType::Mesh2d),
            "mesh3d" | "mesh_3d" => Ok(VisualizationType::Mesh3d),
            "pointcloud" | "point_cloud" | "points" => Ok(VisualizationType::PointCloud),
            "none" => Ok(VisualizationType::None),
            _ => Err(format!("Unknown visualization mode: {}", s)),
        }
    }
}

/// Estimator backend feeding the visualizer; decides which overlays exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// Plain stereo-inertial odometry: no planes
    #[default]
    StereoImu,
    /// Odometry with structural regularities: planes and constraint lines
    StructuralRegularities,
}

impl BackendType {
    /// Whether plane and constraint-line overlays are drawn.
    pub fn draws_planes(&self) -> bool {
        matches!(self, BackendType::StructuralRegularities)
    }
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stereo_imu" | "stereoimu" => Ok(BackendType::StereoImu),
            "structural_regularities" | "regular" | "regularities" => {
                Ok(BackendType::StructuralRegularities)
            }
            _ => Err(format!("Unknown backend type: {}", s)),
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the visualizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    /// Visualization mode (default: Mesh3d)
    pub mode: VisualizationType,

    /// Estimator backend type (default: StereoImu)
    pub backend_type: BackendType,

    /// Number of most recent poses that keep a frustum (default: 10)
    pub frustum_window: usize,

    /// Render without a window (default: false)
    pub offscreen: bool,

    /// Directory for screenshots, recordings and mesh logs (default: "output")
    pub output_dir: PathBuf,

    /// Write every colored mesh to a PLY file (default: false)
    pub log_mesh: bool,

    /// Also keep and write the union of all logged meshes (default: false)
    pub log_accumulated_mesh: bool,

    /// Draw the world axes (default: true)
    pub draw_coordinate_frame: bool,

    /// Event-loop budget per rendered frame in milliseconds (default: 1)
    pub render_timeout_ms: u64,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            mode: VisualizationType::Mesh3d,
            backend_type: BackendType::StereoImu,
            frustum_window: 10,
            offscreen: false,
            output_dir: PathBuf::from("output"),
            log_mesh: false,
            log_accumulated_mesh: false,
            draw_coordinate_frame: true,
            render_timeout_ms: 1,
        }
    }
}

impl VisualizerConfig {
    /// Loads a configuration from a JSON file; missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| VizError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| VizError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.frustum_window == 0 {
            return Err(VizError::Config("frustum_window must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn with_mode(mut self, mode: VisualizationType) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_backend_type(mut self, backend_type: BackendType) -> Self {
        self.backend_type = backend_type;
        self
    }

    pub fn with_frustum_window(mut self, n: usize) -> Self {
        self.frustum_window = n;
        self
    }

    pub fn with_offscreen(mut self, offscreen: bool) -> Self {
        self.offscreen = offscreen;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_mesh_logging(mut self, log_mesh: bool, accumulated: bool) -> Self {
        self.log_mesh = log_mesh;
        self.log_accumulated_mesh = accumulated;
        self
    }

    /// Render timeout as a duration.
    pub fn render_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.render_timeout_ms)
    }
}
