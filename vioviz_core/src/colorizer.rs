//! Mesh Colorizer
//!
//! Assigns one color per mesh vertex from the current frame's cluster set.
//! Vertices claimed by several clusters take the color of the last cluster
//! that claims them; there is no blending.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use vioviz_env::Color;

use crate::error::{Result, VizError};
use crate::mesh::Mesh3d;

/// Number of distinct cluster colors.
pub const PALETTE_SIZE: usize = 8;

/// Fixed label-to-color table, stable across frames and runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    colors: [Color; PALETTE_SIZE],
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: [
                Color::RED,
                Color::GREEN,
                Color::BLUE,
                Color::YELLOW,
                Color::CYAN,
                Color::MAGENTA,
                Color::ORANGE,
                Color::PURPLE,
            ],
        }
    }
}

impl Palette {
    pub fn new(colors: [Color; PALETTE_SIZE]) -> Self {
        Self { colors }
    }

    /// Color of a cluster label: `palette[label % PALETTE_SIZE]`.
    pub fn color(&self, label: u32) -> Color {
        self.colors[label as usize % PALETTE_SIZE]
    }

    /// Color keyed by any integer id (planes use their id).
    pub fn color_for(&self, id: u64) -> Color {
        self.colors[(id % PALETTE_SIZE as u64) as usize]
    }
}

/// Vertex indices forming one labeled surface patch in the current frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleCluster {
    /// Cluster label, `None` for the unclustered sentinel
    pub label: Option<u32>,

    /// Mesh vertex indices in the cluster
    pub vertex_indices: Vec<usize>,

    /// Dominant surface normal, when the segmentation provides one
    pub normal: Option<Vector3<f64>>,
}

impl TriangleCluster {
    pub fn new(label: Option<u32>, vertex_indices: Vec<usize>) -> Self {
        Self {
            label,
            vertex_indices,
            normal: None,
        }
    }

    /// Cluster with a label over a contiguous vertex range.
    pub fn labeled(label: u32, vertex_indices: impl IntoIterator<Item = usize>) -> Self {
        Self::new(Some(label), vertex_indices.into_iter().collect())
    }

    pub fn with_normal(mut self, normal: Vector3<f64>) -> Self {
        self.normal = Some(normal);
        self
    }

    /// Builds a cluster from triangle ids by expanding them to their vertices.
    ///
    /// Vertices are listed in first-seen order without repetition.
    pub fn from_triangles(label: Option<u32>, triangle_ids: &[usize], mesh: &Mesh3d) -> Result<Self> {
        let mut seen = vec![false; mesh.vertex_count()];
        let mut vertex_indices = Vec::with_capacity(triangle_ids.len() * 3);

        for &t in triangle_ids {
            let tri = mesh.triangles.get(t).ok_or_else(|| {
                VizError::malformed(format!(
                    "cluster references triangle {} but the mesh has {} triangles",
                    t,
                    mesh.triangle_count()
                ))
            })?;
            for &v in tri {
                match seen.get_mut(v) {
                    Some(flag) if !*flag => {
                        *flag = true;
                        vertex_indices.push(v);
                    }
                    Some(_) => {}
                    None => {
                        return Err(VizError::malformed(format!(
                            "triangle {} references vertex {} but the mesh has {} vertices",
                            t,
                            v,
                            mesh.vertex_count()
                        )))
                    }
                }
            }
        }

        Ok(Self::new(label, vertex_indices))
    }

    pub fn len(&self) -> usize {
        self.vertex_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_indices.is_empty()
    }
}

/// Strategy run after cluster coloring, e.g. semantic-label coloring.
pub type MeshPropertiesHook = Box<dyn Fn(&Mesh3d, &mut [Color]) + Send + Sync>;

/// Computes per-vertex colors from clusters.
pub struct MeshColorizer {
    palette: Palette,
    default_color: Color,
    hook: Option<MeshPropertiesHook>,
}

impl std::fmt::Debug for MeshColorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshColorizer")
            .field("palette", &self.palette)
            .field("default_color", &self.default_color)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl Default for MeshColorizer {
    fn default() -> Self {
        Self::new(Palette::default())
    }
}

impl MeshColorizer {
    pub fn new(palette: Palette) -> Self {
        Self {
            palette,
            default_color: Color::GRAY,
            hook: None,
        }
    }

    /// Installs a properties hook invoked after cluster coloring.
    pub fn with_hook(mut self, hook: MeshPropertiesHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn default_color(&self) -> Color {
        self.default_color
    }

    /// Color used for a cluster label.
    pub fn label_color(&self, label: Option<u32>) -> Color {
        match label {
            Some(label) => self.palette.color(label),
            None => self.default_color,
        }
    }

    /// One color per vertex of `mesh`.
    ///
    /// Every cluster is checked before any color is written, so a malformed
    /// cluster yields an error and no partial coloring.
    pub fn colorize(&self, mesh: &Mesh3d, clusters: &[TriangleCluster]) -> Result<Vec<Color>> {
        let n = mesh.vertex_count();
        for (i, cluster) in clusters.iter().enumerate() {
            if let Some(&bad) = cluster.vertex_indices.iter().find(|&&v| v >= n) {
                return Err(VizError::malformed(format!(
                    "cluster {} (label {:?}) references vertex {} but the mesh has {} vertices",
                    i, cluster.label, bad, n
                )));
            }
        }

        let mut colors = vec![self.default_color; n];
        for cluster in clusters {
            let color = self.label_color(cluster.label);
            for &v in &cluster.vertex_indices {
                colors[v] = color;
            }
        }

        if let Some(hook) = &self.hook {
            hook(mesh, &mut colors);
        }

        Ok(colors)
    }
}
