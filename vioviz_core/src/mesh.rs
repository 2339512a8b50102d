//! Mesh and landmark data handed over by the estimation pipeline.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Result, VizError};

/// Identifier of a detected planar landmark.
pub type PlaneId = u64;

/// Identifier of a 3D point landmark, unique for the lifetime of the feature.
pub type LandmarkId = u64;

/// Triangle mesh in the world frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh3d {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[usize; 3]>,
}

impl Mesh3d {
    pub fn new(vertices: Vec<Point3<f64>>, triangles: Vec<[usize; 3]>) -> Self {
        Self { vertices, triangles }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.triangles.is_empty()
    }

    /// Checks that every triangle references an existing vertex.
    pub fn validate(&self) -> Result<()> {
        for (i, tri) in self.triangles.iter().enumerate() {
            for &v in tri {
                if v >= self.vertices.len() {
                    return Err(VizError::malformed(format!(
                        "triangle {} references vertex {} but the mesh has {} vertices",
                        i,
                        v,
                        self.vertices.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Appends another mesh, re-indexing its triangles.
    pub fn append(&mut self, other: &Mesh3d) {
        let offset = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles.extend(
            other
                .triangles
                .iter()
                .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]),
        );
    }
}

/// 2D triangulation in image coordinates (pixels).
///
/// Vertex `i` corresponds to vertex `i` of the matching [`Mesh3d`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh2d {
    pub vertices: Vec<Point2<f64>>,
    pub triangles: Vec<[usize; 3]>,
}

impl Mesh2d {
    pub fn new(vertices: Vec<Point2<f64>>, triangles: Vec<[usize; 3]>) -> Self {
        Self { vertices, triangles }
    }

    /// Unique triangle edges as pixel segments, in a stable order.
    pub fn edges(&self) -> Result<Vec<[Point2<f64>; 2]>> {
        let mut unique = BTreeSet::new();
        for (i, tri) in self.triangles.iter().enumerate() {
            if let Some(&bad) = tri.iter().find(|&&v| v >= self.vertices.len()) {
                return Err(VizError::malformed(format!(
                    "2D triangle {} references vertex {} but the mesh has {} vertices",
                    i,
                    bad,
                    self.vertices.len()
                )));
            }
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                unique.insert((a.min(b), a.max(b)));
            }
        }

        Ok(unique
            .into_iter()
            .map(|(a, b)| [self.vertices[a], self.vertices[b]])
            .collect())
    }
}

/// Texture coordinates for a 3D mesh from its 2D counterpart.
///
/// Each pixel is normalized by the image size and clamped to `[0, 1]`.
pub fn texturize(mesh_2d: &Mesh2d, mesh_3d: &Mesh3d, width: u32, height: u32) -> Result<Vec<[f32; 2]>> {
    if mesh_2d.vertices.len() != mesh_3d.vertices.len() {
        return Err(VizError::malformed(format!(
            "2D mesh has {} vertices but 3D mesh has {}",
            mesh_2d.vertices.len(),
            mesh_3d.vertices.len()
        )));
    }
    if width == 0 || height == 0 {
        return Err(VizError::malformed("texture image is empty"));
    }

    Ok(mesh_2d
        .vertices
        .iter()
        .map(|px| {
            [
                (px.x / width as f64).clamp(0.0, 1.0) as f32,
                (px.y / height as f64).clamp(0.0, 1.0) as f32,
            ]
        })
        .collect())
}

/// How a landmark is parameterized in the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LandmarkType {
    /// Structureless (smart) factor landmark
    Smart,
    /// Explicit projection factor landmark
    Projection,
}

/// A 3D point landmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: LandmarkId,
    pub position: Point3<f64>,
    pub kind: LandmarkType,
}

impl Landmark {
    pub fn new(id: LandmarkId, position: Point3<f64>, kind: LandmarkType) -> Self {
        Self { id, position, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad() -> Mesh3d {
        Mesh3d::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_validate() {
        assert!(quad().validate().is_ok());

        let mut broken = quad();
        broken.triangles.push([0, 1, 9]);
        assert!(matches!(broken.validate(), Err(VizError::MalformedInput(_))));
    }

    #[test]
    fn test_append_reindexes() {
        let mut mesh = quad();
        mesh.append(&quad());
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.triangles[2], [4, 5, 6]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_edges_deduplicated() {
        let mesh = Mesh2d::new(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 0.0),
                Point2::new(10.0, 10.0),
                Point2::new(0.0, 10.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        // 4 sides + 1 shared diagonal
        assert_eq!(mesh.edges().unwrap().len(), 5);
    }

    #[test]
    fn test_texturize() {
        let mesh_2d = Mesh2d::new(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(376.0, 240.0),
                Point2::new(800.0, -5.0),
                Point2::new(752.0, 480.0),
            ],
            vec![],
        );
        let tcoords = texturize(&mesh_2d, &quad(), 752, 480).unwrap();
        assert_relative_eq!(tcoords[1][0], 0.5);
        assert_relative_eq!(tcoords[1][1], 0.5);
        assert_eq!(tcoords[2], [1.0, 0.0]);
        assert_eq!(tcoords[3], [1.0, 1.0]);
    }

    #[test]
    fn test_texturize_count_mismatch() {
        let mesh_2d = Mesh2d::new(vec![Point2::new(0.0, 0.0)], vec![]);
        assert!(texturize(&mesh_2d, &quad(), 752, 480).is_err());
    }
}
