//! Primitive kinds a render backend knows how to draw, and the instructions
//! used to drive it.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::types::{CameraIntrinsics, Color, Image, Pose, WidgetId};

/// Geometry and payload of a single widget.
///
/// The set of kinds is closed; backends match on it exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    /// Unconnected points, optionally colored per point.
    PointCloud {
        points: Vec<Point3<f64>>,
        colors: Option<Vec<Color>>,
    },

    /// Triangle mesh with one color per vertex and optional texture coordinates.
    Mesh {
        vertices: Vec<Point3<f64>>,
        triangles: Vec<[usize; 3]>,
        colors: Vec<Color>,
        tcoords: Option<Vec<[f32; 2]>>,
    },

    /// Single segment.
    Line {
        from: Point3<f64>,
        to: Point3<f64>,
        color: Color,
    },

    /// Connected segments through all points.
    Polyline {
        points: Vec<Point3<f64>>,
        color: Color,
    },

    /// Camera viewing volume, optionally textured with the current image.
    Frustum {
        intrinsics: CameraIntrinsics,
        scale: f64,
        image: Option<Image>,
        color: Color,
    },

    /// Cylinder along the axis `from -> to`.
    Cylinder {
        from: Point3<f64>,
        to: Point3<f64>,
        radius: f64,
        sides: u32,
        color: Color,
    },

    /// Square patch of a plane.
    Plane {
        center: Point3<f64>,
        normal: Vector3<f64>,
        size: f64,
        color: Color,
    },

    /// Billboard text anchored in 3D.
    Text {
        position: Point3<f64>,
        text: String,
        color: Color,
    },

    /// World axes.
    CoordinateFrame { scale: f64 },
}

/// Fieldless tag of a [`Primitive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    PointCloud,
    Mesh,
    Line,
    Polyline,
    Frustum,
    Cylinder,
    Plane,
    Text,
    CoordinateFrame,
}

impl Primitive {
    /// Returns the kind of this primitive.
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::PointCloud { .. } => PrimitiveKind::PointCloud,
            Primitive::Mesh { .. } => PrimitiveKind::Mesh,
            Primitive::Line { .. } => PrimitiveKind::Line,
            Primitive::Polyline { .. } => PrimitiveKind::Polyline,
            Primitive::Frustum { .. } => PrimitiveKind::Frustum,
            Primitive::Cylinder { .. } => PrimitiveKind::Cylinder,
            Primitive::Plane { .. } => PrimitiveKind::Plane,
            Primitive::Text { .. } => PrimitiveKind::Text,
            Primitive::CoordinateFrame { .. } => PrimitiveKind::CoordinateFrame,
        }
    }

    /// Number of points or vertices carried, 0 for parametric shapes.
    pub fn point_count(&self) -> usize {
        match self {
            Primitive::PointCloud { points, .. } => points.len(),
            Primitive::Mesh { vertices, .. } => vertices.len(),
            Primitive::Polyline { points, .. } => points.len(),
            Primitive::Line { .. } | Primitive::Cylinder { .. } => 2,
            _ => 0,
        }
    }

    /// Checks internal consistency (index ranges, per-point array lengths).
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Primitive::PointCloud { points, colors } => {
                if let Some(colors) = colors {
                    if colors.len() != points.len() {
                        return Err(format!(
                            "point cloud has {} points but {} colors",
                            points.len(),
                            colors.len()
                        ));
                    }
                }
                Ok(())
            }
            Primitive::Mesh {
                vertices,
                triangles,
                colors,
                tcoords,
            } => {
                if colors.len() != vertices.len() {
                    return Err(format!(
                        "mesh has {} vertices but {} colors",
                        vertices.len(),
                        colors.len()
                    ));
                }
                if let Some(tcoords) = tcoords {
                    if tcoords.len() != vertices.len() {
                        return Err(format!(
                            "mesh has {} vertices but {} texture coordinates",
                            vertices.len(),
                            tcoords.len()
                        ));
                    }
                }
                for (i, tri) in triangles.iter().enumerate() {
                    if let Some(bad) = tri.iter().find(|&&v| v >= vertices.len()) {
                        return Err(format!(
                            "triangle {} references vertex {} (mesh has {})",
                            i,
                            bad,
                            vertices.len()
                        ));
                    }
                }
                Ok(())
            }
            Primitive::Cylinder { radius, sides, .. } => {
                if *radius <= 0.0 || *sides < 3 {
                    return Err(format!("degenerate cylinder (radius {}, {} sides)", radius, sides));
                }
                Ok(())
            }
            Primitive::Plane { normal, .. } => {
                if normal.norm() < 1e-9 {
                    return Err("plane normal has zero length".to_string());
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// One instruction for a render backend.
///
/// The scene registry emits exactly one of these per mutating call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderCommand {
    /// A new widget appeared.
    Add {
        id: WidgetId,
        primitive: Primitive,
        pose: Pose,
    },

    /// An existing widget changed in place.
    Update {
        id: WidgetId,
        primitive: Primitive,
        pose: Pose,
    },

    /// A widget went away.
    Remove { id: WidgetId },
}

impl RenderCommand {
    /// Identity the command applies to.
    pub fn id(&self) -> &WidgetId {
        match self {
            RenderCommand::Add { id, .. } => id,
            RenderCommand::Update { id, .. } => id,
            RenderCommand::Remove { id } => id,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, RenderCommand::Add { .. })
    }

    pub fn is_update(&self) -> bool {
        matches!(self, RenderCommand::Update { .. })
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, RenderCommand::Remove { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_validation_index_out_of_range() {
        let mesh = Primitive::Mesh {
            vertices: vec![Point3::origin(); 3],
            triangles: vec![[0, 1, 3]],
            colors: vec![Color::GRAY; 3],
            tcoords: None,
        };
        let err = mesh.validate().unwrap_err();
        assert!(err.contains("vertex 3"));
    }

    #[test]
    fn test_mesh_validation_color_mismatch() {
        let mesh = Primitive::Mesh {
            vertices: vec![Point3::origin(); 3],
            triangles: vec![[0, 1, 2]],
            colors: vec![Color::GRAY; 2],
            tcoords: None,
        };
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_point_cloud_without_colors_is_valid() {
        let cloud = Primitive::PointCloud {
            points: vec![Point3::new(1.0, 2.0, 3.0)],
            colors: None,
        };
        assert!(cloud.validate().is_ok());
        assert_eq!(cloud.kind(), PrimitiveKind::PointCloud);
        assert_eq!(cloud.point_count(), 1);
    }

    #[test]
    fn test_command_id() {
        let cmd = RenderCommand::Remove {
            id: WidgetId::from("trajectory"),
        };
        assert_eq!(cmd.id().as_str(), "trajectory");
        assert!(cmd.is_remove());
        assert!(!cmd.is_add());
    }
}
