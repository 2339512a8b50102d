//! Mesh export to PLY.
//!
//! Each logged mesh is written as `mesh_{timestamp}.ply` in the output
//! directory. With accumulation enabled, every logged mesh is also appended
//! to a running union written to `accumulated_mesh.ply`.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use nalgebra::Point3;
use ply_rs::parser::Parser;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Ply, Property, PropertyDef, PropertyType, ScalarType,
};
use ply_rs::writer::Writer;
use tracing::{debug, info};
use vioviz_env::Color;

use crate::error::{Result, VizError};
use crate::mesh::Mesh3d;

/// File name of the accumulated mesh.
pub const ACCUMULATED_MESH_FILE: &str = "accumulated_mesh.ply";

/// A mesh with per-vertex colors as stored on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColoredMesh {
    pub mesh: Mesh3d,
    pub colors: Vec<Color>,
}

/// Writes colored meshes to PLY files.
#[derive(Debug)]
pub struct MeshLogger {
    output_dir: PathBuf,
    accumulated: Option<ColoredMesh>,
    meshes_written: usize,
}

impl MeshLogger {
    /// Logger writing into `output_dir`; `accumulate` keeps the running union.
    pub fn new(output_dir: impl Into<PathBuf>, accumulate: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            accumulated: accumulate.then(ColoredMesh::default),
            meshes_written: 0,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn meshes_written(&self) -> usize {
        self.meshes_written
    }

    /// Path of the per-frame mesh for `timestamp`.
    pub fn mesh_path(&self, timestamp: u64) -> PathBuf {
        self.output_dir.join(format!("mesh_{}.ply", timestamp))
    }

    /// Writes one mesh and, when accumulating, the updated union.
    ///
    /// Returns the path of the per-frame file.
    pub fn log_mesh(&mut self, mesh: &Mesh3d, colors: &[Color], timestamp: u64) -> Result<PathBuf> {
        if colors.len() != mesh.vertex_count() {
            return Err(VizError::malformed(format!(
                "mesh has {} vertices but {} colors",
                mesh.vertex_count(),
                colors.len()
            )));
        }

        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            VizError::missing(format!("cannot create {}: {}", self.output_dir.display(), e))
        })?;

        let path = self.mesh_path(timestamp);
        write_ply_mesh(&path, mesh, colors)?;
        self.meshes_written += 1;
        debug!("Logged mesh ({} vertices) to {}", mesh.vertex_count(), path.display());

        if let Some(accumulated) = self.accumulated.as_mut() {
            accumulated.mesh.append(mesh);
            accumulated.colors.extend_from_slice(colors);
            let acc_path = self.output_dir.join(ACCUMULATED_MESH_FILE);
            write_ply_mesh(&acc_path, &accumulated.mesh, &accumulated.colors)?;
        }

        Ok(path)
    }

    /// The running union, if accumulation is enabled.
    pub fn accumulated(&self) -> Option<&ColoredMesh> {
        self.accumulated.as_ref()
    }
}

/// Writes an ASCII PLY with vertex colors and triangle faces.
pub fn write_ply_mesh(path: &Path, mesh: &Mesh3d, colors: &[Color]) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| VizError::missing(format!("cannot create {}: {}", path.display(), e)))?;
    let mut writer = BufWriter::new(file);

    let mut ply = Ply::<DefaultElement>::new();

    let mut vertex_element = ElementDef::new("vertex".to_string());
    vertex_element.count = mesh.vertex_count();
    for name in ["x", "y", "z"] {
        vertex_element.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::Double),
        ));
    }
    for name in ["red", "green", "blue"] {
        vertex_element.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::UChar),
        ));
    }
    ply.header.elements.add(vertex_element);

    let mut face_element = ElementDef::new("face".to_string());
    face_element.count = mesh.triangle_count();
    face_element.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    ply.header.elements.add(face_element);

    let vertices = mesh
        .vertices
        .iter()
        .zip(colors)
        .map(|(p, c)| {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Double(p.x));
            element.insert("y".to_string(), Property::Double(p.y));
            element.insert("z".to_string(), Property::Double(p.z));
            element.insert("red".to_string(), Property::UChar(c.r));
            element.insert("green".to_string(), Property::UChar(c.g));
            element.insert("blue".to_string(), Property::UChar(c.b));
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);

    let faces = mesh
        .triangles
        .iter()
        .map(|t| {
            let mut element = DefaultElement::new();
            element.insert(
                "vertex_indices".to_string(),
                Property::ListInt(vec![t[0] as i32, t[1] as i32, t[2] as i32]),
            );
            element
        })
        .collect();
    ply.payload.insert("face".to_string(), faces);

    Writer::new()
        .write_ply(&mut writer, &mut ply)
        .map_err(|e| VizError::missing(format!("cannot write {}: {}", path.display(), e)))?;

    Ok(())
}

fn scalar(element: &DefaultElement, name: &str) -> Option<f64> {
    match element.get(name)? {
        Property::Double(v) => Some(*v),
        Property::Float(v) => Some(*v as f64),
        Property::Int(v) => Some(*v as f64),
        Property::UInt(v) => Some(*v as f64),
        _ => None,
    }
}

fn channel(element: &DefaultElement, name: &str) -> Option<u8> {
    match element.get(name)? {
        Property::UChar(v) => Some(*v),
        Property::Char(v) => Some(*v as u8),
        _ => None,
    }
}

fn face_indices(element: &DefaultElement) -> Option<Vec<usize>> {
    match element.get("vertex_indices")? {
        Property::ListInt(v) => Some(v.iter().map(|&i| i as usize).collect()),
        Property::ListUInt(v) => Some(v.iter().map(|&i| i as usize).collect()),
        _ => None,
    }
}

/// Reads a PLY mesh; vertices without color come back gray.
///
/// A missing file is [`VizError::MissingResource`]; an unparsable one or a
/// face referencing a missing vertex is [`VizError::MalformedInput`].
pub fn load_ply_mesh(path: impl AsRef<Path>) -> Result<ColoredMesh> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| VizError::missing(format!("cannot open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);

    let ply = Parser::<DefaultElement>::new()
        .read_ply(&mut reader)
        .map_err(|e| VizError::malformed(format!("cannot parse {}: {}", path.display(), e)))?;

    let mut vertices = Vec::new();
    let mut colors = Vec::new();
    if let Some(elements) = ply.payload.get("vertex") {
        for element in elements {
            let (Some(x), Some(y), Some(z)) = (
                scalar(element, "x"),
                scalar(element, "y"),
                scalar(element, "z"),
            ) else {
                return Err(VizError::malformed(format!(
                    "{}: vertex without coordinates",
                    path.display()
                )));
            };
            vertices.push(Point3::new(x, y, z));

            let color = match (
                channel(element, "red"),
                channel(element, "green"),
                channel(element, "blue"),
            ) {
                (Some(r), Some(g), Some(b)) => Color::rgb(r, g, b),
                _ => Color::GRAY,
            };
            colors.push(color);
        }
    }

    let mut triangles = Vec::new();
    if let Some(elements) = ply.payload.get("face") {
        for element in elements {
            match face_indices(element) {
                Some(indices) if indices.len() >= 3 => {
                    // Polygons are fanned into triangles
                    for k in 1..indices.len() - 1 {
                        triangles.push([indices[0], indices[k], indices[k + 1]]);
                    }
                }
                _ => {}
            }
        }
    }

    let mesh = Mesh3d::new(vertices, triangles);
    mesh.validate()?;

    info!(
        "Loaded {} ({} vertices, {} triangles)",
        path.display(),
        mesh.vertex_count(),
        mesh.triangle_count()
    );
    Ok(ColoredMesh { mesh, colors })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vioviz_{}_{}", name, std::process::id()))
    }

    fn triangle() -> Mesh3d {
        Mesh3d::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.5),
            ],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn test_write_and_load() {
        let dir = temp_dir("ply_roundtrip");
        let mut logger = MeshLogger::new(&dir, false);
        let colors = vec![Color::RED, Color::GREEN, Color::BLUE];

        let path = logger.log_mesh(&triangle(), &colors, 42).unwrap();
        assert!(path.ends_with("mesh_42.ply"));
        assert_eq!(logger.meshes_written(), 1);

        let loaded = load_ply_mesh(&path).unwrap();
        assert_eq!(loaded.mesh.vertex_count(), 3);
        assert_eq!(loaded.mesh.triangles, vec![[0, 1, 2]]);
        assert_eq!(loaded.colors, colors);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_accumulated_mesh_grows() {
        let dir = temp_dir("ply_accumulated");
        let mut logger = MeshLogger::new(&dir, true);
        let colors = vec![Color::GRAY; 3];

        logger.log_mesh(&triangle(), &colors, 1).unwrap();
        logger.log_mesh(&triangle(), &colors, 2).unwrap();

        let accumulated = logger.accumulated().unwrap();
        assert_eq!(accumulated.mesh.vertex_count(), 6);
        assert_eq!(accumulated.mesh.triangles[1], [3, 4, 5]);

        let loaded = load_ply_mesh(dir.join(ACCUMULATED_MESH_FILE)).unwrap();
        assert_eq!(loaded.mesh.triangle_count(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_is_missing_resource() {
        let result = load_ply_mesh("/definitely/not/here.ply");
        assert!(matches!(result, Err(VizError::MissingResource(_))));
    }

    #[test]
    fn test_unwritable_dir_is_missing_resource() {
        let mut logger = MeshLogger::new("/proc/vioviz-not-writable", false);
        let result = logger.log_mesh(&triangle(), &[Color::GRAY; 3], 0);
        assert!(matches!(result, Err(VizError::MissingResource(_))));
    }

    #[test]
    fn test_color_mismatch_is_malformed() {
        let mut logger = MeshLogger::new(temp_dir("ply_mismatch"), false);
        let result = logger.log_mesh(&triangle(), &[Color::GRAY], 0);
        assert!(matches!(result, Err(VizError::MalformedInput(_))));
    }
}
