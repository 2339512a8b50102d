//! Rerun.io render backend
//!
//! Streams the scene to a Rerun viewer (or an `.rrd` file) instead of a
//! local widget window. Every widget lives at entity path `world/{id}`, so
//! the viewer's entity tree mirrors the registry identities.
//!
//! Enable with the `visualization` feature flag.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use nalgebra::Point3;
use rerun::{RecordingStream, RecordingStreamBuilder};
use tracing::info;
use vioviz_env::{
    BackendError, BackendSettings, Color, Pose, Primitive, RenderBackend, WidgetHandle, WidgetId,
};

fn p32(p: &Point3<f64>) -> [f32; 3] {
    [p.x as f32, p.y as f32, p.z as f32]
}

fn rgba(c: Color) -> rerun::Color {
    rerun::Color::from_rgb(c.r, c.g, c.b)
}

fn log_err(e: impl std::fmt::Display) -> BackendError {
    BackendError::capture(e)
}

/// Rerun-based render backend
pub struct RerunBackend {
    rec: RecordingStream,
    entities: BTreeMap<WidgetHandle, String>,
    next_handle: u64,
    frame: i64,
}

impl RerunBackend {
    /// Spawns a Rerun viewer, or buffers in memory when off-screen.
    pub fn connect(app_id: &str, settings: &BackendSettings) -> Result<Self, BackendError> {
        let rec = if settings.offscreen {
            RecordingStreamBuilder::new(app_id)
                .buffered()
                .map_err(|e| BackendError::unavailable(e.to_string()))?
        } else {
            settings.check()?;
            RecordingStreamBuilder::new(app_id)
                .spawn()
                .map_err(|e| BackendError::unavailable(e.to_string()))?
        };
        Self::with_stream(rec)
    }

    /// Creates a backend that saves to a file (for sharing)
    pub fn new_to_file(app_id: &str, path: &Path) -> Result<Self, BackendError> {
        let rec = RecordingStreamBuilder::new(app_id)
            .save(path)
            .map_err(|e| BackendError::unavailable(e.to_string()))?;
        Self::with_stream(rec)
    }

    fn with_stream(rec: RecordingStream) -> Result<Self, BackendError> {
        rec.log_static("world", &rerun::ViewCoordinates::RIGHT_HAND_Z_UP())
            .map_err(log_err)?;
        Ok(Self {
            rec,
            entities: BTreeMap::new(),
            next_handle: 0,
            frame: 0,
        })
    }

    fn entity(&self, handle: WidgetHandle) -> Result<&str, BackendError> {
        self.entities
            .get(&handle)
            .map(String::as_str)
            .ok_or(BackendError::UnknownHandle(handle))
    }

    fn log_pose(&self, path: &str, pose: &Pose) -> Result<(), BackendError> {
        let t = pose.translation();
        let q = pose.rotation();
        self.rec
            .log(
                path,
                &rerun::Transform3D::from_translation_rotation(
                    [t.x as f32, t.y as f32, t.z as f32],
                    rerun::Quaternion::from_xyzw([q.i as f32, q.j as f32, q.k as f32, q.w as f32]),
                ),
            )
            .map_err(log_err)
    }

    /// Logs the primitive's geometry and its pose at `path`.
    fn log_primitive(&self, path: &str, primitive: &Primitive, pose: &Pose) -> Result<(), BackendError> {
        self.log_pose(path, pose)?;

        let result = match primitive {
            Primitive::PointCloud { points, colors } => {
                let mut cloud = rerun::Points3D::new(points.iter().map(p32)).with_radii([0.02]);
                if let Some(colors) = colors {
                    cloud = cloud.with_colors(colors.iter().map(|c| rgba(*c)));
                }
                self.rec.log(path, &cloud)
            }
            Primitive::Mesh {
                vertices,
                triangles,
                colors,
                tcoords,
            } => {
                let mut mesh = rerun::Mesh3D::new(vertices.iter().map(p32))
                    .with_triangle_indices(
                        triangles
                            .iter()
                            .map(|t| [t[0] as u32, t[1] as u32, t[2] as u32]),
                    )
                    .with_vertex_colors(colors.iter().map(|c| rgba(*c)));
                if let Some(tcoords) = tcoords {
                    mesh = mesh.with_vertex_texcoords(tcoords.iter().copied());
                }
                self.rec.log(path, &mesh)
            }
            Primitive::Line { from, to, color } => self.rec.log(
                path,
                &rerun::LineStrips3D::new([[p32(from), p32(to)]]).with_colors([rgba(*color)]),
            ),
            Primitive::Polyline { points, color } => self.rec.log(
                path,
                &rerun::LineStrips3D::new([points.iter().map(p32).collect::<Vec<_>>()])
                    .with_colors([rgba(*color)]),
            ),
            Primitive::Frustum {
                intrinsics,
                scale,
                image,
                ..
            } => {
                self.rec
                    .log(
                        path,
                        &rerun::Pinhole::from_focal_length_and_resolution(
                            [intrinsics.fx as f32, intrinsics.fy as f32],
                            [intrinsics.width as f32, intrinsics.height as f32],
                        )
                        .with_image_plane_distance(*scale as f32),
                    )
                    .map_err(log_err)?;
                match image {
                    Some(image) => self.rec.log(
                        format!("{}/image", path),
                        &rerun::Image::from_l8(image.data.clone(), [image.width, image.height]),
                    ),
                    None => Ok(()),
                }
            }
            Primitive::Cylinder {
                from,
                to,
                radius,
                color,
                ..
            } => self.rec.log(
                path,
                &rerun::LineStrips3D::new([[p32(from), p32(to)]])
                    .with_radii([*radius as f32])
                    .with_colors([rgba(*color)]),
            ),
            Primitive::Plane {
                center,
                normal,
                size,
                color,
            } => {
                let outline = plane_outline(center, normal, *size);
                self.rec.log(
                    path,
                    &rerun::LineStrips3D::new([outline]).with_colors([rgba(*color)]),
                )
            }
            Primitive::Text {
                position,
                text,
                color,
            } => self.rec.log(
                path,
                &rerun::Points3D::new([p32(position)])
                    .with_labels([text.as_str()])
                    .with_colors([rgba(*color)]),
            ),
            Primitive::CoordinateFrame { scale } => {
                let s = *scale as f32;
                self.rec.log(
                    path,
                    &rerun::Arrows3D::from_vectors([[s, 0.0, 0.0], [0.0, s, 0.0], [0.0, 0.0, s]])
                        .with_colors([
                            rgba(Color::RED),
                            rgba(Color::GREEN),
                            rgba(Color::BLUE),
                        ]),
                )
            }
        };

        result.map_err(log_err)
    }
}

/// Closed square outline of a plane patch.
fn plane_outline(center: &Point3<f64>, normal: &nalgebra::Vector3<f64>, size: f64) -> Vec<[f32; 3]> {
    let n = normal.normalize();
    let helper = if n.x.abs() < 0.9 {
        nalgebra::Vector3::x()
    } else {
        nalgebra::Vector3::y()
    };
    let u = n.cross(&helper).normalize() * (size / 2.0);
    let v = n.cross(&u);
    let corners = [center + u + v, center - u + v, center - u - v, center + u - v, center + u + v];
    corners.iter().map(p32).collect()
}

impl RenderBackend for RerunBackend {
    fn name(&self) -> &str {
        "rerun"
    }

    fn create_primitive(
        &mut self,
        id: &WidgetId,
        primitive: &Primitive,
        pose: &Pose,
    ) -> Result<WidgetHandle, BackendError> {
        let path = format!("world/{}", id);
        self.log_primitive(&path, primitive, pose)?;

        let handle = WidgetHandle(self.next_handle);
        self.next_handle += 1;
        self.entities.insert(handle, path);
        Ok(handle)
    }

    fn update(
        &mut self,
        handle: WidgetHandle,
        primitive: &Primitive,
        pose: &Pose,
    ) -> Result<(), BackendError> {
        let path = self.entity(handle)?.to_string();
        self.log_primitive(&path, primitive, pose)
    }

    fn remove(&mut self, handle: WidgetHandle) -> Result<(), BackendError> {
        let path = self
            .entities
            .remove(&handle)
            .ok_or(BackendError::UnknownHandle(handle))?;
        self.rec
            .log(path.as_str(), &rerun::Clear::recursive())
            .map_err(log_err)
    }

    fn render_frame(&mut self, _timeout: Duration) -> Result<(), BackendError> {
        // The viewer renders on its own; only advance the timeline
        self.frame += 1;
        self.rec.set_time_sequence("frame", self.frame);
        Ok(())
    }

    fn capture_screenshot(&mut self, _path: &Path) -> Result<(), BackendError> {
        Err(BackendError::capture("screenshots are taken from the Rerun viewer"))
    }

    fn set_offscreen(&mut self, _offscreen: bool) -> Result<(), BackendError> {
        Ok(())
    }

    fn start_recording(&mut self, path: &Path) -> Result<(), BackendError> {
        self.rec.save(path).map_err(log_err)?;
        info!("Rerun recording saved to {}", path.display());
        Ok(())
    }
}
