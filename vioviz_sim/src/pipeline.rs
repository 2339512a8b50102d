//! Synthetic VIO pipeline.
//!
//! Stands in for the estimator: produces one [`VisualizerInput`] per frame
//! from a seeded RNG, so every run with the same seed yields the same frames.
//!
//! - The camera moves on a circle, facing along the tangent
//! - A grid mesh under the camera carries two overlapping clusters
//! - One to three planes whose inlier sets slide over the landmark ids
//! - Landmarks jitter with Gaussian noise around fixed ground truth

use std::f64::consts::PI;

use nalgebra::{Point2, Point3, UnitQuaternion, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use vioviz_core::{
    Landmark, LandmarkType, Mesh2d, Mesh3d, PlaneReport, PointCloud, TriangleCluster,
    VisualizerInput,
};
use vioviz_env::{Image, Pose};

/// Parameters of the synthetic pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Vertices per side of the grid mesh (default: 8)
    pub grid_size: usize,

    /// Number of landmarks (default: 40)
    pub num_landmarks: usize,

    /// Radius of the circular trajectory in meters (default: 5.0)
    pub radius: f64,

    /// Frames per full circle (default: 120)
    pub frames_per_loop: u64,

    /// Landmark noise standard deviation in meters (default: 0.02)
    pub landmark_noise_std: f64,

    /// Time between frames in nanoseconds (default: 50ms)
    pub frame_period_ns: u64,

    /// Image size handed to the visualizer (default: 188x120)
    pub image_size: (u32, u32),

    /// Points in the dense cloud (default: 64)
    pub cloud_points: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid_size: 8,
            num_landmarks: 40,
            radius: 5.0,
            frames_per_loop: 120,
            landmark_noise_std: 0.02,
            frame_period_ns: 50_000_000,
            image_size: (188, 120),
            cloud_points: 64,
        }
    }
}

/// Deterministic frame generator.
pub struct SyntheticPipeline {
    config: PipelineConfig,
    rng: ChaCha8Rng,
    noise: Option<Normal<f64>>,
    landmarks: Vec<Point3<f64>>,
    frame: u64,
}

impl SyntheticPipeline {
    /// Creates a pipeline with default parameters.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, PipelineConfig::default())
    }

    pub fn with_config(seed: u64, config: PipelineConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let landmarks = (0..config.num_landmarks)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-config.radius * 1.5..config.radius * 1.5),
                    rng.gen_range(-config.radius * 1.5..config.radius * 1.5),
                    rng.gen_range(0.0..3.0),
                )
            })
            .collect();
        let noise = Normal::new(0.0, config.landmark_noise_std).ok();

        Self {
            config,
            rng,
            noise,
            landmarks,
            frame: 0,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Number of frames produced so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Ground-truth pose of frame `k`.
    pub fn pose_at(&self, k: u64) -> Pose {
        let angle = 2.0 * PI * (k % self.config.frames_per_loop) as f64
            / self.config.frames_per_loop as f64;
        let translation = Vector3::new(
            self.config.radius * angle.cos(),
            self.config.radius * angle.sin(),
            1.5,
        );
        let rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, angle + PI / 2.0);
        Pose::from_translation_rotation(translation, rotation)
    }

    /// Produces the next frame.
    pub fn next_frame(&mut self) -> VisualizerInput {
        let k = self.frame;
        self.frame += 1;

        let pose = self.pose_at(k);
        let mut input = VisualizerInput::new((k + 1) * self.config.frame_period_ns, pose);

        let (w, h) = self.config.image_size;
        input.image = Some(Image::filled(w, h, (k % 256) as u8));

        let (mesh_3d, mesh_2d) = self.grid_meshes(&pose);
        input.clusters = self.clusters(k, &mesh_3d);
        input.mesh_3d = Some(mesh_3d);
        input.mesh_2d = Some(mesh_2d);

        input.landmarks = self.noisy_landmarks();
        input.planes = self.planes(k);
        input.point_cloud = Some(self.cloud(&pose));

        input
    }

    /// Grid under the camera and its image-space twin.
    fn grid_meshes(&self, pose: &Pose) -> (Mesh3d, Mesh2d) {
        let n = self.config.grid_size.max(2);
        let (w, h) = self.config.image_size;
        let center = pose.translation();

        let mut vertices = Vec::with_capacity(n * n);
        let mut pixels = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                let u = j as f64 / (n - 1) as f64;
                let v = i as f64 / (n - 1) as f64;
                vertices.push(Point3::new(center.x + u * 2.0 - 1.0, center.y + v * 2.0 - 1.0, 0.0));
                pixels.push(Point2::new(u * w as f64, v * h as f64));
            }
        }

        let mut triangles = Vec::with_capacity(2 * (n - 1) * (n - 1));
        for i in 0..n - 1 {
            for j in 0..n - 1 {
                let a = i * n + j;
                let b = a + 1;
                let c = a + n;
                let d = c + 1;
                triangles.push([a, b, d]);
                triangles.push([a, d, c]);
            }
        }

        (
            Mesh3d::new(vertices, triangles.clone()),
            Mesh2d::new(pixels, triangles),
        )
    }

    /// Two clusters overlapping on the middle rows; labels rotate slowly.
    fn clusters(&self, k: u64, mesh: &Mesh3d) -> Vec<TriangleCluster> {
        let n = mesh.vertex_count();
        let label = ((k / 20) % 4) as u32;
        vec![
            TriangleCluster::labeled(label, 0..n * 2 / 3).with_normal(Vector3::z()),
            TriangleCluster::labeled(label + 4, n / 3..n).with_normal(Vector3::z()),
        ]
    }

    fn noisy_landmarks(&mut self) -> Vec<Landmark> {
        let noise = self.noise;
        let rng = &mut self.rng;
        let mut sample = move || noise.map_or(0.0, |n| n.sample(rng));

        self.landmarks
            .iter()
            .enumerate()
            .map(|(id, p)| {
                let offset = Vector3::new(sample(), sample(), sample());
                let kind = if id % 3 == 0 {
                    LandmarkType::Projection
                } else {
                    LandmarkType::Smart
                };
                Landmark::new(id as u64, p + offset, kind)
            })
            .collect()
    }

    /// Planes reported at frame `k`, with sliding inlier windows.
    pub fn planes(&self, k: u64) -> Vec<PlaneReport> {
        let count = self.config.num_landmarks as u64;
        if count == 0 {
            return Vec::new();
        }
        let active = 1 + (k / 15) % 3;
        let normals = [Vector3::z(), Vector3::x(), Vector3::y()];

        (0..active)
            .map(|p| {
                let start = p * 10 + k / 2;
                let inliers = (start..start + 5).map(|id| id % count);
                PlaneReport::new(p, normals[p as usize], p as f64, inliers).with_label(p as u32)
            })
            .collect()
    }

    fn cloud(&mut self, pose: &Pose) -> PointCloud {
        let center = pose.position();
        let points = (0..self.config.cloud_points)
            .map(|_| {
                Point3::new(
                    center.x + self.rng.gen_range(-2.0..2.0),
                    center.y + self.rng.gen_range(-2.0..2.0),
                    self.rng.gen_range(0.0..2.0),
                )
            })
            .collect();
        PointCloud {
            points,
            colors: None,
        }
    }
}

impl Iterator for SyntheticPipeline {
    type Item = VisualizerInput;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_frame())
    }
}
