//! vioviz Scenario Harness
//!
//! Drives the scene engine with deterministic input and checks its
//! invariants after every frame:
//! - **Pipeline**: a seeded synthetic VIO pipeline standing in for the
//!   estimator (poses, meshes, clusters, planes, landmarks)
//! - **Scenarios**: named runs with known expected widget churn
//! - **Exporter**: per-frame JSON snapshots of the live scene
//!
//! # Usage
//!
//! ```
//! use vioviz_sim::ScenarioRunner;
//! use vioviz_sim::scenarios::ScenarioId;
//!
//! let runner = ScenarioRunner::new(42).with_frames(20);
//! let result = runner.run(ScenarioId::PlaneChurn);
//! assert!(result.passed);
//! ```

mod exporter;
mod pipeline;
mod runner;
pub mod scenarios;

pub use exporter::{SceneExport, SceneFrame, WidgetRecord};
pub use pipeline::{PipelineConfig, SyntheticPipeline};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
