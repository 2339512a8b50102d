//! JSON exporter for scenario runs.
//!
//! Exports one record per assembled frame: the live widgets after the frame
//! and what the frame changed.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use vioviz_core::{SceneState, VisualizerOutput};
use vioviz_env::PrimitiveKind;

use crate::runner::ScenarioMetrics;

/// A live widget after a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetRecord {
    pub id: String,
    pub kind: PrimitiveKind,
    pub points: usize,
    pub position: [f64; 3],
}

/// A single assembled frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneFrame {
    pub frame: u64,
    pub timestamp: u64,
    pub adds: usize,
    pub updates: usize,
    pub removes: usize,

    /// Live widgets after the frame, sorted by identity
    pub widgets: Vec<WidgetRecord>,

    /// Per-step errors
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl SceneFrame {
    /// Captures the registry state after `output` was assembled.
    pub fn capture(state: &SceneState, output: &VisualizerOutput) -> Self {
        let (adds, updates, removes) = output.command_counts();
        let widgets = state
            .registry
            .ids()
            .filter_map(|id| state.registry.get(id))
            .map(|entry| {
                let t = entry.pose.translation();
                WidgetRecord {
                    id: entry.id.to_string(),
                    kind: entry.kind(),
                    points: entry.primitive.point_count(),
                    position: [t.x, t.y, t.z],
                }
            })
            .collect();

        Self {
            frame: output.frame,
            timestamp: output.timestamp,
            adds,
            updates,
            removes,
            widgets,
            errors: output.errors.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Complete run export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// All frames
    pub frames: Vec<SceneFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ScenarioMetrics>,
}

impl SceneExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
            metrics: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SceneFrame) {
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>, metrics: ScenarioMetrics) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.metrics = Some(metrics);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
