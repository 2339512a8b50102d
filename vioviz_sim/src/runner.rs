//! Scenario runner - executes scenarios and checks the engine invariants.

use std::collections::BTreeSet;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vioviz_core::plane_lines::{line_id, plane_label_id, plane_normal_id, plane_widget_id};
use vioviz_core::trajectory::{frustum_id, TRAJECTORY_ID};
use vioviz_core::{
    BackendType, FrameAssembler, Landmark, LandmarkType, Mesh3d, PlaneReport, SceneState,
    TriangleCluster, VisualizationType, VisualizerConfig, VisualizerInput, VisualizerOutput,
};
use vioviz_env::{Color, Pose, Primitive, RenderCommand};

use crate::pipeline::SyntheticPipeline;
use crate::scenarios::ScenarioId;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Frames assembled
    pub frames: u64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Total render commands emitted
    pub commands: u64,
    pub adds: u64,
    pub updates: u64,
    pub removes: u64,

    /// Per-step errors reported
    pub errors: u64,

    /// Largest live widget count after any frame
    pub peak_widgets: usize,

    /// Largest live frustum count after any frame
    pub peak_frustums: usize,
}

impl ScenarioMetrics {
    fn record(&mut self, state: &SceneState, output: &VisualizerOutput) {
        let (adds, updates, removes) = output.command_counts();
        self.adds += adds as u64;
        self.updates += updates as u64;
        self.removes += removes as u64;
        self.commands += output.commands.len() as u64;
        self.errors += output.errors.len() as u64;
        self.peak_widgets = self.peak_widgets.max(state.registry.len());
        self.peak_frustums = self
            .peak_frustums
            .max(state.registry.ids_with_prefix("frustum/").len());
    }
}

/// Outcome of a scenario body: `Err` carries the failed assertion.
type Check = Result<(), String>;

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Check {
    if condition {
        Ok(())
    } else {
        Err(message())
    }
}

/// One running scenario: assembler, scene state and bookkeeping.
struct Session<'a> {
    assembler: FrameAssembler,
    state: SceneState,
    metrics: ScenarioMetrics,
    observer: &'a mut dyn FnMut(&SceneState, &VisualizerOutput),
}

impl Session<'_> {
    fn step(&mut self, input: &VisualizerInput) -> VisualizerOutput {
        let output = self.assembler.assemble(&mut self.state, input);
        self.metrics.record(&self.state, &output);
        (self.observer)(&self.state, &output);
        output
    }
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Frames for synthetic scenarios
    frames: u64,

    /// Visualizer configuration for synthetic scenarios
    config: VisualizerConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            frames: 200,
            config: VisualizerConfig::default()
                .with_backend_type(BackendType::StructuralRegularities),
        }
    }

    /// Sets the number of frames for synthetic scenarios.
    pub fn with_frames(mut self, frames: u64) -> Self {
        self.frames = frames;
        self
    }

    /// Sets the visualizer configuration for synthetic scenarios.
    pub fn with_config(mut self, config: VisualizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_observed(scenario, &mut |_, _| {})
    }

    /// Runs a scenario, handing every assembled frame to `observer`.
    pub fn run_observed(
        &self,
        scenario: ScenarioId,
        observer: &mut dyn FnMut(&SceneState, &VisualizerOutput),
    ) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let config = match scenario {
            ScenarioId::FrustumWindow | ScenarioId::ClusterOverlap => {
                VisualizerConfig::default().with_frustum_window(10)
            }
            ScenarioId::PlaneChurn | ScenarioId::PlaneRetire => VisualizerConfig::default()
                .with_backend_type(BackendType::StructuralRegularities),
            ScenarioId::IdempotentReconcile | ScenarioId::LongRun => self.config.clone(),
        };

        let assembler = match FrameAssembler::new(config.clone()) {
            Ok(assembler) => assembler,
            Err(e) => return self.result(scenario, 0, Err(e.to_string()), ScenarioMetrics::default()),
        };
        let mut session = Session {
            assembler,
            state: SceneState::new(&config),
            metrics: ScenarioMetrics::default(),
            observer,
        };

        let check = match scenario {
            ScenarioId::FrustumWindow => self.run_frustum_window(&mut session),
            ScenarioId::PlaneChurn => self.run_plane_churn(&mut session),
            ScenarioId::ClusterOverlap => self.run_cluster_overlap(&mut session),
            ScenarioId::IdempotentReconcile => self.run_idempotent_reconcile(&mut session),
            ScenarioId::PlaneRetire => self.run_plane_retire(&mut session),
            ScenarioId::LongRun => self.run_long_run(&mut session),
        };

        let frames = session.state.frame();
        self.result(scenario, frames, check, session.metrics)
    }

    fn result(
        &self,
        scenario: ScenarioId,
        frames: u64,
        check: Check,
        metrics: ScenarioMetrics,
    ) -> ScenarioResult {
        if let Err(reason) = &check {
            warn!("{} failed: {}", scenario.name(), reason);
        }
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: check.is_ok(),
            frames,
            failure_reason: check.err(),
            metrics,
        }
    }

    /// P1..P15 with N=10: frustums for P6..P15 only, trajectory over all.
    fn run_frustum_window(&self, session: &mut Session) -> Check {
        let pose = |i: u64| Pose::from_translation(i as f64, 0.0, 0.0);
        for i in 1..=15u64 {
            session.step(&VisualizerInput::new(i, pose(i)));
        }

        let registry = &session.state.registry;
        let frustums = registry.ids_with_prefix("frustum/");
        ensure(frustums.len() == 10, || {
            format!("expected 10 frustums, found {}", frustums.len())
        })?;

        for i in 0..10u64 {
            let entry = registry
                .get(&frustum_id(i as usize))
                .ok_or_else(|| format!("frustum/{} missing", i))?;
            ensure(entry.pose == pose(i + 6), || {
                format!("frustum/{} should show P{}", i, i + 6)
            })?;
        }

        match registry.get_str(TRAJECTORY_ID).map(|e| &e.primitive) {
            Some(Primitive::Polyline { points, .. }) => ensure(points.len() == 15, || {
                format!("trajectory spans {} poses, expected 15", points.len())
            }),
            _ => Err("trajectory polyline missing".to_string()),
        }
    }

    /// Plane 7 with {3,4,5} then {4,5,6}.
    fn run_plane_churn(&self, session: &mut Session) -> Check {
        let landmarks = numbered_landmarks(10);
        let frame = |t: u64, inliers: [u64; 3]| {
            let mut input = VisualizerInput::new(t, Pose::identity());
            input.landmarks = landmarks.clone();
            input.planes = vec![PlaneReport::new(7, Vector3::z(), 1.0, inliers)];
            input
        };

        session.step(&frame(1, [3, 4, 5]));
        let output = session.step(&frame(2, [4, 5, 6]));

        let touches = |lmk: u64| {
            let id = line_id(7, lmk);
            output.commands.iter().filter(|c| *c.id() == id).collect::<Vec<_>>()
        };

        ensure(matches!(touches(3).as_slice(), [RenderCommand::Remove { .. }]), || {
            "line (7,3) should be removed exactly once".to_string()
        })?;
        ensure(touches(4).is_empty() && touches(5).is_empty(), || {
            "lines (7,4) and (7,5) should be untouched".to_string()
        })?;
        ensure(matches!(touches(6).as_slice(), [RenderCommand::Add { .. }]), || {
            "line (7,6) should be added exactly once".to_string()
        })?;

        let owned: Vec<u64> = session
            .state
            .tracker
            .owned_lines(7)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        ensure(owned == vec![4, 5, 6], || format!("plane 7 owns {:?}", owned))
    }

    /// 100 vertices, A=[0,50) then B=[40,60).
    fn run_cluster_overlap(&self, session: &mut Session) -> Check {
        let mesh = Mesh3d::new(
            (0..100).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect(),
            (0..98).map(|i| [i, i + 1, i + 2]).collect(),
        );
        let mut input = VisualizerInput::new(1, Pose::identity());
        input.mesh_3d = Some(mesh);
        input.clusters = vec![
            TriangleCluster::labeled(1, 0..50),
            TriangleCluster::labeled(2, 40..60),
        ];

        let first = session.step(&input);
        ensure(first.errors.is_empty(), || format!("errors: {:?}", first.errors))?;
        let colors = mesh_colors(&session.state)?;

        let colorizer = vioviz_core::MeshColorizer::default();
        let (a, b) = (colorizer.label_color(Some(1)), colorizer.label_color(Some(2)));
        ensure(colors[..40].iter().all(|c| *c == a), || "[0,40) should use A".to_string())?;
        ensure(colors[40..60].iter().all(|c| *c == b), || "[40,60) should use B".to_string())?;
        ensure(colors[60..].iter().all(|c| *c == Color::GRAY), || {
            "[60,100) should be unclustered".to_string()
        })?;

        // Same input again: byte-identical colors
        input.timestamp = 2;
        session.step(&input);
        ensure(mesh_colors(&session.state)? == colors, || {
            "colorize is not deterministic".to_string()
        })
    }

    /// Every synthetic frame is assembled twice; the repeat must not touch planes.
    fn run_idempotent_reconcile(&self, session: &mut Session) -> Check {
        let mut pipeline = SyntheticPipeline::new(self.seed);
        let draws_planes = session.assembler.config().backend_type.draws_planes();

        for _ in 0..self.frames.min(60) {
            let mut input = pipeline.next_frame();
            session.step(&input);

            input.timestamp += 1;
            let repeat = session.step(&input);
            let plane_commands = repeat
                .commands
                .iter()
                .filter(|c| c.id().as_str().starts_with("plane/"))
                .count();
            ensure(plane_commands == 0, || {
                format!("frame {}: {} plane commands on repeat", repeat.frame, plane_commands)
            })?;

            if draws_planes {
                check_plane_lines(&session.state, &input)?;
            }
        }
        Ok(())
    }

    /// Planes 1 and 2 live, then plane 2 disappears, then both.
    fn run_plane_retire(&self, session: &mut Session) -> Check {
        let landmarks = numbered_landmarks(10);
        let frame = |t: u64, planes: Vec<PlaneReport>| {
            let mut input = VisualizerInput::new(t, Pose::identity());
            input.landmarks = landmarks.clone();
            input.planes = planes;
            input
        };
        let p1 = PlaneReport::new(1, Vector3::x(), 1.0, [0, 1]);
        let p2 = PlaneReport::new(2, Vector3::y(), 2.0, [2, 3, 4]);

        session.step(&frame(1, vec![p1.clone(), p2]));
        let output = session.step(&frame(2, vec![p1]));

        let (_, _, removes) = output.command_counts();
        // 3 lines, patch, normal and label
        ensure(removes == 6, || format!("expected 6 removes, got {}", removes))?;

        let registry = &session.state.registry;
        ensure(!registry.contains(&plane_widget_id(2)), || "plane/2 still shown".to_string())?;
        ensure(!registry.contains(&plane_label_id(2)), || "plane/2 label still shown".to_string())?;
        ensure(!registry.contains(&plane_normal_id(2)), || "plane/2 normal still shown".to_string())?;
        ensure(registry.contains(&line_id(1, 0)), || "plane 1 lost its lines".to_string())?;

        session.step(&frame(3, vec![]));
        ensure(session.state.registry.ids_with_prefix("plane/").is_empty(), || {
            "plane widgets leaked after all planes retired".to_string()
        })?;
        ensure(session.state.tracker.active_planes().is_empty(), || {
            "tracker still has active planes".to_string()
        })
    }

    /// Synthetic run with the runner's configuration.
    fn run_long_run(&self, session: &mut Session) -> Check {
        let mut pipeline = SyntheticPipeline::new(self.seed);
        let config = session.assembler.config().clone();

        for k in 1..=self.frames {
            let input = pipeline.next_frame();
            let output = session.step(&input);

            ensure(output.errors.is_empty(), || {
                format!("frame {}: unexpected errors {:?}", k, output.errors)
            })?;
            check_no_duplicate_adds(&output)?;

            let registry = &session.state.registry;
            if config.mode == VisualizationType::None {
                ensure(registry.is_empty(), || "mode none must not draw".to_string())?;
                continue;
            }

            let frustums = registry.ids_with_prefix("frustum/").len();
            ensure(frustums == (k as usize).min(config.frustum_window), || {
                format!("frame {}: {} frustums for window {}", k, frustums, config.frustum_window)
            })?;

            match registry.get_str(TRAJECTORY_ID).map(|e| &e.primitive) {
                Some(Primitive::Polyline { points, .. }) => ensure(points.len() as u64 == k, || {
                    format!("frame {}: trajectory has {} points", k, points.len())
                })?,
                _ => return Err(format!("frame {}: trajectory missing", k)),
            }

            if config.backend_type.draws_planes() {
                check_plane_lines(&session.state, &input)?;
            }

            if k % 50 == 0 {
                debug!(
                    "  frame={} | widgets={} | planes={} | lines={}",
                    k,
                    registry.len(),
                    session.state.tracker.active_planes().len(),
                    session.state.tracker.line_count()
                );
            }
        }
        Ok(())
    }
}

fn numbered_landmarks(n: u64) -> Vec<Landmark> {
    (0..n)
        .map(|id| Landmark::new(id, Point3::new(id as f64, 1.0, 2.0), LandmarkType::Smart))
        .collect()
}

fn mesh_colors(state: &SceneState) -> Result<Vec<Color>, String> {
    match state.registry.get_str(vioviz_core::assembler::MESH_ID).map(|e| &e.primitive) {
        Some(Primitive::Mesh { colors, .. }) => Ok(colors.clone()),
        _ => Err("mesh widget missing".to_string()),
    }
}

/// Owned lines equal the reported inliers, and the registry agrees.
fn check_plane_lines(state: &SceneState, input: &VisualizerInput) -> Check {
    let reported: BTreeSet<u64> = input.planes.iter().map(|p| p.id).collect();
    let active: BTreeSet<u64> = state.tracker.active_planes().into_iter().collect();
    ensure(active.is_subset(&reported), || {
        format!("active planes {:?} not all reported ({:?})", active, reported)
    })?;

    for report in &input.planes {
        let Some(owned) = state.tracker.owned_lines(report.id) else {
            continue;
        };
        ensure(*owned == report.inliers, || {
            format!("plane {} owns {:?}, inliers {:?}", report.id, owned, report.inliers)
        })?;
        let live = state
            .registry
            .ids_with_prefix(&format!("plane/{}/line/", report.id))
            .len();
        ensure(live == owned.len(), || {
            format!("plane {}: {} line widgets for {} owned lines", report.id, live, owned.len())
        })?;
    }
    Ok(())
}

/// No identity is added twice within one frame.
fn check_no_duplicate_adds(output: &VisualizerOutput) -> Check {
    let mut seen = BTreeSet::new();
    for command in output.commands.iter().filter(|c| c.is_add()) {
        ensure(seen.insert(command.id().clone()), || {
            format!("frame {}: '{}' added twice", output.frame, command.id())
        })?;
    }
    Ok(())
}
