//! vioviz scenario CLI
//!
//! Runs the named scenarios against the scene engine, optionally rendering
//! every frame through a backend on the render thread.

use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;
use vioviz_core::{
    BackendType, RenderThread, SceneState, VisualizationType, VisualizerConfig, VisualizerOutput,
};
use vioviz_env::{BackendSettings, RenderBackend};
use vioviz_sim::scenarios::ScenarioId;
use vioviz_sim::{SceneExport, SceneFrame, ScenarioResult, ScenarioRunner};

/// vioviz scene engine scenario CLI
#[derive(Parser, Debug)]
#[command(name = "vioviz-sim")]
#[command(about = "Run deterministic scene-maintenance scenarios", long_about = None)]
struct Args {
    /// Seed for the synthetic pipeline
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (frustum_window, plane_churn, cluster_overlap, idempotent_reconcile, plane_retire, long_run, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Frames for synthetic scenarios
    #[arg(short, long, default_value = "200")]
    frames: u64,

    /// Visualizer configuration (JSON); flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of camera frustums kept on screen
    #[arg(short, long)]
    window: Option<usize>,

    /// Visualization mode (mesh2d, mesh3d, pointcloud, none)
    #[arg(short, long)]
    mode: Option<VisualizationType>,

    /// Estimator backend (stereo_imu, structural_regularities)
    #[arg(short, long)]
    backend_type: Option<BackendType>,

    /// Render off-screen (no display needed)
    #[arg(long)]
    offscreen: bool,

    /// Directory for meshes, screenshots and recordings
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Apply every frame to a render backend on the render thread
    #[arg(long)]
    render: bool,

    /// Export per-frame scene snapshots to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

impl Args {
    fn visualizer_config(&self) -> vioviz_core::Result<VisualizerConfig> {
        let mut config = match &self.config {
            Some(path) => VisualizerConfig::from_json_file(path)?,
            None => VisualizerConfig::default()
                .with_backend_type(BackendType::StructuralRegularities),
        };
        if let Some(window) = self.window {
            config = config.with_frustum_window(window);
        }
        if let Some(mode) = self.mode {
            config = config.with_mode(mode);
        }
        if let Some(backend_type) = self.backend_type {
            config = config.with_backend_type(backend_type);
        }
        if self.offscreen {
            config = config.with_offscreen(true);
        }
        if let Some(dir) = &self.output_dir {
            config = config.with_output_dir(dir);
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "visualization")]
const RECORDING_FILE: &str = "recording.rrd";

#[cfg(not(feature = "visualization"))]
const RECORDING_FILE: &str = "recording.jsonl";

#[cfg(feature = "visualization")]
fn connect_backend(config: &VisualizerConfig) -> vioviz_core::Result<Box<dyn RenderBackend>> {
    let settings = BackendSettings::from_env(config.offscreen);
    let backend = vioviz_core::RerunBackend::connect("vioviz", &settings)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "visualization"))]
fn connect_backend(config: &VisualizerConfig) -> vioviz_core::Result<Box<dyn RenderBackend>> {
    let settings = BackendSettings::from_env(config.offscreen);
    let backend = vioviz_env::HeadlessBackend::connect(settings)?;
    Ok(Box::new(backend))
}

/// Runs one scenario, feeding the render thread and the export as frames arrive.
fn run_scenario(
    runner: &ScenarioRunner,
    scenario: ScenarioId,
    render: Option<&RenderThread>,
    export: Option<&Path>,
) -> ScenarioResult {
    let mut scene_export = export.map(|_| SceneExport::new(scenario.name(), runner.seed()));
    let mut render_failed = false;

    let mut observer = |state: &SceneState, output: &VisualizerOutput| {
        if let Some(scene_export) = scene_export.as_mut() {
            scene_export.add_frame(SceneFrame::capture(state, output));
        }
        if let Some(render) = render {
            if !render_failed {
                if let Err(e) = render.submit(output.clone()) {
                    error!("{}", e);
                    render_failed = true;
                }
            }
        }
    };
    let mut result = runner.run_observed(scenario, &mut observer);

    if render_failed && result.passed {
        result.passed = false;
        result.failure_reason = Some("render thread stopped".to_string());
    }

    if let (Some(mut scene_export), Some(path)) = (scene_export, export) {
        scene_export.finalize(result.passed, result.failure_reason.clone(), result.metrics.clone());
        match scene_export.write_to_file(path) {
            Ok(()) => info!("Exported {} frames to {}", scene_export.frames.len(), path.display()),
            Err(e) => error!("Failed to write export: {:?}", e),
        }
    }

    result
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("vioviz scenario harness v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                let names: Vec<_> = ScenarioId::all().iter().map(|s| s.name()).collect();
                eprintln!("Available scenarios: {}, all", names.join(", "));
                std::process::exit(1);
            }
        }
    };

    if args.export.is_some() && scenarios.len() > 1 {
        eprintln!("Error: --export only supports a single scenario, not 'all'");
        std::process::exit(1);
    }

    let config = match args.visualizer_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    debug!("Configuration: {:?}", config);

    let render = if args.render {
        let thread = connect_backend(&config)
            .and_then(|backend| RenderThread::spawn(backend, config.render_timeout()));
        match thread {
            Ok(thread) => {
                let recording = config.output_dir.join(RECORDING_FILE);
                if let Err(e) = thread.start_recording(&recording) {
                    error!("{}", e);
                }
                Some(thread)
            }
            Err(e) => {
                error!("Cannot start renderer: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let runner = ScenarioRunner::new(args.seed)
        .with_frames(args.frames)
        .with_config(config.clone());

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for scenario in &scenarios {
        let result = run_scenario(&runner, *scenario, render.as_ref(), args.export.as_deref());

        if !args.json {
            if result.passed {
                info!("✓ {} (seed={}) PASSED", scenario.name(), args.seed);
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    args.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
        all_results.push(result);
    }

    if let Some(render) = render {
        let screenshot = config.output_dir.join("final.json");
        if let Err(e) = render.screenshot(&screenshot) {
            error!("{}", e);
        }
        match render.join() {
            Ok(stats) => info!(
                "Rendered {} frames ({} commands, {} failed)",
                stats.frames_rendered, stats.commands_applied, stats.commands_failed
            ),
            Err(e) => error!("{}", e),
        }
    }

    // Summary
    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "frames": r.frames,
                    "metrics": r.metrics,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
