//! Render thread handoff.
//!
//! The widget library behind a [`RenderBackend`] must only be driven from one
//! thread. [`RenderThread`] owns the backend on a dedicated OS thread and
//! receives work over a FIFO channel, so frames are applied in exactly the
//! order they were produced.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vioviz_env::{RenderBackend, RenderCommand, WidgetHandle, WidgetId};

use crate::assembler::VisualizerOutput;
use crate::error::{Result, VizError};

/// Default depth of the handoff queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Work item for the render thread.
#[derive(Debug)]
pub enum DisplayRequest {
    /// Apply a frame delta and render
    Output(Box<VisualizerOutput>),
    /// Save the current view
    Screenshot(PathBuf),
    /// Record every subsequent frame
    StartRecording(PathBuf),
    /// Stop after draining earlier requests
    Shutdown,
}

/// Counters reported when the render thread stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStats {
    pub frames_rendered: u64,
    pub commands_applied: u64,
    pub commands_failed: u64,
    pub screenshots: u64,
}

/// Identity-to-handle map kept by whoever drives a backend.
pub type HandleMap = BTreeMap<WidgetId, WidgetHandle>;

fn apply_command<B: RenderBackend + ?Sized>(
    backend: &mut B,
    handles: &mut HandleMap,
    command: &RenderCommand,
) -> std::result::Result<(), vioviz_env::BackendError> {
    match command {
        RenderCommand::Add { id, primitive, pose } | RenderCommand::Update { id, primitive, pose } => {
            match handles.get(id) {
                Some(&handle) => backend.update(handle, primitive, pose),
                None => {
                    let handle = backend.create_primitive(id, primitive, pose)?;
                    handles.insert(id.clone(), handle);
                    Ok(())
                }
            }
        }
        RenderCommand::Remove { id } => match handles.remove(id) {
            Some(handle) => backend.remove(handle),
            None => Ok(()),
        },
    }
}

/// Applies one frame delta to `backend` and renders it.
///
/// Individual command failures are logged and counted; they never stop the
/// remaining commands.
pub fn apply_output<B: RenderBackend + ?Sized>(
    backend: &mut B,
    handles: &mut HandleMap,
    output: &VisualizerOutput,
    timeout: Duration,
    stats: &mut RenderStats,
) {
    for command in &output.commands {
        match apply_command(backend, handles, command) {
            Ok(()) => stats.commands_applied += 1,
            Err(e) => {
                stats.commands_failed += 1;
                warn!("{}: command on '{}' failed: {}", backend.name(), command.id(), e);
            }
        }
    }

    match backend.render_frame(timeout) {
        Ok(()) => stats.frames_rendered += 1,
        Err(e) => warn!("{}: render of frame {} failed: {}", backend.name(), output.frame, e),
    }
}

/// Dedicated thread owning a render backend.
pub struct RenderThread {
    sender: mpsc::Sender<DisplayRequest>,
    handle: Option<JoinHandle<RenderStats>>,
}

impl RenderThread {
    /// Moves `backend` onto a new thread.
    pub fn spawn(backend: Box<dyn RenderBackend>, timeout: Duration) -> Result<Self> {
        Self::spawn_with_depth(backend, timeout, DEFAULT_QUEUE_DEPTH)
    }

    pub fn spawn_with_depth(
        mut backend: Box<dyn RenderBackend>,
        timeout: Duration,
        depth: usize,
    ) -> Result<Self> {
        let (sender, mut receiver) = mpsc::channel::<DisplayRequest>(depth.max(1));

        let handle = std::thread::Builder::new()
            .name("vioviz-render".to_string())
            .spawn(move || {
                let mut handles = HandleMap::new();
                let mut stats = RenderStats::default();
                info!("Render thread started ({})", backend.name());

                while let Some(request) = receiver.blocking_recv() {
                    match request {
                        DisplayRequest::Output(output) => {
                            apply_output(backend.as_mut(), &mut handles, &output, timeout, &mut stats);
                        }
                        DisplayRequest::Screenshot(path) => match backend.capture_screenshot(&path) {
                            Ok(()) => {
                                stats.screenshots += 1;
                                debug!("Screenshot saved to {}", path.display());
                            }
                            Err(e) => warn!("Screenshot to {} failed: {}", path.display(), e),
                        },
                        DisplayRequest::StartRecording(path) => {
                            if let Err(e) = backend.start_recording(&path) {
                                warn!("Recording to {} failed: {}", path.display(), e);
                            }
                        }
                        DisplayRequest::Shutdown => break,
                    }
                }

                info!(
                    "Render thread stopped: {} frames, {} commands ({} failed)",
                    stats.frames_rendered, stats.commands_applied, stats.commands_failed
                );
                stats
            })
            .map_err(|e| VizError::RenderThread(format!("cannot spawn render thread: {}", e)))?;

        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    fn send(&self, request: DisplayRequest) -> Result<()> {
        self.sender
            .blocking_send(request)
            .map_err(|_| VizError::RenderThread("render thread is gone".to_string()))
    }

    /// Queues a frame delta; blocks while the queue is full.
    pub fn submit(&self, output: VisualizerOutput) -> Result<()> {
        self.send(DisplayRequest::Output(Box::new(output)))
    }

    pub fn screenshot(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.send(DisplayRequest::Screenshot(path.into()))
    }

    pub fn start_recording(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.send(DisplayRequest::StartRecording(path.into()))
    }

    /// Drains queued requests, stops the thread and returns its counters.
    pub fn join(mut self) -> Result<RenderStats> {
        // The thread may already be gone; joining reports why
        let _ = self.sender.blocking_send(DisplayRequest::Shutdown);
        let handle = self
            .handle
            .take()
            .ok_or_else(|| VizError::RenderThread("render thread already joined".to_string()))?;
        handle
            .join()
            .map_err(|_| VizError::RenderThread("render thread panicked".to_string()))
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.sender.try_send(DisplayRequest::Shutdown);
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{FrameAssembler, SceneState, VisualizerInput};
    use crate::config::{VisualizationType, VisualizerConfig};
    use vioviz_env::{HeadlessBackend, Pose, Primitive};

    fn output_with(commands: Vec<RenderCommand>) -> VisualizerOutput {
        VisualizerOutput {
            frame: 1,
            timestamp: 0,
            mode: VisualizationType::Mesh3d,
            commands,
            images: vec![],
            errors: vec![],
            frustum_pose: None,
        }
    }

    fn text(id: &str) -> RenderCommand {
        RenderCommand::Add {
            id: WidgetId::from(id),
            primitive: Primitive::Text {
                position: nalgebra::Point3::origin(),
                text: id.to_string(),
                color: vioviz_env::Color::WHITE,
            },
            pose: Pose::identity(),
        }
    }

    #[test]
    fn test_apply_output_tracks_handles() {
        let mut backend = HeadlessBackend::offscreen();
        let mut handles = HandleMap::new();
        let mut stats = RenderStats::default();

        let output = output_with(vec![
            text("a"),
            text("b"),
            RenderCommand::Remove { id: WidgetId::from("a") },
        ]);
        apply_output(&mut backend, &mut handles, &output, Duration::ZERO, &mut stats);

        assert_eq!(backend.widget_count(), 1);
        assert!(backend.widget("b").is_some());
        assert_eq!(handles.len(), 1);
        assert_eq!(stats.commands_applied, 3);
        assert_eq!(stats.frames_rendered, 1);
    }

    #[test]
    fn test_remove_unknown_is_ignored() {
        let mut backend = HeadlessBackend::offscreen();
        let mut handles = HandleMap::new();
        let mut stats = RenderStats::default();

        let output = output_with(vec![RenderCommand::Remove { id: WidgetId::from("ghost") }]);
        apply_output(&mut backend, &mut handles, &output, Duration::ZERO, &mut stats);

        assert_eq!(stats.commands_failed, 0);
        assert_eq!(backend.widget_count(), 0);
    }

    #[test]
    fn test_render_thread_mirrors_registry() {
        let config = VisualizerConfig::default();
        let assembler = FrameAssembler::new(config.clone()).unwrap();
        let mut state = SceneState::new(&config);

        let thread = RenderThread::spawn(Box::new(HeadlessBackend::offscreen()), Duration::ZERO).unwrap();
        for i in 0..15u64 {
            let input = VisualizerInput::new(i, Pose::from_translation(i as f64, 0.0, 0.0));
            thread.submit(assembler.assemble(&mut state, &input)).unwrap();
        }

        let stats = thread.join().unwrap();
        assert_eq!(stats.frames_rendered, 15);
        assert_eq!(stats.commands_failed, 0);
    }

    #[test]
    fn test_screenshot_failure_does_not_stop_thread() {
        let thread = RenderThread::spawn(Box::new(HeadlessBackend::offscreen()), Duration::ZERO).unwrap();
        thread.screenshot("/nonexistent-dir/for/sure/shot.json").unwrap();
        thread.submit(output_with(vec![text("a")])).unwrap();

        let stats = thread.join().unwrap();
        assert_eq!(stats.screenshots, 0);
        assert_eq!(stats.frames_rendered, 1);
    }
}
