//! In-memory render backend for servers, CI and tests.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{BackendSettings, RenderBackend};
use crate::error::BackendError;
use crate::primitive::{Primitive, PrimitiveKind};
use crate::types::{Pose, WidgetHandle, WidgetId};

/// A widget as held by the headless scene.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessWidget {
    pub id: WidgetId,
    pub primitive: Primitive,
    pub pose: Pose,
}

/// Summary of one widget in a screenshot or recording line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetSummary {
    pub id: String,
    pub handle: u64,
    pub kind: PrimitiveKind,
    pub points: usize,
    pub position: [f64; 3],
}

/// JSON snapshot written by `capture_screenshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    /// Number of frames rendered before the capture
    pub frame: u64,

    /// Live widgets ordered by handle
    pub widgets: Vec<WidgetSummary>,
}

/// Backend that keeps the scene in memory instead of drawing it.
///
/// Screenshots are JSON scene summaries and recordings are JSON lines, one
/// per rendered frame.
pub struct HeadlessBackend {
    settings: BackendSettings,
    widgets: BTreeMap<WidgetHandle, HeadlessWidget>,
    next_handle: u64,
    frames_rendered: u64,
    recording: Option<BufWriter<File>>,
}

impl HeadlessBackend {
    /// Connects using the given settings.
    ///
    /// Fails with [`BackendError::Unavailable`] when there is no display and
    /// off-screen rendering was not requested.
    pub fn connect(settings: BackendSettings) -> Result<Self, BackendError> {
        settings.check()?;
        info!(
            "Headless backend ready (display={:?}, offscreen={})",
            settings.display, settings.offscreen
        );
        Ok(Self::with_settings(settings))
    }

    /// Creates an off-screen backend, which never needs a display.
    pub fn offscreen() -> Self {
        Self::with_settings(BackendSettings::offscreen())
    }

    fn with_settings(settings: BackendSettings) -> Self {
        Self {
            settings,
            widgets: BTreeMap::new(),
            next_handle: 0,
            frames_rendered: 0,
            recording: None,
        }
    }

    /// Number of live widgets.
    pub fn widget_count(&self) -> usize {
        self.widgets.len()
    }

    /// Number of frames rendered so far.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Whether rendering happens without a window.
    pub fn is_offscreen(&self) -> bool {
        self.settings.offscreen
    }

    /// Looks a live widget up by its identity.
    pub fn widget(&self, id: &str) -> Option<&HeadlessWidget> {
        self.widgets.values().find(|w| w.id.as_str() == id)
    }

    /// Identities of all live widgets, ordered by handle.
    pub fn ids(&self) -> Vec<&WidgetId> {
        self.widgets.values().map(|w| &w.id).collect()
    }

    /// Builds the snapshot written by screenshots.
    pub fn snapshot(&self) -> SceneSnapshot {
        let widgets = self
            .widgets
            .iter()
            .map(|(handle, w)| {
                let t = w.pose.translation();
                WidgetSummary {
                    id: w.id.to_string(),
                    handle: handle.0,
                    kind: w.primitive.kind(),
                    points: w.primitive.point_count(),
                    position: [t.x, t.y, t.z],
                }
            })
            .collect();

        SceneSnapshot {
            frame: self.frames_rendered,
            widgets,
        }
    }

    fn widget_mut(&mut self, handle: WidgetHandle) -> Result<&mut HeadlessWidget, BackendError> {
        self.widgets
            .get_mut(&handle)
            .ok_or(BackendError::UnknownHandle(handle))
    }
}

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_primitive(
        &mut self,
        id: &WidgetId,
        primitive: &Primitive,
        pose: &Pose,
    ) -> Result<WidgetHandle, BackendError> {
        let handle = WidgetHandle(self.next_handle);
        self.next_handle += 1;

        self.widgets.insert(
            handle,
            HeadlessWidget {
                id: id.clone(),
                primitive: primitive.clone(),
                pose: *pose,
            },
        );

        Ok(handle)
    }

    fn update(
        &mut self,
        handle: WidgetHandle,
        primitive: &Primitive,
        pose: &Pose,
    ) -> Result<(), BackendError> {
        let widget = self.widget_mut(handle)?;
        widget.primitive = primitive.clone();
        widget.pose = *pose;
        Ok(())
    }

    fn remove(&mut self, handle: WidgetHandle) -> Result<(), BackendError> {
        self.widgets
            .remove(&handle)
            .map(|_| ())
            .ok_or(BackendError::UnknownHandle(handle))
    }

    fn render_frame(&mut self, _timeout: Duration) -> Result<(), BackendError> {
        self.frames_rendered += 1;

        if self.recording.is_some() {
            let line = serde_json::to_string(&self.snapshot()).map_err(BackendError::capture)?;
            if let Some(writer) = self.recording.as_mut() {
                writeln!(writer, "{}", line)?;
            }
        }

        Ok(())
    }

    fn capture_screenshot(&mut self, path: &Path) -> Result<(), BackendError> {
        let json = serde_json::to_string_pretty(&self.snapshot()).map_err(BackendError::capture)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        debug!("Screenshot written to {}", path.display());
        Ok(())
    }

    fn set_offscreen(&mut self, offscreen: bool) -> Result<(), BackendError> {
        let settings = BackendSettings {
            display: self.settings.display.clone(),
            offscreen,
        };
        settings.check()?;
        self.settings = settings;
        Ok(())
    }

    fn start_recording(&mut self, path: &Path) -> Result<(), BackendError> {
        let file = File::create(path)?;
        self.recording = Some(BufWriter::new(file));
        info!("Recording frames to {}", path.display());
        Ok(())
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        if let Some(writer) = self.recording.as_mut() {
            let _ = writer.flush();
        }
    }
}
