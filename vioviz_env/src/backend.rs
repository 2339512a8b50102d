//! Render backend trait implemented by every display target.

use std::path::Path;
use std::time::Duration;

use crate::error::BackendError;
use crate::primitive::Primitive;
use crate::types::{Pose, WidgetHandle, WidgetId};

/// The interface the scene engine drives to put widgets on screen.
///
/// Backends wrap a 3D widget library that is not safe for concurrent use, so
/// a backend is owned by exactly one rendering thread. It must be `Send` so
/// that thread can take ownership of it, but it is never shared.
///
/// # Implementations
///
/// - **Headless**: `HeadlessBackend` - in-memory scene, JSON screenshots
/// - **Rerun**: `vioviz_core::visualization::RerunBackend` (feature `visualization`)
pub trait RenderBackend: Send {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// Creates a widget and returns the handle used to address it afterwards.
    ///
    /// `id` is passed along for backends that key their own scene by name.
    fn create_primitive(
        &mut self,
        id: &WidgetId,
        primitive: &Primitive,
        pose: &Pose,
    ) -> Result<WidgetHandle, BackendError>;

    /// Replaces geometry and pose of an existing widget.
    fn update(
        &mut self,
        handle: WidgetHandle,
        primitive: &Primitive,
        pose: &Pose,
    ) -> Result<(), BackendError>;

    /// Removes a widget from the scene.
    fn remove(&mut self, handle: WidgetHandle) -> Result<(), BackendError>;

    /// Pumps the window / event loop for at most `timeout` and redraws.
    ///
    /// This is the only call allowed to block.
    fn render_frame(&mut self, timeout: Duration) -> Result<(), BackendError>;

    /// Saves the current view to `path`.
    fn capture_screenshot(&mut self, path: &Path) -> Result<(), BackendError>;

    /// Switches between on-screen and off-screen rendering.
    fn set_offscreen(&mut self, offscreen: bool) -> Result<(), BackendError>;

    /// Starts recording every subsequent frame to `path`.
    fn start_recording(&mut self, path: &Path) -> Result<(), BackendError>;
}

impl<B: RenderBackend + ?Sized> RenderBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn create_primitive(
        &mut self,
        id: &WidgetId,
        primitive: &Primitive,
        pose: &Pose,
    ) -> Result<WidgetHandle, BackendError> {
        (**self).create_primitive(id, primitive, pose)
    }

    fn update(
        &mut self,
        handle: WidgetHandle,
        primitive: &Primitive,
        pose: &Pose,
    ) -> Result<(), BackendError> {
        (**self).update(handle, primitive, pose)
    }

    fn remove(&mut self, handle: WidgetHandle) -> Result<(), BackendError> {
        (**self).remove(handle)
    }

    fn render_frame(&mut self, timeout: Duration) -> Result<(), BackendError> {
        (**self).render_frame(timeout)
    }

    fn capture_screenshot(&mut self, path: &Path) -> Result<(), BackendError> {
        (**self).capture_screenshot(path)
    }

    fn set_offscreen(&mut self, offscreen: bool) -> Result<(), BackendError> {
        (**self).set_offscreen(offscreen)
    }

    fn start_recording(&mut self, path: &Path) -> Result<(), BackendError> {
        (**self).start_recording(path)
    }
}

/// Startup settings for a backend that may need a display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSettings {
    /// Display to attach to, `None` when running headless
    pub display: Option<String>,

    /// Render without a window (servers, CI)
    pub offscreen: bool,
}

impl BackendSettings {
    /// Reads the display from the `DISPLAY` environment variable.
    pub fn from_env(offscreen: bool) -> Self {
        let display = std::env::var("DISPLAY").ok().filter(|d| !d.is_empty());
        Self { display, offscreen }
    }

    /// Settings for pure off-screen rendering.
    pub fn offscreen() -> Self {
        Self {
            display: None,
            offscreen: true,
        }
    }

    /// Fails when there is nowhere to render.
    ///
    /// There is no silent fallback to off-screen mode: it must be requested.
    pub fn check(&self) -> Result<(), BackendError> {
        if self.display.is_none() && !self.offscreen {
            return Err(BackendError::unavailable(
                "no display found and off-screen rendering was not requested",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_without_display_fail() {
        let settings = BackendSettings {
            display: None,
            offscreen: false,
        };
        assert!(matches!(settings.check(), Err(BackendError::Unavailable(_))));
    }

    #[test]
    fn test_settings_offscreen_ok() {
        assert!(BackendSettings::offscreen().check().is_ok());

        let with_display = BackendSettings {
            display: Some(":0".to_string()),
            offscreen: false,
        };
        assert!(with_display.check().is_ok());
    }
}
