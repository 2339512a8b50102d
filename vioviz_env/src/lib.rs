//! vioviz Environment Abstraction Layer
//!
//! This crate separates the scene engine from whatever actually draws the
//! scene. The engine only ever produces [`RenderCommand`]s; a
//! [`RenderBackend`] turns them into widgets on a screen, in a file, or in
//! memory.
//!
//! # Core Concept: One Writer, One Renderer
//!
//! 3D widget libraries are generally not safe to call from several threads.
//! A backend is therefore owned by a single rendering thread, while the
//! scene bookkeeping runs elsewhere and hands over plain data.
//!
//! # Example
//!
//! ```
//! use vioviz_env::{HeadlessBackend, Pose, Primitive, RenderBackend, WidgetId};
//!
//! let mut backend = HeadlessBackend::offscreen();
//! let cloud = Primitive::PointCloud { points: vec![], colors: None };
//! let handle = backend
//!     .create_primitive(&WidgetId::from("cloud"), &cloud, &Pose::identity())
//!     .unwrap();
//! backend.remove(handle).unwrap();
//! ```

mod backend;
mod error;
mod headless;
mod primitive;
mod types;

pub use backend::{BackendSettings, RenderBackend};
pub use error::BackendError;
pub use headless::{HeadlessBackend, HeadlessWidget, SceneSnapshot, WidgetSummary};
pub use primitive::{Primitive, PrimitiveKind, RenderCommand};
pub use types::{CameraIntrinsics, Color, Image, Pose, WidgetHandle, WidgetId};
