//! The Scene Registry - single source of truth for what is currently shown.
//!
//! Maps a stable [`WidgetId`] to the state of exactly one widget. Every
//! mutating call enqueues exactly one [`RenderCommand`] for the render
//! backend; the registry itself never draws.
//!
//! Entries are never removed and re-added to change them: an update is
//! always signalled as an update so the backend can modify the widget in
//! place without flicker.

use std::collections::BTreeMap;

use tracing::{debug, trace};
use vioviz_env::{Color, Pose, Primitive, PrimitiveKind, RenderCommand, WidgetId};

use crate::error::{Result, VizError};

/// State of one widget as known by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetEntry {
    /// Stable identity
    pub id: WidgetId,

    /// Geometry and payload
    pub primitive: Primitive,

    /// Placement in the world frame
    pub pose: Pose,

    /// Frame in which the entry was last added or updated
    pub last_updated_frame: u64,

    /// Transient entries are evicted when they go stale
    pub transient: bool,
}

impl WidgetEntry {
    pub fn kind(&self) -> PrimitiveKind {
        self.primitive.kind()
    }

    /// Uniform color of the widget, if it has one.
    pub fn color(&self) -> Option<Color> {
        match &self.primitive {
            Primitive::Line { color, .. }
            | Primitive::Polyline { color, .. }
            | Primitive::Frustum { color, .. }
            | Primitive::Cylinder { color, .. }
            | Primitive::Plane { color, .. }
            | Primitive::Text { color, .. } => Some(*color),
            _ => None,
        }
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
}

/// Registry of live widgets keyed by identity.
#[derive(Debug, Default)]
pub struct SceneRegistry {
    entries: BTreeMap<WidgetId, WidgetEntry>,
    pending: Vec<RenderCommand>,
    frame: u64,
    mutations: u64,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the frame number stamped on subsequent mutations.
    pub fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    /// Adds the widget if `id` is new, otherwise updates it in place.
    ///
    /// The primitive is validated first; on error nothing changes and no
    /// command is enqueued.
    pub fn upsert(
        &mut self,
        id: impl Into<WidgetId>,
        primitive: Primitive,
        pose: Pose,
    ) -> Result<UpsertOutcome> {
        self.upsert_with(id.into(), primitive, pose, false)
    }

    /// Like [`upsert`](Self::upsert), but the entry is eligible for
    /// [`evict_stale`](Self::evict_stale).
    pub fn upsert_transient(
        &mut self,
        id: impl Into<WidgetId>,
        primitive: Primitive,
        pose: Pose,
    ) -> Result<UpsertOutcome> {
        self.upsert_with(id.into(), primitive, pose, true)
    }

    fn upsert_with(
        &mut self,
        id: WidgetId,
        primitive: Primitive,
        pose: Pose,
        transient: bool,
    ) -> Result<UpsertOutcome> {
        primitive
            .validate()
            .map_err(|reason| VizError::malformed(format!("widget '{}': {}", id, reason)))?;

        let frame = self.frame;
        let outcome = match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.primitive = primitive.clone();
                entry.pose = pose;
                entry.last_updated_frame = frame;
                entry.transient = transient;
                self.pending.push(RenderCommand::Update {
                    id: id.clone(),
                    primitive,
                    pose,
                });
                UpsertOutcome::Updated
            }
            None => {
                self.entries.insert(
                    id.clone(),
                    WidgetEntry {
                        id: id.clone(),
                        primitive: primitive.clone(),
                        pose,
                        last_updated_frame: frame,
                        transient,
                    },
                );
                self.pending.push(RenderCommand::Add {
                    id: id.clone(),
                    primitive,
                    pose,
                });
                UpsertOutcome::Added
            }
        };

        self.mutations += 1;
        trace!("upsert {} -> {:?}", id, outcome);
        Ok(outcome)
    }

    /// Removes the widget if present and returns whether anything was removed.
    ///
    /// Removing an unknown identity is a no-op: frame-to-frame churn
    /// routinely asks for widgets that already expired.
    pub fn remove(&mut self, id: &WidgetId) -> bool {
        if self.entries.remove(id).is_none() {
            return false;
        }
        self.pending.push(RenderCommand::Remove { id: id.clone() });
        self.mutations += 1;
        trace!("remove {}", id);
        true
    }

    /// Convenience for string identities.
    pub fn remove_str(&mut self, id: &str) -> bool {
        self.remove(&WidgetId::from(id))
    }

    pub fn contains(&self, id: &WidgetId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn contains_str(&self, id: &str) -> bool {
        self.entries.contains_key(&WidgetId::from(id))
    }

    pub fn get(&self, id: &WidgetId) -> Option<&WidgetEntry> {
        self.entries.get(id)
    }

    pub fn get_str(&self, id: &str) -> Option<&WidgetEntry> {
        self.entries.get(&WidgetId::from(id))
    }

    /// Number of live widgets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities of all live widgets, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &WidgetId> {
        self.entries.keys()
    }

    /// Live identities starting with `prefix`.
    pub fn ids_with_prefix(&self, prefix: &str) -> Vec<WidgetId> {
        self.entries
            .keys()
            .filter(|id| id.as_str().starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Removes transient entries not touched since before `frame`.
    pub fn evict_stale(&mut self, frame: u64) -> Vec<WidgetId> {
        let stale: Vec<WidgetId> = self
            .entries
            .values()
            .filter(|e| e.transient && e.last_updated_frame < frame)
            .map(|e| e.id.clone())
            .collect();

        for id in &stale {
            self.remove(id);
        }

        if !stale.is_empty() {
            debug!("Evicted {} stale widgets", stale.len());
        }
        stale
    }

    /// Removes every widget.
    pub fn clear(&mut self) {
        let ids: Vec<WidgetId> = self.entries.keys().cloned().collect();
        for id in &ids {
            self.remove(id);
        }
    }

    /// Commands enqueued since the last drain, oldest first.
    pub fn pending_commands(&self) -> &[RenderCommand] {
        &self.pending
    }

    /// Takes the enqueued commands, oldest first.
    pub fn drain_commands(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.pending)
    }

    /// Total number of commands ever enqueued.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn text(s: &str) -> Primitive {
        Primitive::Text {
            position: Point3::origin(),
            text: s.to_string(),
            color: Color::WHITE,
        }
    }

    #[test]
    fn test_registry_creation() {
        let registry = SceneRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.mutation_count(), 0);
    }

    #[test]
    fn test_upsert_adds_then_updates() {
        let mut registry = SceneRegistry::new();

        let first = registry.upsert("label", text("a"), Pose::identity()).unwrap();
        let second = registry.upsert("label", text("b"), Pose::identity()).unwrap();

        assert_eq!(first, UpsertOutcome::Added);
        assert_eq!(second, UpsertOutcome::Updated);
        assert_eq!(registry.len(), 1);

        let commands = registry.drain_commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].is_add());
        assert!(commands[1].is_update());
        assert_eq!(registry.get_str("label").unwrap().primitive, text("b"));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut registry = SceneRegistry::new();
        assert!(!registry.remove_str("ghost"));
        assert_eq!(registry.mutation_count(), 0);
        assert!(registry.pending_commands().is_empty());
    }

    #[test]
    fn test_remove_known() {
        let mut registry = SceneRegistry::new();
        registry.upsert("label", text("a"), Pose::identity()).unwrap();
        assert!(registry.remove_str("label"));
        assert!(!registry.contains_str("label"));
        assert!(!registry.remove_str("label"));
        assert_eq!(registry.mutation_count(), 2);
    }

    #[test]
    fn test_invalid_upsert_leaves_entry_untouched() {
        let mut registry = SceneRegistry::new();
        let good = Primitive::Mesh {
            vertices: vec![Point3::origin(); 3],
            triangles: vec![[0, 1, 2]],
            colors: vec![Color::GRAY; 3],
            tcoords: None,
        };
        registry.upsert("mesh", good.clone(), Pose::identity()).unwrap();

        let bad = Primitive::Mesh {
            vertices: vec![Point3::origin(); 3],
            triangles: vec![[0, 1, 7]],
            colors: vec![Color::GRAY; 3],
            tcoords: None,
        };
        let before = registry.mutation_count();
        let result = registry.upsert("mesh", bad, Pose::from_translation(1.0, 0.0, 0.0));

        assert!(matches!(result, Err(VizError::MalformedInput(_))));
        assert_eq!(registry.mutation_count(), before);
        let entry = registry.get_str("mesh").unwrap();
        assert_eq!(entry.primitive, good);
        assert_eq!(entry.pose, Pose::identity());
    }

    #[test]
    fn test_evict_stale_only_transient() {
        let mut registry = SceneRegistry::new();
        registry.begin_frame(1);
        registry.upsert("sticky", text("s"), Pose::identity()).unwrap();
        registry.upsert_transient("fleeting", text("f"), Pose::identity()).unwrap();

        registry.begin_frame(2);
        let evicted = registry.evict_stale(2);

        assert_eq!(evicted, vec![WidgetId::from("fleeting")]);
        assert!(registry.contains_str("sticky"));
        assert!(!registry.contains_str("fleeting"));
    }

    #[test]
    fn test_last_updated_frame_stamped() {
        let mut registry = SceneRegistry::new();
        registry.begin_frame(4);
        registry.upsert("label", text("a"), Pose::identity()).unwrap();
        registry.begin_frame(9);
        registry.upsert("label", text("a"), Pose::identity()).unwrap();
        assert_eq!(registry.get_str("label").unwrap().last_updated_frame, 9);
    }

    #[test]
    fn test_ids_with_prefix() {
        let mut registry = SceneRegistry::new();
        registry.upsert("plane/1", text("p"), Pose::identity()).unwrap();
        registry.upsert("plane/1/line/4", text("l"), Pose::identity()).unwrap();
        registry.upsert("trajectory", text("t"), Pose::identity()).unwrap();

        assert_eq!(registry.ids_with_prefix("plane/1").len(), 2);
        registry.clear();
        assert!(registry.is_empty());
    }
}
