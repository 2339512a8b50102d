//! Plane/Landmark Line Tracker
//!
//! Keeps one constraint line per `(PlaneId, LandmarkId)` pair, drawn from the
//! plane's representative point to the landmark believed to lie on it.
//!
//! Per plane the state machine is `Absent -> Active -> Absent`:
//! - a plane becomes Active the first time it is reported with at least one
//!   inlier landmark (plane, normal and label widgets are added);
//! - while Active, each report reconciles the owned lines against the inlier
//!   set by set difference, leaving correct lines untouched;
//! - a plane that is no longer reported is retired, removing every widget it
//!   owns.
//!
//! A report whose geometry cannot be drawn (zero or non-finite normal) never
//! activates a plane. For an Active plane it is recorded as an error, the
//! last drawn geometry is kept and the lines are still reconciled.
//!
//! Line identities are derived from the pair only, so reconciling twice with
//! the same inliers produces no registry mutation at all.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};
use vioviz_env::{Color, Pose, Primitive, WidgetId};

use crate::colorizer::Palette;
use crate::error::{Result, VizError};
use crate::mesh::{LandmarkId, PlaneId};
use crate::registry::SceneRegistry;

/// Known landmark positions, used to place line endpoints.
pub type LandmarkPositions = BTreeMap<LandmarkId, Point3<f64>>;

/// Geometry changes smaller than this do not redraw the plane.
const PLANE_EPSILON: f64 = 1e-9;

/// Side length of the drawn plane patch in meters.
const PLANE_SIZE: f64 = 1.0;

/// Length and radius of the normal indicator drawn on each plane.
const NORMAL_LENGTH: f64 = 0.3;
const NORMAL_RADIUS: f64 = 0.01;

/// One plane as reported by the pipeline for the current frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneReport {
    pub id: PlaneId,

    /// Plane normal (need not be unit length)
    pub normal: Vector3<f64>,

    /// Signed distance from the origin along the normal
    pub distance: f64,

    /// Landmarks currently believed to lie on the plane
    pub inliers: BTreeSet<LandmarkId>,

    /// Segmentation cluster the plane came from; colors the plane widget
    #[serde(default)]
    pub cluster_label: Option<u32>,
}

impl PlaneReport {
    pub fn new(
        id: PlaneId,
        normal: Vector3<f64>,
        distance: f64,
        inliers: impl IntoIterator<Item = LandmarkId>,
    ) -> Self {
        Self {
            id,
            normal,
            distance,
            inliers: inliers.into_iter().collect(),
            cluster_label: None,
        }
    }

    pub fn with_label(mut self, label: u32) -> Self {
        self.cluster_label = Some(label);
        self
    }

    /// Fails when the plane geometry cannot be drawn.
    pub fn validate(&self) -> Result<()> {
        let finite = self.normal.iter().all(|v| v.is_finite()) && self.distance.is_finite();
        if !finite || self.normal.norm() < PLANE_EPSILON {
            return Err(VizError::malformed(format!(
                "plane {} has degenerate geometry (normal {:?}, distance {})",
                self.id,
                self.normal.as_slice(),
                self.distance
            )));
        }
        Ok(())
    }
}

/// Plane's representative point: the foot of the origin on the plane.
pub fn representative_point(normal: &Vector3<f64>, distance: f64) -> Point3<f64> {
    let norm = normal.norm();
    if norm < PLANE_EPSILON {
        return Point3::origin();
    }
    Point3::from(normal / norm * distance)
}

/// Identity of the constraint line between `plane` and `lmk`.
pub fn line_id(plane: PlaneId, lmk: LandmarkId) -> WidgetId {
    WidgetId::new(format!("plane/{}/line/{}", plane, lmk))
}

/// Identity of the plane patch widget.
pub fn plane_widget_id(plane: PlaneId) -> WidgetId {
    WidgetId::new(format!("plane/{}", plane))
}

/// Identity of the plane label widget.
pub fn plane_label_id(plane: PlaneId) -> WidgetId {
    WidgetId::new(format!("plane/{}/label", plane))
}

/// Identity of the plane normal indicator.
pub fn plane_normal_id(plane: PlaneId) -> WidgetId {
    WidgetId::new(format!("plane/{}/normal", plane))
}

/// State of an Active plane.
#[derive(Debug, Clone, PartialEq)]
struct ActivePlane {
    normal: Vector3<f64>,
    distance: f64,
    lines: BTreeSet<LandmarkId>,
}

/// What a reconcile call changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileStats {
    /// Lines added this call
    pub added: usize,

    /// Lines removed this call
    pub removed: usize,

    /// Plane transitioned Absent -> Active
    pub activated: bool,

    /// Plane or label widget was redrawn
    pub plane_redrawn: bool,

    /// Inliers that could not be drawn because their position is unknown
    pub missing_landmarks: Vec<LandmarkId>,

    /// Steps that failed without aborting the call (plane redraw, line upserts)
    pub failures: Vec<VizError>,
}

impl ReconcileStats {
    /// Converts unknown landmark positions into a malformed-input error.
    pub fn missing_error(&self, plane: PlaneId) -> Option<VizError> {
        if self.missing_landmarks.is_empty() {
            return None;
        }
        Some(VizError::malformed(format!(
            "plane {} references {} landmarks without position: {:?}",
            plane,
            self.missing_landmarks.len(),
            self.missing_landmarks
        )))
    }

    /// Every error of the call: failed steps, then unknown landmarks.
    pub fn errors(&self, plane: PlaneId) -> Vec<VizError> {
        let mut errors = self.failures.clone();
        errors.extend(self.missing_error(plane));
        errors
    }
}

/// Tracks constraint lines and plane widgets across frames.
#[derive(Debug, Clone)]
pub struct PlaneLineTracker {
    planes: BTreeMap<PlaneId, ActivePlane>,
    palette: Palette,
    line_color: Color,
}

impl Default for PlaneLineTracker {
    fn default() -> Self {
        Self::new(Palette::default())
    }
}

impl PlaneLineTracker {
    pub fn new(palette: Palette) -> Self {
        Self {
            planes: BTreeMap::new(),
            palette,
            line_color: Color::RED,
        }
    }

    /// Whether the plane is Active.
    pub fn is_active(&self, plane: PlaneId) -> bool {
        self.planes.contains_key(&plane)
    }

    /// Active planes in ascending id order.
    pub fn active_planes(&self) -> Vec<PlaneId> {
        self.planes.keys().copied().collect()
    }

    /// Landmarks that currently own a line to `plane`.
    pub fn owned_lines(&self, plane: PlaneId) -> Option<&BTreeSet<LandmarkId>> {
        self.planes.get(&plane).map(|p| &p.lines)
    }

    /// Total number of live constraint lines.
    pub fn line_count(&self) -> usize {
        self.planes.values().map(|p| p.lines.len()).sum()
    }

    /// Reconciles the lines of one plane against its current inlier set.
    ///
    /// Lines whose landmark left the inlier set are removed, lines for new
    /// inliers are added, everything else is left alone.
    ///
    /// Fails only when an Absent plane cannot be activated; the tracker is
    /// then unchanged. Other failures are collected in the returned stats.
    pub fn reconcile(
        &mut self,
        registry: &mut SceneRegistry,
        report: &PlaneReport,
        landmarks: &LandmarkPositions,
    ) -> Result<ReconcileStats> {
        let mut stats = ReconcileStats::default();

        if !self.planes.contains_key(&report.id) {
            if report.inliers.is_empty() {
                return Ok(stats);
            }
            report.validate()?;
            self.draw_plane(registry, report)?;
            self.planes.insert(
                report.id,
                ActivePlane {
                    normal: report.normal,
                    distance: report.distance,
                    lines: BTreeSet::new(),
                },
            );
            stats.activated = true;
            stats.plane_redrawn = true;
            debug!("Plane {} activated with {} inliers", report.id, report.inliers.len());
        } else if let Err(e) = report.validate() {
            warn!("Plane {} keeps its last geometry: {}", report.id, e);
            stats.failures.push(e);
        } else if self.geometry_changed(report) {
            match self.draw_plane(registry, report) {
                Ok(()) => {
                    if let Some(plane) = self.planes.get_mut(&report.id) {
                        plane.normal = report.normal;
                        plane.distance = report.distance;
                    }
                    stats.plane_redrawn = true;
                }
                Err(e) => stats.failures.push(e),
            }
        }

        let Some(plane) = self.planes.get(&report.id) else {
            return Ok(stats);
        };
        let owned = plane.lines.clone();
        let center = representative_point(&plane.normal, plane.distance);

        // Stale lines: owned but no longer inliers
        let mut kept = owned.clone();
        for lmk in owned.difference(&report.inliers) {
            registry.remove(&line_id(report.id, *lmk));
            kept.remove(lmk);
            stats.removed += 1;
        }

        // New lines: inliers not owned yet
        for lmk in report.inliers.difference(&owned) {
            let Some(position) = landmarks.get(lmk) else {
                stats.missing_landmarks.push(*lmk);
                continue;
            };
            let line = Primitive::Line {
                from: center,
                to: *position,
                color: self.line_color,
            };
            match registry.upsert(line_id(report.id, *lmk), line, Pose::identity()) {
                Ok(_) => {
                    kept.insert(*lmk);
                    stats.added += 1;
                }
                Err(e) => stats.failures.push(e),
            }
        }

        if let Some(plane) = self.planes.get_mut(&report.id) {
            plane.lines = kept;
        }

        if !stats.missing_landmarks.is_empty() {
            warn!(
                "Plane {}: {} inliers have no known position",
                report.id,
                stats.missing_landmarks.len()
            );
        }

        Ok(stats)
    }

    /// Removes every line, the plane patch, its normal and the label of `plane`.
    ///
    /// Returns the number of widgets removed. Retiring an Absent plane does
    /// nothing.
    pub fn retire(&mut self, registry: &mut SceneRegistry, plane: PlaneId) -> usize {
        let Some(state) = self.planes.remove(&plane) else {
            return 0;
        };

        let mut removed = 0;
        for lmk in &state.lines {
            if registry.remove(&line_id(plane, *lmk)) {
                removed += 1;
            }
        }
        if registry.remove(&plane_widget_id(plane)) {
            removed += 1;
        }
        if registry.remove(&plane_label_id(plane)) {
            removed += 1;
        }
        if registry.remove(&plane_normal_id(plane)) {
            removed += 1;
        }

        debug!("Plane {} retired ({} widgets removed)", plane, removed);
        removed
    }

    /// Retires every Active plane not in `reported`.
    pub fn retire_absent(
        &mut self,
        registry: &mut SceneRegistry,
        reported: &BTreeSet<PlaneId>,
    ) -> Vec<PlaneId> {
        let absent: Vec<PlaneId> = self
            .planes
            .keys()
            .filter(|id| !reported.contains(id))
            .copied()
            .collect();

        for plane in &absent {
            self.retire(registry, *plane);
        }
        absent
    }

    fn geometry_changed(&self, report: &PlaneReport) -> bool {
        match self.planes.get(&report.id) {
            Some(plane) => {
                (plane.normal - report.normal).norm() > PLANE_EPSILON
                    || (plane.distance - report.distance).abs() > PLANE_EPSILON
            }
            None => true,
        }
    }

    fn draw_plane(&self, registry: &mut SceneRegistry, report: &PlaneReport) -> Result<()> {
        let center = representative_point(&report.normal, report.distance);
        let color = match report.cluster_label {
            Some(label) => self.palette.color(label),
            None => self.palette.color_for(report.id),
        };

        registry.upsert(
            plane_widget_id(report.id),
            Primitive::Plane {
                center,
                normal: report.normal,
                size: PLANE_SIZE,
                color,
            },
            Pose::identity(),
        )?;
        registry.upsert(
            plane_normal_id(report.id),
            Primitive::Cylinder {
                from: center,
                to: center + report.normal.normalize() * NORMAL_LENGTH,
                radius: NORMAL_RADIUS,
                sides: 12,
                color,
            },
            Pose::identity(),
        )?;
        registry.upsert(
            plane_label_id(report.id),
            Primitive::Text {
                position: center,
                text: format!("Plane {}", report.id),
                color,
            },
            Pose::identity(),
        )?;
        Ok(())
    }
}
