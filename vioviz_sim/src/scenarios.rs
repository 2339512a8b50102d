//! Named scenarios exercising the scene engine invariants.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// 15 poses through a window of 10 frustums
    FrustumWindow,

    /// Plane 7 inliers {3,4,5} then {4,5,6}
    PlaneChurn,

    /// Two overlapping clusters on a 100-vertex mesh
    ClusterOverlap,

    /// Same plane reports twice in a row
    IdempotentReconcile,

    /// Planes disappearing from the pipeline output
    PlaneRetire,

    /// Seeded synthetic run checking invariants every frame
    LongRun,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::FrustumWindow,
            ScenarioId::PlaneChurn,
            ScenarioId::ClusterOverlap,
            ScenarioId::IdempotentReconcile,
            ScenarioId::PlaneRetire,
            ScenarioId::LongRun,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::FrustumWindow => "frustum_window",
            ScenarioId::PlaneChurn => "plane_churn",
            ScenarioId::ClusterOverlap => "cluster_overlap",
            ScenarioId::IdempotentReconcile => "idempotent_reconcile",
            ScenarioId::PlaneRetire => "plane_retire",
            ScenarioId::LongRun => "long_run",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::FrustumWindow => "Append P1..P15 with N=10: frustums for P6..P15, trajectory over all 15",
            ScenarioId::PlaneChurn => "Plane 7 inliers {3,4,5} -> {4,5,6}: only (7,3) removed and (7,6) added",
            ScenarioId::ClusterOverlap => "100 vertices, A=[0,50), B=[40,60): last cluster wins on the overlap",
            ScenarioId::IdempotentReconcile => "Re-reporting identical planes produces no plane mutation",
            ScenarioId::PlaneRetire => "Absent planes lose every line, patch, normal and label widget",
            ScenarioId::LongRun => "Synthetic pipeline run, invariants checked after every frame",
        }
    }

    /// Returns true if the scenario is driven by the synthetic pipeline.
    pub fn is_synthetic(&self) -> bool {
        matches!(self, ScenarioId::IdempotentReconcile | ScenarioId::LongRun)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "frustum_window" | "frustumwindow" | "window" => Ok(ScenarioId::FrustumWindow),
            "plane_churn" | "planechurn" | "churn" => Ok(ScenarioId::PlaneChurn),
            "cluster_overlap" | "clusteroverlap" | "clusters" => Ok(ScenarioId::ClusterOverlap),
            "idempotent_reconcile" | "idempotent" => Ok(ScenarioId::IdempotentReconcile),
            "plane_retire" | "planeretire" | "retire" => Ok(ScenarioId::PlaneRetire),
            "long_run" | "longrun" => Ok(ScenarioId::LongRun),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
