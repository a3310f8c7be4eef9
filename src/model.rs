//! Planning entities read from the repository and result entities written
//! back to it.
//!
//! Inputs keep persisted units (milliseconds, separate longitude/latitude,
//! decimal costs). Conversion to solver units happens in
//! [`crate::request`]; conversion back happens in [`crate::response`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a persisted optimization run.
pub type RunId = String;

/// A persisted time window in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }
}

/// A resolved point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub start_longitude: Option<f64>,
    pub start_latitude: Option<f64>,
    pub end_longitude: Option<f64>,
    pub end_latitude: Option<f64>,
    /// Weight, volume, count.
    pub capacity: Vec<i64>,
    /// Skill ids.
    pub skills: Vec<String>,
    pub time_window_start_ms: Option<i64>,
    pub time_window_end_ms: Option<i64>,
    pub cost_fixed: Option<f64>,
    pub cost_per_hour: Option<f64>,
    pub cost_per_km: Option<f64>,
    /// Route length limit in metres.
    pub max_distance: Option<i64>,
    pub max_travel_time_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// Seconds.
    pub setup: Option<i64>,
    /// Seconds.
    pub service: i64,
    pub delivery: Option<Vec<i64>>,
    pub pickup: Option<Vec<i64>>,
    pub skills: Vec<String>,
    pub priority: i64,
    pub time_windows: Vec<TimeWindow>,
}

/// One leg (pickup or delivery) of a shipment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipmentLeg {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// Seconds.
    pub setup: Option<i64>,
    /// Seconds.
    pub service: i64,
    pub time_windows: Vec<TimeWindow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: String,
    pub pickup: ShipmentLeg,
    pub delivery: ShipmentLeg,
    pub amount: Vec<i64>,
    pub skills: Vec<String>,
    pub priority: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
}

impl Skill {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Lifecycle of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Whether a run in this status may move to `next`.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run metadata handed to the repository when a run is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOptimizationRun {
    pub dataset_id: String,
    pub algorithm: String,
    /// The exact document sent to the solver.
    pub raw_request: serde_json::Value,
    pub vehicle_count: usize,
    pub job_count: usize,
    pub shipment_count: usize,
}

/// Aggregate statistics of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub cost: i64,
    /// Metres.
    pub distance: i64,
    pub duration_ms: i64,
    pub waiting_time_ms: i64,
    pub service_ms: i64,
    pub setup_ms: i64,
    pub route_count: usize,
    pub unassigned_count: usize,
    pub computing_time_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRun {
    pub id: RunId,
    pub dataset_id: String,
    pub algorithm: String,
    pub status: RunStatus,
    pub raw_request: serde_json::Value,
    pub raw_response: Option<serde_json::Value>,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
    pub vehicle_count: usize,
    pub job_count: usize,
    pub shipment_count: usize,
}

impl OptimizationRun {
    /// A freshly created run, always pending.
    pub fn new(id: impl Into<RunId>, meta: NewOptimizationRun) -> Self {
        Self {
            id: id.into(),
            dataset_id: meta.dataset_id,
            algorithm: meta.algorithm,
            status: RunStatus::Pending,
            raw_request: meta.raw_request,
            raw_response: None,
            summary: None,
            error: None,
            vehicle_count: meta.vehicle_count,
            job_count: meta.job_count,
            shipment_count: meta.shipment_count,
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle forbids.
    pub fn transition(&mut self, next: RunStatus) -> Result<(), crate::error::StatusTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(crate::error::StatusTransitionError {
                run_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// A job or shipment referenced from a result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum TaskRef {
    Job(String),
    Shipment(String),
}

impl TaskRef {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            TaskRef::Job(id) => Some(id),
            TaskRef::Shipment(_) => None,
        }
    }

    pub fn shipment_id(&self) -> Option<&str> {
        match self {
            TaskRef::Shipment(id) => Some(id),
            TaskRef::Job(_) => None,
        }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskRef::Job(id) => write!(f, "job {id}"),
            TaskRef::Shipment(id) => write!(f, "shipment {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Start,
    Job,
    Pickup,
    Delivery,
    End,
}

/// A constraint violation reported by the solver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverViolation {
    pub cause: String,
    pub duration_ms: Option<i64>,
}

/// One vehicle's route as reported by the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub vehicle_id: String,
    pub cost: i64,
    pub distance: i64,
    pub duration_ms: i64,
    pub waiting_time_ms: i64,
    pub service_ms: i64,
    pub setup_ms: i64,
    pub delivery: Vec<i64>,
    pub pickup: Vec<i64>,
    pub priority: i64,
    pub violations: Vec<SolverViolation>,
    /// Encoded polyline, only present when geometry was requested.
    pub geometry: Option<String>,
    pub step_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub vehicle_id: String,
    /// Position within the vehicle's route, starting at 0.
    pub sequence: usize,
    pub kind: StepKind,
    /// `None` for start and end steps.
    pub task: Option<TaskRef>,
    pub arrival_ms: i64,
    pub location: Option<Coordinate>,
    /// Load after the step.
    pub load: Option<Vec<i64>>,
    /// Metres since the previous step.
    pub distance: i64,
    /// Travel time since the previous step.
    pub duration_ms: i64,
    pub setup_ms: i64,
    pub service_ms: i64,
    pub waiting_time_ms: i64,
    pub violations: Vec<SolverViolation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnassignedTask {
    pub task: TaskRef,
    pub reason: Option<String>,
}

/// Everything ingested from one solver response, persisted as one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    pub summary: RunSummary,
    pub routes: Vec<RouteSummary>,
    pub steps: Vec<RouteStep>,
    pub unassigned: Vec<UnassignedTask>,
    /// The verbatim solver response.
    pub raw_response: serde_json::Value,
}

impl RunResults {
    /// Steps of one vehicle's route, in order.
    pub fn steps_for<'a>(&'a self, vehicle_id: &'a str) -> impl Iterator<Item = &'a RouteStep> + 'a {
        self.steps.iter().filter(move |step| step.vehicle_id == vehicle_id)
    }

    /// Whether `task` appears on any route step.
    pub fn is_routed(&self, task: &TaskRef) -> bool {
        self.steps.iter().any(|step| step.task.as_ref() == Some(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> NewOptimizationRun {
        NewOptimizationRun {
            dataset_id: "ds_1".to_string(),
            algorithm: "vroom".to_string(),
            raw_request: serde_json::json!({"vehicles": []}),
            vehicle_count: 0,
            job_count: 0,
            shipment_count: 0,
        }
    }

    #[test]
    fn test_run_starts_pending() {
        let run = OptimizationRun::new("run_1", meta());
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.raw_response.is_none());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut run = OptimizationRun::new("run_1", meta());
        assert!(run.transition(RunStatus::Running).is_ok());
        assert!(run.transition(RunStatus::Completed).is_ok());
        assert!(run.status.is_terminal());
    }

    #[test]
    fn test_terminal_runs_cannot_move() {
        let mut run = OptimizationRun::new("run_1", meta());
        run.transition(RunStatus::Failed).unwrap();

        let err = run.transition(RunStatus::Running).unwrap_err();
        assert_eq!(err.from, RunStatus::Failed);
        assert_eq!(err.to, RunStatus::Running);
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Pending));
    }

    #[test]
    fn test_task_ref_accessors() {
        let job = TaskRef::Job("job_abc".to_string());
        assert_eq!(job.job_id(), Some("job_abc"));
        assert_eq!(job.shipment_id(), None);
        assert_eq!(job.to_string(), "job job_abc");
    }
}
