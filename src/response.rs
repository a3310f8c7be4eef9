//! Solver response envelope and ingestion into result entities.
//!
//! Ingestion is all-or-nothing: any malformed field, unknown id or task
//! accounting mismatch fails the whole response.

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{IngestError, IntegrityError, SolverResponseError};
use crate::id_map::RunIds;
use crate::model::{
    Coordinate, RouteStep, RouteSummary, RunResults, RunSummary, SolverViolation, StepKind,
    TaskRef, UnassignedTask,
};
use crate::request::{DIMENSIONS, SolverCoordinate};
use crate::units::{from_solver_coordinate, from_solver_time};

/// Status codes reported in the response's `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverCode {
    Ok,
    InternalError,
    InputError,
    RoutingError,
    Other(i64),
}

impl From<i64> for SolverCode {
    fn from(code: i64) -> Self {
        match code {
            0 => SolverCode::Ok,
            1 => SolverCode::InternalError,
            2 => SolverCode::InputError,
            3 => SolverCode::RoutingError,
            other => SolverCode::Other(other),
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SolverResponse {
    pub code: i64,
    pub summary: SolverSummary,
    pub routes: Vec<SolverRoute>,
    pub unassigned: Vec<SolverUnassigned>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverSummary {
    pub cost: i64,
    pub distance: i64,
    pub duration: i64,
    #[serde(default)]
    pub waiting_time: i64,
    #[serde(default)]
    pub service: i64,
    #[serde(default)]
    pub setup: i64,
    #[serde(default)]
    pub computing_times: Option<ComputingTimes>,
}

/// Milliseconds spent in each solver phase.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ComputingTimes {
    #[serde(default)]
    pub loading: i64,
    #[serde(default)]
    pub solving: i64,
    #[serde(default)]
    pub routing: i64,
}

impl ComputingTimes {
    pub fn total(&self) -> Option<i64> {
        self.loading.checked_add(self.solving)?.checked_add(self.routing)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverRoute {
    pub vehicle: u64,
    pub cost: i64,
    pub distance: i64,
    pub duration: i64,
    #[serde(default)]
    pub waiting_time: i64,
    #[serde(default)]
    pub service: i64,
    #[serde(default)]
    pub setup: i64,
    #[serde(default)]
    pub delivery: Vec<i64>,
    #[serde(default)]
    pub pickup: Vec<i64>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub violations: Vec<WireViolation>,
    #[serde(default)]
    pub geometry: Option<String>,
    pub steps: Vec<SolverStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStepKind {
    Start,
    Job,
    Pickup,
    Delivery,
    End,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverStep {
    #[serde(rename = "type")]
    pub kind: SolverStepKind,
    #[serde(default)]
    pub id: Option<u64>,
    pub arrival: i64,
    #[serde(default)]
    pub location: Option<SolverCoordinate>,
    #[serde(default)]
    pub load: Option<Vec<i64>>,
    #[serde(default)]
    pub setup: i64,
    #[serde(default)]
    pub service: i64,
    #[serde(default)]
    pub waiting_time: i64,
    /// Cumulative since route start.
    #[serde(default)]
    pub distance: i64,
    /// Cumulative travel time since route start.
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub violations: Vec<WireViolation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverTaskKind {
    Job,
    Pickup,
    Delivery,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverUnassigned {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: SolverTaskKind,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireViolation {
    pub cause: String,
    #[serde(default)]
    pub duration: Option<i64>,
}

impl TryFrom<WireViolation> for SolverViolation {
    type Error = SolverResponseError;

    fn try_from(violation: WireViolation) -> Result<Self, Self::Error> {
        let duration_ms = violation
            .duration
            .map(|seconds| millis("violations.duration", seconds))
            .transpose()?;
        Ok(Self {
            cause: violation.cause,
            duration_ms,
        })
    }
}

fn convert_violations(
    violations: Vec<WireViolation>,
) -> Result<Vec<SolverViolation>, SolverResponseError> {
    violations.into_iter().map(SolverViolation::try_from).collect()
}

/// Solver seconds to milliseconds, rejecting values that do not fit.
fn millis(field: &'static str, seconds: i64) -> Result<i64, SolverResponseError> {
    from_solver_time(seconds).ok_or(SolverResponseError::OutOfRange {
        field,
        value: seconds,
    })
}

/// Check the envelope and decode it.
///
/// A nonzero `code` means the solver refused the request; its `error` text
/// is surfaced instead of trying to read routes.
pub fn parse_envelope(raw: &str) -> Result<(serde_json::Value, SolverResponse), SolverResponseError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(SolverResponseError::InvalidJson)?;

    let code = value
        .get("code")
        .ok_or(SolverResponseError::MissingField("code"))?
        .as_i64()
        .ok_or(SolverResponseError::MissingField("code"))?;

    if SolverCode::from(code) != SolverCode::Ok {
        let message = value
            .get("error")
            .and_then(|error| error.as_str())
            .unwrap_or("unknown solver error")
            .to_string();
        warn!(code, error = %message, "Solver rejected the request");
        return Err(SolverResponseError::Rejected { code, message });
    }

    for field in ["summary", "routes", "unassigned"] {
        if value.get(field).is_none() {
            return Err(SolverResponseError::MissingField(field));
        }
    }

    let response = SolverResponse::deserialize(&value).map_err(SolverResponseError::Malformed)?;
    Ok((value, response))
}

// ============================================================================
// Ingestion
// ============================================================================

/// One leg of task accounting. Jobs have one leg, shipments two.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Leg {
    Job(String),
    Pickup(String),
    Delivery(String),
}

impl Leg {
    fn label(&self) -> String {
        match self {
            Leg::Job(id) => format!("job {id}"),
            Leg::Pickup(id) => format!("shipment {id} (pickup)"),
            Leg::Delivery(id) => format!("shipment {id} (delivery)"),
        }
    }
}

/// Reads a solver response using the ids of the request that produced it.
pub struct ResponseParser<'a> {
    ids: &'a RunIds,
}

impl<'a> ResponseParser<'a> {
    pub fn new(ids: &'a RunIds) -> Self {
        Self { ids }
    }

    pub fn ingest(&self, raw: &str) -> Result<RunResults, IngestError> {
        let (raw_response, response) = parse_envelope(raw)?;
        debug!(response = %raw_response, "Solver response payload");

        let mut routed: Vec<Leg> = Vec::new();
        let mut unassigned_legs: Vec<Leg> = Vec::new();
        let mut seen_vehicles = HashSet::new();
        let mut routes = Vec::with_capacity(response.routes.len());
        let mut steps = Vec::new();

        for route in response.routes {
            let vehicle_id = self.ids.vehicles.reverse(route.vehicle)?.clone();
            if !seen_vehicles.insert(vehicle_id.clone()) {
                return Err(IntegrityError::DuplicateRoute(vehicle_id).into());
            }

            let route_steps = self.convert_steps(&vehicle_id, route.steps, &mut routed)?;
            routes.push(RouteSummary {
                vehicle_id,
                cost: route.cost,
                distance: route.distance,
                duration_ms: millis("routes.duration", route.duration)?,
                waiting_time_ms: millis("routes.waiting_time", route.waiting_time)?,
                service_ms: millis("routes.service", route.service)?,
                setup_ms: millis("routes.setup", route.setup)?,
                delivery: route.delivery,
                pickup: route.pickup,
                priority: route.priority,
                violations: convert_violations(route.violations)?,
                geometry: route.geometry,
                step_count: route_steps.len(),
            });
            steps.extend(route_steps);
        }

        let mut unassigned = Vec::with_capacity(response.unassigned.len());
        let mut unassigned_shipments = HashSet::new();
        for entry in response.unassigned {
            let reason = entry.reason.or(entry.description);
            let (leg, task) = match entry.kind {
                SolverTaskKind::Job => {
                    let id = self.ids.jobs.reverse(entry.id)?.clone();
                    (Leg::Job(id.clone()), TaskRef::Job(id))
                }
                SolverTaskKind::Pickup => {
                    let id = self.ids.shipments.reverse(entry.id)?.clone();
                    (Leg::Pickup(id.clone()), TaskRef::Shipment(id))
                }
                SolverTaskKind::Delivery => {
                    let id = self.ids.shipments.reverse(entry.id)?.clone();
                    (Leg::Delivery(id.clone()), TaskRef::Shipment(id))
                }
            };
            unassigned_legs.push(leg);

            if let TaskRef::Shipment(id) = &task {
                if !unassigned_shipments.insert(id.clone()) {
                    continue;
                }
            }
            unassigned.push(UnassignedTask { task, reason });
        }

        self.check_accounting(&routed, &unassigned_legs)?;

        let computing_time_ms = match response.summary.computing_times {
            Some(times) => Some(times.total().ok_or(SolverResponseError::OutOfRange {
                field: "summary.computing_times",
                value: times.loading,
            })?),
            None => None,
        };

        let summary = RunSummary {
            cost: response.summary.cost,
            distance: response.summary.distance,
            duration_ms: millis("summary.duration", response.summary.duration)?,
            waiting_time_ms: millis("summary.waiting_time", response.summary.waiting_time)?,
            service_ms: millis("summary.service", response.summary.service)?,
            setup_ms: millis("summary.setup", response.summary.setup)?,
            route_count: routes.len(),
            unassigned_count: unassigned.len(),
            computing_time_ms,
        };

        info!(
            routes = summary.route_count,
            steps = steps.len(),
            unassigned = summary.unassigned_count,
            cost = summary.cost,
            "Ingested solver response"
        );

        Ok(RunResults {
            summary,
            routes,
            steps,
            unassigned,
            raw_response,
        })
    }

    fn convert_steps(
        &self,
        vehicle_id: &str,
        steps: Vec<SolverStep>,
        routed: &mut Vec<Leg>,
    ) -> Result<Vec<RouteStep>, IngestError> {
        let mut converted = Vec::with_capacity(steps.len());
        let mut previous_distance = 0;
        let mut previous_duration = 0;

        for (sequence, step) in steps.into_iter().enumerate() {
            let invalid = |reason: String| SolverResponseError::InvalidStep {
                vehicle: vehicle_id.to_string(),
                step: sequence,
                reason,
            };

            let (kind, task) = match step.kind {
                SolverStepKind::Start => (StepKind::Start, None),
                SolverStepKind::End => (StepKind::End, None),
                SolverStepKind::Job => {
                    let solver_id = step.id.ok_or_else(|| invalid("job step without id".into()))?;
                    let id = self.ids.jobs.reverse(solver_id)?.clone();
                    routed.push(Leg::Job(id.clone()));
                    (StepKind::Job, Some(TaskRef::Job(id)))
                }
                SolverStepKind::Pickup => {
                    let solver_id = step.id.ok_or_else(|| invalid("pickup step without id".into()))?;
                    let id = self.ids.shipments.reverse(solver_id)?.clone();
                    routed.push(Leg::Pickup(id.clone()));
                    (StepKind::Pickup, Some(TaskRef::Shipment(id)))
                }
                SolverStepKind::Delivery => {
                    let solver_id = step.id.ok_or_else(|| invalid("delivery step without id".into()))?;
                    let id = self.ids.shipments.reverse(solver_id)?.clone();
                    routed.push(Leg::Delivery(id.clone()));
                    (StepKind::Delivery, Some(TaskRef::Shipment(id)))
                }
            };

            if let Some(load) = &step.load {
                if load.len() != DIMENSIONS {
                    return Err(invalid(format!(
                        "load must have {DIMENSIONS} elements (got {})",
                        load.len()
                    ))
                    .into());
                }
            }

            let (Some(distance), Some(duration)) = (
                step.distance.checked_sub(previous_distance),
                step.duration.checked_sub(previous_duration),
            ) else {
                return Err(invalid("distance or duration out of range".into()).into());
            };
            if distance < 0 || duration < 0 {
                return Err(invalid("cumulative distance or duration decreased".into()).into());
            }
            previous_distance = step.distance;
            previous_duration = step.duration;

            let time = |field: &str, seconds: i64| {
                from_solver_time(seconds)
                    .ok_or_else(|| invalid(format!("{field} {seconds} is out of range")))
            };
            let arrival_ms = time("arrival", step.arrival)?;
            let duration_ms = time("duration", duration)?;
            let setup_ms = time("setup", step.setup)?;
            let service_ms = time("service", step.service)?;
            let waiting_time_ms = time("waiting_time", step.waiting_time)?;
            let violations = convert_violations(step.violations)?;

            converted.push(RouteStep {
                vehicle_id: vehicle_id.to_string(),
                sequence,
                kind,
                task,
                arrival_ms,
                location: step.location.map(|coordinate| {
                    let (longitude, latitude) = from_solver_coordinate(coordinate);
                    Coordinate {
                        longitude,
                        latitude,
                    }
                }),
                load: step.load,
                distance,
                duration_ms,
                setup_ms,
                service_ms,
                waiting_time_ms,
                violations,
            });
        }

        Ok(converted)
    }

    /// Every submitted leg must appear exactly once across routes and the
    /// unassigned list, and both legs of a shipment must share a fate.
    fn check_accounting(&self, routed: &[Leg], unassigned: &[Leg]) -> Result<(), IntegrityError> {
        let mut counts: BTreeMap<&Leg, usize> = BTreeMap::new();
        for leg in routed.iter().chain(unassigned) {
            *counts.entry(leg).or_default() += 1;
        }

        let duplicated: Vec<String> = counts
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(leg, _)| leg.label())
            .collect();
        if !duplicated.is_empty() {
            return Err(IntegrityError::Duplicated(duplicated));
        }

        let expected = self
            .ids
            .jobs
            .iter()
            .map(|(_, id)| Leg::Job(id.clone()))
            .chain(self.ids.shipments.iter().flat_map(|(_, id)| {
                [Leg::Pickup(id.clone()), Leg::Delivery(id.clone())]
            }));
        let missing: Vec<String> = expected
            .filter(|leg| !counts.contains_key(leg))
            .map(|leg| leg.label())
            .collect();
        if !missing.is_empty() {
            return Err(IntegrityError::Missing(missing));
        }

        let routed: HashSet<&Leg> = routed.iter().collect();
        for (_, id) in self.ids.shipments.iter() {
            let pickup = routed.contains(&Leg::Pickup(id.clone()));
            let delivery = routed.contains(&Leg::Delivery(id.clone()));
            if pickup != delivery {
                return Err(IntegrityError::SplitShipment(id.clone()));
            }
        }

        Ok(())
    }
}
