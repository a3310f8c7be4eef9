//! Solver request document and the builder that produces it.
//!
//! The builder checks size limits first and stops there if they are
//! exceeded. Otherwise it validates every entity, collecting all errors so
//! the caller can correct a whole batch at once.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EntityKind, MappingError, ValidationError, ValidationErrors};
use crate::id_map::RunIds;
use crate::model::{Job, NewOptimizationRun, Shipment, ShipmentLeg, Skill, TaskRef, TimeWindow, Vehicle};
use crate::units::{to_solver_coordinate, to_solver_cost, to_solver_time};

pub const MAX_VEHICLES: usize = 1000;
pub const MAX_JOBS: usize = 10_000;
pub const MAX_SHIPMENTS: usize = 5_000;

/// Capacity and demand vectors are weight, volume, count.
pub const DIMENSIONS: usize = 3;

pub const MIN_PRIORITY: i64 = 0;
pub const MAX_PRIORITY: i64 = 100;

pub const DEFAULT_COST_FIXED: i64 = 0;
pub const DEFAULT_COST_PER_HOUR: i64 = 3600;
pub const DEFAULT_COST_PER_KM: i64 = 0;
pub const DEFAULT_SETUP_SECS: i64 = 0;

pub const DEFAULT_ALGORITHM: &str = "vroom";
pub const DEFAULT_THREADS: u32 = 4;

/// Per-run solver options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    pub algorithm: String,
    pub threads: u32,
    pub time_limit_secs: Option<u64>,
    /// Ask the solver for route geometry.
    pub geometry: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            algorithm: DEFAULT_ALGORITHM.to_string(),
            threads: DEFAULT_THREADS,
            time_limit_secs: None,
            geometry: false,
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

pub type SolverCoordinate = [f64; 2];
pub type SolverTimeWindow = [i64; 2];
pub type SolverAmount = [i64; DIMENSIONS];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverRequest {
    pub vehicles: Vec<SolverVehicle>,
    pub jobs: Vec<SolverJob>,
    pub shipments: Vec<SolverShipment>,
    pub options: SolverOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverOptions {
    pub algorithm: String,
    pub threads: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u64>,
    pub g: bool,
}

impl From<&RunOptions> for SolverOptions {
    fn from(options: &RunOptions) -> Self {
        Self {
            algorithm: options.algorithm.clone(),
            threads: options.threads,
            time_limit: options.time_limit_secs,
            g: options.geometry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverVehicle {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<SolverCoordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<SolverCoordinate>,
    pub capacity: SolverAmount,
    pub skills: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window: Option<SolverTimeWindow>,
    pub costs: SolverCosts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_travel_time: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverCosts {
    pub fixed: i64,
    pub per_hour: i64,
    pub per_km: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverJob {
    pub id: u64,
    pub location: SolverCoordinate,
    pub setup: i64,
    pub service: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<SolverAmount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup: Option<SolverAmount>,
    pub skills: Vec<u64>,
    pub priority: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_windows: Option<Vec<SolverTimeWindow>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverShipment {
    pub amount: SolverAmount,
    pub skills: Vec<u64>,
    pub priority: i64,
    pub pickup: SolverShipmentStep,
    pub delivery: SolverShipmentStep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverShipmentStep {
    pub id: u64,
    pub location: SolverCoordinate,
    pub setup: i64,
    pub service: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_windows: Option<Vec<SolverTimeWindow>>,
}

// ============================================================================
// Builder
// ============================================================================

/// A task no vehicle has the skills for. The solver will most likely leave
/// it unassigned, but the request is still sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeasibilityWarning {
    pub task: TaskRef,
    pub required_skills: Vec<String>,
}

impl FeasibilityWarning {
    pub fn message(&self) -> String {
        format!(
            "no vehicle has all skills required by {}: [{}]",
            self.task,
            self.required_skills.join(", ")
        )
    }
}

/// A validated request ready for dispatch.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub document: SolverRequest,
    /// `document` exactly as it goes on the wire.
    pub raw_request: serde_json::Value,
    /// Ids used to build `document`; needed again to read the response.
    pub ids: RunIds,
    pub warnings: Vec<FeasibilityWarning>,
    pub options: RunOptions,
}

impl PreparedRequest {
    /// Metadata for a new pending run carrying this request.
    pub fn new_run(&self, dataset_id: impl Into<String>) -> NewOptimizationRun {
        NewOptimizationRun {
            dataset_id: dataset_id.into(),
            algorithm: self.options.algorithm.clone(),
            raw_request: self.raw_request.clone(),
            vehicle_count: self.document.vehicles.len(),
            job_count: self.document.jobs.len(),
            shipment_count: self.document.shipments.len(),
        }
    }
}

pub struct RequestBuilder<'a> {
    vehicles: &'a [Vehicle],
    jobs: &'a [Job],
    shipments: &'a [Shipment],
    skills: &'a [Skill],
    options: RunOptions,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(
        vehicles: &'a [Vehicle],
        jobs: &'a [Job],
        shipments: &'a [Shipment],
        skills: &'a [Skill],
    ) -> Self {
        Self {
            vehicles,
            jobs,
            shipments,
            skills,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(&self) -> Result<PreparedRequest, ValidationErrors> {
        self.check_limits()?;

        let mut errors = Vec::new();
        self.check_skill_references(&mut errors);

        let ids = match RunIds::build(self.vehicles, self.jobs, self.shipments, self.skills) {
            Ok(ids) => ids,
            Err(err) => {
                errors.push(duplicate_error(err));
                self.check_duplicates(&mut errors);
                // The request is lost, but every other field still gets checked.
                RunIds::build_first_seen(self.vehicles, self.jobs, self.shipments, self.skills)
            }
        };

        let vehicles: Vec<SolverVehicle> = self
            .vehicles
            .iter()
            .filter_map(|vehicle| convert_vehicle(vehicle, &ids, &mut errors))
            .collect();
        let jobs: Vec<SolverJob> = self
            .jobs
            .iter()
            .filter_map(|job| convert_job(job, &ids, &mut errors))
            .collect();
        let shipments: Vec<SolverShipment> = self
            .shipments
            .iter()
            .filter_map(|shipment| convert_shipment(shipment, &ids, &mut errors))
            .collect();

        if !errors.is_empty() {
            let errors = dedupe(errors);
            info!(errors = errors.len(), "Solver request rejected by validation");
            return Err(ValidationErrors(errors));
        }

        let warnings = self.feasibility_warnings();
        for warning in &warnings {
            warn!(task = %warning.task, "{}", warning.message());
        }

        let document = SolverRequest {
            vehicles,
            jobs,
            shipments,
            options: SolverOptions::from(&self.options),
        };
        let raw_request = serde_json::to_value(&document).map_err(|err| {
            ValidationErrors(vec![ValidationError::dataset(
                "request",
                format!("cannot be encoded: {err}"),
            )])
        })?;

        info!(
            vehicles = document.vehicles.len(),
            jobs = document.jobs.len(),
            shipments = document.shipments.len(),
            skills = ids.skills.len(),
            warnings = warnings.len(),
            "Built solver request"
        );
        debug!(request = %raw_request, "Solver request payload");

        Ok(PreparedRequest {
            document,
            raw_request,
            ids,
            warnings,
            options: self.options.clone(),
        })
    }

    fn check_limits(&self) -> Result<(), ValidationErrors> {
        let tasks = self.jobs.len() + self.shipments.len();
        if self.vehicles.is_empty() || tasks == 0 {
            return Err(ValidationErrors(vec![ValidationError::dataset(
                "dataset",
                format!(
                    "requires at least 1 vehicle and at least 1 job or shipment (got {} vehicles, {} jobs, {} shipments)",
                    self.vehicles.len(),
                    self.jobs.len(),
                    self.shipments.len()
                ),
            )]));
        }

        let mut errors = Vec::new();
        for (field, count, limit) in [
            ("vehicles", self.vehicles.len(), MAX_VEHICLES),
            ("jobs", self.jobs.len(), MAX_JOBS),
            ("shipments", self.shipments.len(), MAX_SHIPMENTS),
        ] {
            if count > limit {
                errors.push(ValidationError::dataset(
                    field,
                    format!("{count} exceeds the solver limit of {limit}"),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    fn check_skill_references(&self, errors: &mut Vec<ValidationError>) {
        let known: HashSet<&str> = self.skills.iter().map(|skill| skill.id.as_str()).collect();
        let mut check = |entity: EntityKind, id: &str, skills: &[String]| {
            for skill in skills {
                if !known.contains(skill.as_str()) {
                    errors.push(ValidationError::new(
                        entity,
                        id,
                        "skills",
                        format!("unknown skill {skill}"),
                    ));
                }
            }
        };

        for vehicle in self.vehicles {
            check(EntityKind::Vehicle, &vehicle.id, &vehicle.skills);
        }
        for job in self.jobs {
            check(EntityKind::Job, &job.id, &job.skills);
        }
        for shipment in self.shipments {
            check(EntityKind::Shipment, &shipment.id, &shipment.skills);
        }
    }

    /// Report every duplicate id, not just the first one found.
    fn check_duplicates(&self, errors: &mut Vec<ValidationError>) {
        let vehicles = self.vehicles.iter().map(|v| v.id.as_str());
        let jobs = self.jobs.iter().map(|j| j.id.as_str());
        let shipments = self.shipments.iter().map(|s| s.id.as_str());
        let skills = self.skills.iter().map(|s| s.id.as_str());

        push_duplicates(EntityKind::Vehicle, vehicles, errors);
        push_duplicates(EntityKind::Job, jobs, errors);
        push_duplicates(EntityKind::Shipment, shipments, errors);
        push_duplicates(EntityKind::Skill, skills, errors);
    }

    fn feasibility_warnings(&self) -> Vec<FeasibilityWarning> {
        let fleet: Vec<HashSet<&str>> = self
            .vehicles
            .iter()
            .map(|vehicle| vehicle.skills.iter().map(String::as_str).collect())
            .collect();

        let covered = |required: &[String]| {
            required.is_empty()
                || fleet
                    .iter()
                    .any(|skills| required.iter().all(|skill| skills.contains(skill.as_str())))
        };

        let jobs = self.jobs.par_iter().filter_map(|job| {
            (!covered(&job.skills)).then(|| FeasibilityWarning {
                task: TaskRef::Job(job.id.clone()),
                required_skills: job.skills.clone(),
            })
        });
        let shipments = self.shipments.par_iter().filter_map(|shipment| {
            (!covered(&shipment.skills)).then(|| FeasibilityWarning {
                task: TaskRef::Shipment(shipment.id.clone()),
                required_skills: shipment.skills.clone(),
            })
        });

        jobs.chain(shipments).collect()
    }
}

fn duplicate_error(err: MappingError) -> ValidationError {
    match err {
        MappingError::DuplicateId { space, id } => {
            ValidationError::new(space.into(), id, "id", "duplicate id")
        }
        other => ValidationError::dataset("id", other.to_string()),
    }
}

fn push_duplicates<'s>(
    entity: EntityKind,
    ids: impl Iterator<Item = &'s str>,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(ValidationError::new(entity, id, "id", "duplicate id"));
        }
    }
}

fn dedupe(errors: Vec<ValidationError>) -> Vec<ValidationError> {
    let mut unique: Vec<ValidationError> = Vec::with_capacity(errors.len());
    for err in errors {
        if !unique.contains(&err) {
            unique.push(err);
        }
    }
    unique
}

// ============================================================================
// Per-entity conversion
// ============================================================================

/// Errors for one entity, tagged with its kind and id.
struct Checker<'e> {
    entity: EntityKind,
    id: &'e str,
    errors: &'e mut Vec<ValidationError>,
    failed: bool,
}

impl<'e> Checker<'e> {
    fn new(entity: EntityKind, id: &'e str, errors: &'e mut Vec<ValidationError>) -> Self {
        Self {
            entity,
            id,
            errors,
            failed: false,
        }
    }

    fn fail(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.failed = true;
        self.errors
            .push(ValidationError::new(self.entity, self.id, field, reason));
    }

    /// Both-or-neither coordinate pair.
    fn optional_coordinate(
        &mut self,
        field: &str,
        longitude: Option<f64>,
        latitude: Option<f64>,
    ) -> Option<SolverCoordinate> {
        match (longitude, latitude) {
            (None, None) => None,
            (Some(lon), Some(lat)) => self.coordinate(field, lon, lat),
            _ => {
                self.fail(field, "longitude and latitude must both be set or both be empty");
                None
            }
        }
    }

    fn required_coordinate(
        &mut self,
        field: &str,
        longitude: Option<f64>,
        latitude: Option<f64>,
    ) -> Option<SolverCoordinate> {
        if longitude.is_none() && latitude.is_none() {
            self.fail(field, "is required");
            return None;
        }
        self.optional_coordinate(field, longitude, latitude)
    }

    fn coordinate(&mut self, field: &str, lon: f64, lat: f64) -> Option<SolverCoordinate> {
        if !(lon.is_finite() && (-180.0..=180.0).contains(&lon)) {
            self.fail(field, format!("longitude {lon} out of range -180..180"));
            return None;
        }
        if !(lat.is_finite() && (-90.0..=90.0).contains(&lat)) {
            self.fail(field, format!("latitude {lat} out of range -90..90"));
            return None;
        }
        Some(to_solver_coordinate(lon, lat))
    }

    fn amount(&mut self, field: &str, values: &[i64]) -> Option<SolverAmount> {
        let amount: SolverAmount = match values.try_into() {
            Ok(amount) => amount,
            Err(_) => {
                self.fail(
                    field,
                    format!("must have exactly {DIMENSIONS} elements (got {})", values.len()),
                );
                return None;
            }
        };
        if amount.iter().any(|value| *value < 0) {
            self.fail(field, "must not contain negative values");
            return None;
        }
        Some(amount)
    }

    fn time_window(&mut self, field: &str, window: TimeWindow) -> Option<SolverTimeWindow> {
        if window.start_ms < 0 {
            self.fail(field, "start must not be negative");
            return None;
        }
        if window.start_ms >= window.end_ms {
            self.fail(field, "start must be before end");
            return None;
        }
        let (start, end) = (to_solver_time(window.start_ms), to_solver_time(window.end_ms));
        if start >= end {
            self.fail(field, "window is shorter than one solver second");
            return None;
        }
        Some([start, end])
    }

    fn time_windows(&mut self, field: &str, windows: &[TimeWindow]) -> Option<Vec<SolverTimeWindow>> {
        let converted: Vec<SolverTimeWindow> = windows
            .iter()
            .filter_map(|window| self.time_window(field, *window))
            .collect();
        (!converted.is_empty()).then_some(converted)
    }

    fn non_negative(&mut self, field: &str, value: i64) -> i64 {
        if value < 0 {
            self.fail(field, "must not be negative");
        }
        value
    }

    fn priority(&mut self, value: i64) -> i64 {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&value) {
            self.fail("priority", format!("out of range {MIN_PRIORITY}..{MAX_PRIORITY}"));
        }
        value
    }

    fn cost(&mut self, field: &str, value: Option<f64>, default: i64) -> i64 {
        match to_solver_cost(value, default) {
            Ok(cost) => cost,
            Err(err) => {
                self.fail(field, err.to_string());
                0
            }
        }
    }

    fn skills(&mut self, ids: &RunIds, skills: &[String]) -> Vec<u64> {
        // Unknown skills were already reported against this entity.
        ids.map_skills(skills).unwrap_or_else(|_| {
            self.failed = true;
            Vec::new()
        })
    }
}

fn convert_vehicle(
    vehicle: &Vehicle,
    ids: &RunIds,
    errors: &mut Vec<ValidationError>,
) -> Option<SolverVehicle> {
    let mut check = Checker::new(EntityKind::Vehicle, &vehicle.id, errors);

    let start = check.optional_coordinate("start", vehicle.start_longitude, vehicle.start_latitude);
    let end = check.optional_coordinate("end", vehicle.end_longitude, vehicle.end_latitude);
    let has_start = vehicle.start_longitude.is_some() || vehicle.start_latitude.is_some();
    let has_end = vehicle.end_longitude.is_some() || vehicle.end_latitude.is_some();
    if !has_start && !has_end {
        check.fail("start", "vehicle needs a start or an end location");
    }

    let capacity = check.amount("capacity", &vehicle.capacity);

    let time_window = match (vehicle.time_window_start_ms, vehicle.time_window_end_ms) {
        (None, None) => None,
        (Some(start_ms), Some(end_ms)) => {
            check.time_window("time_window", TimeWindow::new(start_ms, end_ms))
        }
        _ => {
            check.fail("time_window", "start and end must both be set or both be empty");
            None
        }
    };

    let costs = SolverCosts {
        fixed: check.cost("costs.fixed", vehicle.cost_fixed, DEFAULT_COST_FIXED),
        per_hour: check.cost("costs.per_hour", vehicle.cost_per_hour, DEFAULT_COST_PER_HOUR),
        per_km: check.cost("costs.per_km", vehicle.cost_per_km, DEFAULT_COST_PER_KM),
    };

    let max_distance = vehicle
        .max_distance
        .map(|value| check.non_negative("max_distance", value));
    let max_travel_time = vehicle
        .max_travel_time_ms
        .map(|value| to_solver_time(check.non_negative("max_travel_time", value)));

    let skills = check.skills(ids, &vehicle.skills);
    let id = ids.vehicles.forward(&vehicle.id).ok()?;

    if check.failed {
        return None;
    }

    Some(SolverVehicle {
        id,
        start,
        end,
        capacity: capacity?,
        skills,
        time_window,
        costs,
        max_distance,
        max_travel_time,
    })
}

fn convert_job(job: &Job, ids: &RunIds, errors: &mut Vec<ValidationError>) -> Option<SolverJob> {
    let mut check = Checker::new(EntityKind::Job, &job.id, errors);

    let location = check.required_coordinate("location", job.longitude, job.latitude);
    let setup = check.non_negative("setup", job.setup.unwrap_or(DEFAULT_SETUP_SECS));
    let service = check.non_negative("service", job.service);

    if job.delivery.is_none() && job.pickup.is_none() {
        check.fail("delivery", "either delivery or pickup must be set");
    }
    let delivery = job
        .delivery
        .as_deref()
        .and_then(|values| check.amount("delivery", values));
    let pickup = job
        .pickup
        .as_deref()
        .and_then(|values| check.amount("pickup", values));

    let priority = check.priority(job.priority);
    let time_windows = check.time_windows("time_windows", &job.time_windows);
    let skills = check.skills(ids, &job.skills);
    let id = ids.jobs.forward(&job.id).ok()?;

    if check.failed {
        return None;
    }

    Some(SolverJob {
        id,
        location: location?,
        setup,
        service,
        delivery,
        pickup,
        skills,
        priority,
        time_windows,
    })
}

fn convert_shipment(
    shipment: &Shipment,
    ids: &RunIds,
    errors: &mut Vec<ValidationError>,
) -> Option<SolverShipment> {
    let mut check = Checker::new(EntityKind::Shipment, &shipment.id, errors);
    let id = ids.shipments.forward(&shipment.id).ok()?;

    let pickup = convert_leg(&mut check, "pickup", id, &shipment.pickup);
    let delivery = convert_leg(&mut check, "delivery", id, &shipment.delivery);

    if let (Some(pickup), Some(delivery)) = (&pickup, &delivery) {
        if pickup.location == delivery.location {
            check.fail("delivery.location", "must differ from pickup location");
        }
    }

    if pickup_after_delivery(&shipment.pickup, &shipment.delivery) {
        check.fail(
            "pickup.time_windows",
            "pickup windows all start after the delivery windows end",
        );
    }

    let amount = check.amount("amount", &shipment.amount);
    let priority = check.priority(shipment.priority);
    let skills = check.skills(ids, &shipment.skills);

    if check.failed {
        return None;
    }

    Some(SolverShipment {
        amount: amount?,
        skills,
        priority,
        pickup: pickup?,
        delivery: delivery?,
    })
}

fn convert_leg(
    check: &mut Checker<'_>,
    leg: &str,
    id: u64,
    data: &ShipmentLeg,
) -> Option<SolverShipmentStep> {
    let location = check.required_coordinate(&format!("{leg}.location"), data.longitude, data.latitude);
    let setup = check.non_negative(
        &format!("{leg}.setup"),
        data.setup.unwrap_or(DEFAULT_SETUP_SECS),
    );
    let service = check.non_negative(&format!("{leg}.service"), data.service);
    let time_windows = check.time_windows(&format!("{leg}.time_windows"), &data.time_windows);

    Some(SolverShipmentStep {
        id,
        location: location?,
        setup,
        service,
        time_windows,
    })
}

/// True when every pickup window opens at or after every delivery window
/// has closed.
fn pickup_after_delivery(pickup: &ShipmentLeg, delivery: &ShipmentLeg) -> bool {
    let earliest_pickup = pickup.time_windows.iter().map(|w| w.start_ms).min();
    let latest_delivery = delivery.time_windows.iter().map(|w| w.end_ms).max();
    match (earliest_pickup, latest_delivery) {
        (Some(pickup_start), Some(delivery_end)) => pickup_start >= delivery_end,
        _ => false,
    }
}
