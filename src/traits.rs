//! Seams between the pipeline and its collaborators.
//!
//! Storage and the solver process live outside this crate. Hosts implement
//! these traits for their own persistence layer and transport.

use std::hash::Hash;

use crate::error::{RepositoryError, TransportError};
use crate::model::{Job, NewOptimizationRun, RunId, RunResults, RunStatus, Shipment, Skill, Vehicle};

/// Unique identifier for planner entities.
pub trait Id: Clone + Eq + Hash {}

impl<T> Id for T where T: Clone + Eq + Hash {}

/// Reads planning entities and stores run records and results.
pub trait EntityRepository {
    fn list_vehicles(&self, dataset_id: &str) -> Result<Vec<Vehicle>, RepositoryError>;

    fn list_jobs(&self, dataset_id: &str) -> Result<Vec<Job>, RepositoryError>;

    fn list_shipments(&self, dataset_id: &str) -> Result<Vec<Shipment>, RepositoryError>;

    fn list_skills(&self, dataset_id: &str) -> Result<Vec<Skill>, RepositoryError>;

    /// Create a pending run record and return its id.
    fn create_optimization_run(&self, run: &NewOptimizationRun) -> Result<RunId, RepositoryError>;

    /// Store an ingested result set atomically.
    fn persist_results(&self, run_id: &str, results: &RunResults) -> Result<(), RepositoryError>;

    /// Remove a result set stored by `persist_results`. Called only when the
    /// run could not be marked completed afterwards.
    fn discard_results(&self, run_id: &str) -> Result<(), RepositoryError>;

    fn mark_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// Keep the solver's verbatim answer on a run that failed after it
    /// replied.
    fn record_raw_response(
        &self,
        run_id: &str,
        raw_response: &serde_json::Value,
    ) -> Result<(), RepositoryError>;
}

/// Delivers a request document to the solver and returns the raw body.
pub trait SolverTransport {
    fn dispatch(&self, request: &serde_json::Value) -> Result<String, TransportError>;
}
