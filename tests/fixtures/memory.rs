//! In-memory collaborators: a repository and a scripted solver transport.

use std::collections::HashMap;
use std::sync::Mutex;

use vrp_bridge::error::{RepositoryError, TransportError};
use vrp_bridge::model::{
    Job, NewOptimizationRun, OptimizationRun, RunId, RunResults, RunStatus, Shipment, Skill, Vehicle,
};
use vrp_bridge::traits::{EntityRepository, SolverTransport};

#[derive(Debug, Default, Clone)]
pub struct Dataset {
    pub vehicles: Vec<Vehicle>,
    pub jobs: Vec<Job>,
    pub shipments: Vec<Shipment>,
    pub skills: Vec<Skill>,
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    datasets: HashMap<String, Dataset>,
    runs: Mutex<Vec<OptimizationRun>>,
    results: Mutex<HashMap<RunId, RunResults>>,
    status_log: Mutex<Vec<(RunId, RunStatus, Option<String>)>>,
    fail_persist: bool,
    fail_status: Option<RunStatus>,
}

impl MemoryRepository {
    pub fn with_dataset(id: &str, dataset: Dataset) -> Self {
        let mut datasets = HashMap::new();
        datasets.insert(id.to_string(), dataset);
        Self {
            datasets,
            ..Default::default()
        }
    }

    pub fn failing_persist(mut self) -> Self {
        self.fail_persist = true;
        self
    }

    /// Refuse every write of `status`.
    pub fn failing_status(mut self, status: RunStatus) -> Self {
        self.fail_status = Some(status);
        self
    }

    pub fn runs(&self) -> Vec<OptimizationRun> {
        self.runs.lock().unwrap().clone()
    }

    pub fn results(&self, run_id: &str) -> Option<RunResults> {
        self.results.lock().unwrap().get(run_id).cloned()
    }

    pub fn result_count(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    pub fn statuses(&self, run_id: &str) -> Vec<RunStatus> {
        self.status_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| id == run_id)
            .map(|(_, status, _)| *status)
            .collect()
    }

    pub fn last_error(&self, run_id: &str) -> Option<String> {
        self.status_log
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _, _)| id == run_id)
            .and_then(|(_, _, error)| error.clone())
    }

    fn dataset(&self, dataset_id: &str, operation: &'static str) -> Result<&Dataset, RepositoryError> {
        self.datasets
            .get(dataset_id)
            .ok_or_else(|| RepositoryError::new(operation, format!("unknown dataset {dataset_id}")))
    }
}

impl EntityRepository for MemoryRepository {
    fn list_vehicles(&self, dataset_id: &str) -> Result<Vec<Vehicle>, RepositoryError> {
        Ok(self.dataset(dataset_id, "list_vehicles")?.vehicles.clone())
    }

    fn list_jobs(&self, dataset_id: &str) -> Result<Vec<Job>, RepositoryError> {
        Ok(self.dataset(dataset_id, "list_jobs")?.jobs.clone())
    }

    fn list_shipments(&self, dataset_id: &str) -> Result<Vec<Shipment>, RepositoryError> {
        Ok(self.dataset(dataset_id, "list_shipments")?.shipments.clone())
    }

    fn list_skills(&self, dataset_id: &str) -> Result<Vec<Skill>, RepositoryError> {
        Ok(self.dataset(dataset_id, "list_skills")?.skills.clone())
    }

    fn create_optimization_run(&self, run: &NewOptimizationRun) -> Result<RunId, RepositoryError> {
        let mut runs = self.runs.lock().unwrap();
        let id = format!("run_{}", runs.len() + 1);
        runs.push(OptimizationRun::new(id.clone(), run.clone()));
        Ok(id)
    }

    fn persist_results(&self, run_id: &str, results: &RunResults) -> Result<(), RepositoryError> {
        if self.fail_persist {
            return Err(RepositoryError::new("persist_results", "disk full"));
        }
        self.results
            .lock()
            .unwrap()
            .insert(run_id.to_string(), results.clone());
        Ok(())
    }

    fn mark_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        if self.fail_status == Some(status) {
            return Err(RepositoryError::new("mark_run_status", "connection reset"));
        }
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|run| run.id == run_id)
            .ok_or_else(|| RepositoryError::new("mark_run_status", format!("unknown run {run_id}")))?;
        run.status = status;
        run.error = error.map(str::to_string);
        self.status_log
            .lock()
            .unwrap()
            .push((run_id.to_string(), status, error.map(str::to_string)));
        Ok(())
    }

    fn discard_results(&self, run_id: &str) -> Result<(), RepositoryError> {
        self.results.lock().unwrap().remove(run_id);
        Ok(())
    }

    fn record_raw_response(
        &self,
        run_id: &str,
        raw_response: &serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|run| run.id == run_id)
            .ok_or_else(|| RepositoryError::new("record_raw_response", format!("unknown run {run_id}")))?;
        run.raw_response = Some(raw_response.clone());
        Ok(())
    }
}

/// What the scripted transport answers with.
pub enum Reply {
    Body(String),
    Timeout,
    Status(u16, String),
}

/// Records every request and answers with a fixed reply.
pub struct ScriptedTransport {
    reply: Reply,
    requests: Mutex<Vec<serde_json::Value>>,
}

impl ScriptedTransport {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn body(body: impl Into<String>) -> Self {
        Self::new(Reply::Body(body.into()))
    }

    pub fn requests(&self) -> Vec<serde_json::Value> {
        self.requests.lock().unwrap().clone()
    }
}

impl SolverTransport for ScriptedTransport {
    fn dispatch(&self, request: &serde_json::Value) -> Result<String, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Reply::Body(body) => Ok(body.clone()),
            Reply::Timeout => Err(TransportError::Timeout {
                url: "http://solver.test/optimize".to_string(),
                timeout_secs: 300,
            }),
            Reply::Status(status, body) => Err(TransportError::Status {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}
