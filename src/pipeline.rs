//! One optimization run end to end: repository, request, solver, results.
//!
//! Each call to [`Pipeline::run`] builds its own ids and run record, so
//! concurrent runs over the same dataset never share state.

use tracing::{error, info, warn};

use crate::error::{PipelineError, TransportError};
use crate::model::{OptimizationRun, RunResults, RunStatus};
use crate::request::{FeasibilityWarning, RequestBuilder, RunOptions};
use crate::response::ResponseParser;
use crate::traits::{EntityRepository, SolverTransport};

/// A completed run and what it produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: OptimizationRun,
    pub results: RunResults,
    pub warnings: Vec<FeasibilityWarning>,
}

pub struct Pipeline<'a, R, T> {
    repository: &'a R,
    transport: &'a T,
    options: RunOptions,
}

impl<'a, R, T> Pipeline<'a, R, T>
where
    R: EntityRepository,
    T: SolverTransport,
{
    pub fn new(repository: &'a R, transport: &'a T) -> Self {
        Self {
            repository,
            transport,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the dataset through the solver.
    ///
    /// Validation failures return before any run record exists. Later
    /// failures mark the run failed and persist no results.
    pub fn run(&self, dataset_id: &str) -> Result<RunOutcome, PipelineError> {
        let vehicles = self.repository.list_vehicles(dataset_id)?;
        let jobs = self.repository.list_jobs(dataset_id)?;
        let shipments = self.repository.list_shipments(dataset_id)?;
        let skills = self.repository.list_skills(dataset_id)?;

        let prepared = RequestBuilder::new(&vehicles, &jobs, &shipments, &skills)
            .with_options(self.options.clone())
            .build()?;

        let meta = prepared.new_run(dataset_id);
        let run_id = self.repository.create_optimization_run(&meta)?;
        let mut run = OptimizationRun::new(run_id, meta);
        info!(run_id = %run.id, dataset_id, "Created optimization run");

        if let Err(err) = self.transition(&mut run, RunStatus::Running) {
            return Err(self.fail(&mut run, err, None));
        }

        let body = match self.transport.dispatch(&prepared.raw_request) {
            Ok(body) => body,
            Err(err) => {
                let raw = match &err {
                    TransportError::Status { body, .. } => Some(raw_value(body)),
                    _ => None,
                };
                return Err(self.fail(&mut run, err.into(), raw));
            }
        };

        let results = match ResponseParser::new(&prepared.ids).ingest(&body) {
            Ok(results) => results,
            Err(err) => return Err(self.fail(&mut run, err.into(), Some(raw_value(&body)))),
        };

        if let Err(err) = self.repository.persist_results(&run.id, &results) {
            return Err(self.fail(&mut run, err.into(), Some(results.raw_response.clone())));
        }

        if let Err(err) = self.transition(&mut run, RunStatus::Completed) {
            // Results of a run that never completed must not stay visible.
            if let Err(discard) = self.repository.discard_results(&run.id) {
                error!(run_id = %run.id, error = %discard, "Could not discard results");
            }
            return Err(self.fail(&mut run, err, Some(results.raw_response.clone())));
        }
        run.raw_response = Some(results.raw_response.clone());
        run.summary = Some(results.summary.clone());

        info!(
            run_id = %run.id,
            routes = results.summary.route_count,
            unassigned = results.summary.unassigned_count,
            "Optimization run completed"
        );

        Ok(RunOutcome {
            run,
            results,
            warnings: prepared.warnings,
        })
    }

    /// Move the run to `next` in memory and in the repository, or in
    /// neither.
    fn transition(&self, run: &mut OptimizationRun, next: RunStatus) -> Result<(), PipelineError> {
        let previous = run.status;
        run.transition(next)?;
        if let Err(err) = self.repository.mark_run_status(&run.id, next, None) {
            run.status = previous;
            return Err(err.into());
        }
        info!(run_id = %run.id, status = %next, "Run status changed");
        Ok(())
    }

    /// Mark the run failed and hand back the error that caused it.
    ///
    /// Whatever the solver answered is kept on the run.
    fn fail(
        &self,
        run: &mut OptimizationRun,
        cause: PipelineError,
        raw_response: Option<serde_json::Value>,
    ) -> PipelineError {
        let message = cause.to_string();
        error!(run_id = %run.id, error = %message, "Optimization run failed");

        if let Some(raw) = raw_response {
            if let Err(err) = self.repository.record_raw_response(&run.id, &raw) {
                error!(run_id = %run.id, error = %err, "Could not record solver response");
            }
            run.raw_response = Some(raw);
        }

        if let Err(err) = run.transition(RunStatus::Failed) {
            warn!(error = %err, "Run already terminal");
            return cause;
        }
        run.error = Some(message.clone());

        if let Err(err) = self
            .repository
            .mark_run_status(&run.id, RunStatus::Failed, Some(&message))
        {
            error!(run_id = %run.id, error = %err, "Could not mark run failed");
        }
        cause
    }
}

/// A solver body as JSON, or as a JSON string when it is not JSON at all.
fn raw_value(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|_| serde_json::Value::String(body.to_string()))
}
