//! Error taxonomy for the solver pipeline and the report that aggregates it.
//!
//! Validation errors are recoverable and collected in bulk. Every other kind
//! aborts the run it occurs in.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::model::RunStatus;

/// Which kind of planning entity an issue refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Dataset,
    Vehicle,
    Job,
    Shipment,
    Skill,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Dataset => "dataset",
            EntityKind::Vehicle => "vehicle",
            EntityKind::Job => "job",
            EntityKind::Shipment => "shipment",
            EntityKind::Skill => "skill",
        })
    }
}

/// Solver id spaces. Each is numbered independently from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSpace {
    Vehicle,
    Job,
    Shipment,
    Skill,
}

impl fmt::Display for IdSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdSpace::Vehicle => "vehicle",
            IdSpace::Job => "job",
            IdSpace::Shipment => "shipment",
            IdSpace::Skill => "skill",
        })
    }
}

impl From<IdSpace> for EntityKind {
    fn from(space: IdSpace) -> Self {
        match space {
            IdSpace::Vehicle => EntityKind::Vehicle,
            IdSpace::Job => EntityKind::Job,
            IdSpace::Shipment => EntityKind::Shipment,
            IdSpace::Skill => EntityKind::Skill,
        }
    }
}

/// A bad or missing input field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity} {}: {field}: {reason}", .entity_id.as_deref().unwrap_or("-"))]
pub struct ValidationError {
    pub entity: EntityKind,
    pub entity_id: Option<String>,
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(
        entity: EntityKind,
        entity_id: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            entity,
            entity_id: Some(entity_id.into()),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// An issue with the dataset as a whole rather than one entity.
    pub fn dataset(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            entity: EntityKind::Dataset,
            entity_id: None,
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Every validation error found while building one request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} validation error(s), first: {}", .0.len(), .0.first().map(ToString::to_string).unwrap_or_default())]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// Errors reported for one entity.
    pub fn for_entity<'a>(&'a self, entity_id: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.0
            .iter()
            .filter(move |err| err.entity_id.as_deref() == Some(entity_id))
    }
}

/// Request and response id spaces disagree. Always a defect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("unknown {space} solver id {solver_id}")]
    UnknownSolverId { space: IdSpace, solver_id: u64 },

    #[error("{space} id {id} is not registered for this run")]
    UnknownPersistentId { space: IdSpace, id: String },

    #[error("duplicate {space} id {id}")]
    DuplicateId { space: IdSpace, id: String },
}

/// The solver could not be reached or answered with a non-2xx status.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("cannot connect to solver at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("solver request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("solver returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("solver request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// The solver answered, but not with a usable result.
#[derive(Debug, Error)]
pub enum SolverResponseError {
    #[error("solver response is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("solver response is missing `{0}`")]
    MissingField(&'static str),

    #[error("solver response envelope is malformed: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("solver rejected the request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("solver response field `{field}` is out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("route of vehicle {vehicle}, step {step}: {reason}")]
    InvalidStep {
        vehicle: String,
        step: usize,
        reason: String,
    },
}

/// Task accounting between request and response does not balance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("tasks missing from solver response: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("tasks reported more than once: {}", .0.join(", "))]
    Duplicated(Vec<String>),

    #[error("shipment {0} is split between a route and the unassigned list")]
    SplitShipment(String),

    #[error("vehicle {0} has more than one route")]
    DuplicateRoute(String),
}

/// Failure reported by the entity repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("repository operation `{operation}` failed: {message}")]
pub struct RepositoryError {
    pub operation: &'static str,
    pub message: String,
}

impl RepositoryError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("run {run_id} cannot move from {from} to {to}")]
pub struct StatusTransitionError {
    pub run_id: String,
    pub from: RunStatus,
    pub to: RunStatus,
}

/// Fatal failures while ingesting a solver response.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    SolverResponse(#[from] SolverResponseError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    SolverResponse(#[from] SolverResponseError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Status(#[from] StatusTransitionError),
}

impl From<IngestError> for PipelineError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::SolverResponse(err) => PipelineError::SolverResponse(err),
            IngestError::Mapping(err) => PipelineError::Mapping(err),
            IngestError::Integrity(err) => PipelineError::Integrity(err),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Mapping(_) => ErrorKind::Mapping,
            PipelineError::Transport(_) => ErrorKind::Transport,
            PipelineError::SolverResponse(_) => ErrorKind::SolverResponse,
            PipelineError::Integrity(_) => ErrorKind::Integrity,
            PipelineError::Repository(_) | PipelineError::Status(_) => ErrorKind::Repository,
        }
    }

    /// Validation failures can be fixed by the caller; transport failures
    /// may be retried. Everything else is a defect.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_) | PipelineError::Transport(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Mapping,
    Transport,
    SolverResponse,
    Integrity,
    Repository,
}

/// One reportable issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: ErrorKind,
    pub message: String,
    pub entity_id: Option<String>,
    pub field: Option<String>,
}

impl Issue {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            entity_id: None,
            field: None,
        }
    }
}

impl From<&ValidationError> for Issue {
    fn from(err: &ValidationError) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: err.to_string(),
            entity_id: err.entity_id.clone(),
            field: Some(err.field.clone()),
        }
    }
}

impl From<&MappingError> for Issue {
    fn from(err: &MappingError) -> Self {
        let entity_id = match err {
            MappingError::UnknownPersistentId { id, .. } | MappingError::DuplicateId { id, .. } => {
                Some(id.clone())
            }
            MappingError::UnknownSolverId { .. } => None,
        };
        Self {
            kind: ErrorKind::Mapping,
            message: err.to_string(),
            entity_id,
            field: None,
        }
    }
}

/// Collects issues of every kind for uniform reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    issues: Vec<Issue>,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: impl Into<Issue>) {
        self.issues.push(issue.into());
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.issues.iter().filter(|issue| issue.kind == kind).count()
    }

    /// Whether anything other than validation issues was recorded.
    pub fn has_fatal(&self) -> bool {
        self.issues.iter().any(|issue| issue.kind != ErrorKind::Validation)
    }
}

impl From<&ValidationErrors> for ErrorReport {
    fn from(errors: &ValidationErrors) -> Self {
        Self {
            issues: errors.iter().map(Issue::from).collect(),
        }
    }
}

impl From<&PipelineError> for ErrorReport {
    fn from(err: &PipelineError) -> Self {
        let mut report = ErrorReport::new();
        match err {
            PipelineError::Validation(errors) => return ErrorReport::from(errors),
            PipelineError::Mapping(err) => report.push(err),
            other => report.push(Issue::new(other.kind(), other.to_string())),
        }
        report
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.issues {
            writeln!(f, "[{:?}] {}", issue.kind, issue.message)?;
        }
        Ok(())
    }
}
