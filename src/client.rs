//! Blocking HTTP client for the external solver.
//!
//! One POST per run, bounded by the configured timeout. No retries: the
//! caller decides whether to run again.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::traits::SolverTransport;

pub const DEFAULT_SOLVER_URL: &str = "http://localhost:30010";
pub const DEFAULT_ENDPOINT_PATH: &str = "/optimize";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_USER_AGENT: &str = "vrp-bridge/0.1";

pub const SOLVER_URL_ENV: &str = "VROOM_API_URL";
pub const SOLVER_TIMEOUT_ENV: &str = "VROOM_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    pub base_url: String,
    pub endpoint_path: String,
    pub timeout_secs: u64,
    pub health_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SOLVER_URL.to_string(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            health_timeout_secs: DEFAULT_HEALTH_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SolverConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Defaults overridden by `VROOM_API_URL` and `VROOM_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(SOLVER_URL_ENV).filter(|url| !url.trim().is_empty()) {
            config.base_url = url;
        }
        if let Some(raw) = lookup(SOLVER_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid {SOLVER_TIMEOUT_ENV}"),
            }
        }
        config
    }

    #[must_use]
    pub fn with_endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.endpoint_path = path.into();
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Full URL requests are posted to.
    pub fn endpoint_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.endpoint_path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn root_url(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct SolverClient {
    config: SolverConfig,
    client: reqwest::blocking::Client,
}

impl SolverClient {
    pub fn new(config: SolverConfig) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(TransportError::Client)?;

        info!(url = %config.endpoint_url(), timeout_secs = config.timeout_secs, "Solver client initialized");
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Whether the solver is up. It replies to unknown GETs with 404, or
    /// with a 200 "Cannot GET /" page; anything else answering on the port
    /// is not the solver.
    pub fn health_check(&self) -> bool {
        let url = self.config.root_url();
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(self.config.health_timeout_secs))
            .send();

        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = if status == 200 {
                    resp.text().unwrap_or_default()
                } else {
                    String::new()
                };
                let healthy = is_healthy(status, &body);
                info!(%url, status, healthy, "Solver health check");
                healthy
            }
            Err(err) => {
                warn!(%url, error = %err, "Solver health check failed");
                false
            }
        }
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
                timeout_secs: self.config.timeout_secs,
            }
        } else if err.is_connect() {
            TransportError::Connect {
                url: url.to_string(),
                source: err,
            }
        } else {
            TransportError::Request {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

fn is_healthy(status: u16, body: &str) -> bool {
    match status {
        404 => true,
        200 => body.contains("Cannot GET"),
        _ => false,
    }
}

impl SolverTransport for SolverClient {
    fn dispatch(&self, request: &serde_json::Value) -> Result<String, TransportError> {
        let url = self.config.endpoint_url();
        info!(%url, timeout_secs = self.config.timeout_secs, "Dispatching solver request");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .map_err(|err| self.classify(&url, err))?;

        let status = response.status();
        let body = response.text().map_err(|err| self.classify(&url, err))?;
        info!(status = status.as_u16(), bytes = body.len(), "Solver responded");

        if !status.is_success() {
            error!(status = status.as_u16(), body = %body, "Solver returned an error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(body = %body, "Solver response body");
        Ok(body)
    }
}
