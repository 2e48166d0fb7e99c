use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::ExecuteError;
use super::executor::execute;
use crate::config::ControllerConfig;
use crate::definition::{MonitorDefinition, MonitorKey, RequestDefinition};
use crate::metrics::{MetricsSink, ResponseRecord};
use crate::variables::{Variable, VariableTable};

/// Built-in variable holding a fresh random token every cycle.
pub const RANDOM_TOKEN_VAR: &str = "random-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Primary,
    Cleanup,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestReport {
    pub name: String,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub elapsed_ms: u64,
}

impl RequestReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one cycle, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub monitor: MonitorKey,
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub requests: Vec<RequestReport>,
}

impl CycleReport {
    pub fn succeeded(&self) -> bool {
        self.requests.iter().all(RequestReport::is_ok)
    }

    pub fn primary_failed(&self) -> bool {
        self.requests
            .iter()
            .any(|r| r.phase == Phase::Primary && !r.is_ok())
    }

    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &RequestReport> {
        self.requests.iter().filter(move |r| r.phase == phase)
    }
}

/// Runs monitor cycles. Shared by every runner.
pub struct Engine {
    client: Client,
    metrics: Arc<dyn MetricsSink>,
    default_request_timeout: Duration,
    globals: BTreeMap<String, String>,
}

impl Engine {
    pub fn new(client: Client, metrics: Arc<dyn MetricsSink>, config: &ControllerConfig) -> Self {
        Self {
            client,
            metrics,
            default_request_timeout: config.default_request_timeout,
            globals: config.globals.clone(),
        }
    }

    /// A fresh table: the random token, controller globals, then the
    /// monitor's own globals. All of them are `provided`.
    pub fn seed_table(&self, definition: &MonitorDefinition) -> VariableTable {
        let mut table = VariableTable::new();
        table.push(Variable::provided(RANDOM_TOKEN_VAR, random_token(8)));
        for (name, value) in self.globals.iter().chain(&definition.globals) {
            table.push(Variable::provided(name.clone(), value.clone()));
        }
        table
    }

    /// Run the primary sequence until its first failure, then the whole
    /// cleanup sequence.
    pub async fn execute_cycle(&self, definition: &MonitorDefinition) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", monitor = %definition.key, cycle = %cycle_id);
        self.run_cycle(definition, cycle_id).instrument(span).await
    }

    async fn run_cycle(&self, definition: &MonitorDefinition, cycle_id: Uuid) -> CycleReport {
        let mut report = CycleReport {
            monitor: definition.key.clone(),
            cycle_id,
            started_at: Utc::now(),
            requests: Vec::with_capacity(definition.requests.len() + definition.cleanup.len()),
        };
        let mut table = self.seed_table(definition);

        for request in &definition.requests {
            let outcome = self
                .run_request(&definition.key, request, Phase::Primary, &mut table)
                .await;
            let failed = !outcome.is_ok();
            report.requests.push(outcome);
            if failed {
                break;
            }
        }

        for request in &definition.cleanup {
            let outcome = self
                .run_request(&definition.key, request, Phase::Cleanup, &mut table)
                .await;
            report.requests.push(outcome);
        }

        debug!(
            requests = report.requests.len(),
            ok = report.succeeded(),
            "Cycle finished"
        );
        report
    }

    async fn run_request(
        &self,
        key: &MonitorKey,
        request: &RequestDefinition,
        phase: Phase,
        table: &mut VariableTable,
    ) -> RequestReport {
        debug!(request = %request.name, ?phase, "Executing request");
        let started = Instant::now();
        let result = execute(request, table, &self.client, self.default_request_timeout).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let status = match &result {
            Ok(response) => Some(response.status),
            Err(e) => e.reported_status(),
        };
        self.metrics.record(&ResponseRecord {
            monitor: key,
            request: &request.name,
            target_service: &request.target_service,
            url: &request.url,
            status,
        });

        let error = result.err();
        if let Some(e) = &error {
            log_failure(request, phase, e);
        }

        RequestReport {
            name: request.name.clone(),
            phase,
            status,
            error_kind: error.as_ref().map(ExecuteError::kind),
            error: error.map(|e| e.to_string()),
            elapsed_ms,
        }
    }
}

fn log_failure(request: &RequestDefinition, phase: Phase, error: &ExecuteError) {
    match phase {
        Phase::Primary => warn!(
            request = %request.name,
            target_service = %request.target_service,
            kind = error.kind(),
            error = %error,
            "Failed to complete request, skipping remaining requests"
        ),
        Phase::Cleanup => warn!(
            request = %request.name,
            target_service = %request.target_service,
            kind = error.kind(),
            error = %error,
            "Failed to complete cleanup request"
        ),
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
