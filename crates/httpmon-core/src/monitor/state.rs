use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::engine::CycleReport;
use crate::definition::{Fingerprint, MonitorKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl RunnerState {
    pub fn can_transition_to(self, target: RunnerState) -> bool {
        matches!(
            (self, target),
            (RunnerState::Idle, RunnerState::Running)
                | (RunnerState::Running, RunnerState::Stopping)
                | (RunnerState::Stopping, RunnerState::Stopped)
                | (RunnerState::Stopped, RunnerState::Running)
        )
    }
}

impl std::fmt::Display for RunnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Point-in-time view of a runner, as exposed over the API.
#[derive(Debug, Clone, Serialize)]
pub struct RunnerInfo {
    pub monitor: MonitorKey,
    pub fingerprint: Fingerprint,
    pub state: RunnerState,
    pub period_ms: u64,
    pub request_count: usize,
    pub cleanup_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub cycles: u64,
    pub failed_cycles: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleReport>,
}
