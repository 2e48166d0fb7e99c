use thiserror::Error;

use crate::metrics::TRANSPORT_FAILURE_STATUS;
use crate::variables::ExtractionError;

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("cannot build request: {reason}")]
    Build { reason: String },
    #[error("request to {url} failed: {reason}")]
    Transport {
        url: String,
        reason: String,
        timed_out: bool,
    },
    #[error("unexpected status {status}, expected {}", describe_expected(.expected))]
    UnexpectedStatus { status: u16, expected: Vec<u16> },
    #[error("status {status}: {source}")]
    Extraction {
        status: u16,
        #[source]
        source: ExtractionError,
    },
}

fn describe_expected(expected: &[u16]) -> String {
    if expected.is_empty() {
        "2xx".to_string()
    } else {
        format!("{:?}", expected)
    }
}

impl ExecuteError {
    pub(crate) fn build(reason: impl Into<String>) -> Self {
        Self::Build {
            reason: reason.into(),
        }
    }

    /// Status to report for this failure: the real status when a response
    /// arrived, the reserved failure status when none did, `None` when the
    /// request was never sent.
    pub fn reported_status(&self) -> Option<u16> {
        match self {
            Self::Build { .. } => None,
            Self::Transport { .. } => Some(TRANSPORT_FAILURE_STATUS),
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Extraction { status, .. } => Some(*status),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Build { .. } => "build",
            Self::Transport { .. } => "transport",
            Self::UnexpectedStatus { .. } => "unexpected_status",
            Self::Extraction { .. } => "extraction",
        }
    }
}
