//! Serializable outcome of one verification.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, ErrorKind};

/// Why a verification failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    /// Error classification.
    pub kind: ErrorKind,
    /// Located, human-readable description.
    pub message: String,
}

/// Result of checking one event log against one policy.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// Policy name.
    pub policy: String,
    /// When the check finished.
    pub verified_at: DateTime<Utc>,
    /// Number of events validated.
    pub events: usize,
    /// Whether the log was accepted.
    pub passed: bool,
    /// Failure details when rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSummary>,
}

impl VerificationReport {
    /// Summarise a verification outcome.
    pub fn new(policy: &str, events: usize, outcome: &Result<(), Error>) -> Self {
        Self {
            policy: policy.to_owned(),
            verified_at: Utc::now(),
            events,
            passed: outcome.is_ok(),
            failure: outcome.as_ref().err().map(|e| FailureSummary {
                kind: e.kind(),
                message: e.to_string(),
            }),
        }
    }
}
