//! Core types for record-sweep

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Opaque identifier of a subject, taken verbatim from the input
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    /// Create a new SubjectId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One person record to be looked up
///
/// Immutable once loaded. Each subject flows to exactly one coordinator run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Opaque identifier
    pub id: SubjectId,
    /// Family name
    pub family_name: String,
    /// Given name
    pub name: String,
    /// Patronymic (may be empty)
    pub patronymic: String,
    /// Date of birth
    pub birth_date: NaiveDate,
    /// Date of death, when known
    pub death_date: Option<NaiveDate>,
}

impl Subject {
    /// "<family> <given> <patronymic>" as the lookup API expects it
    pub fn full_name(&self) -> String {
        format!("{} {} {}", self.family_name, self.name, self.patronymic)
    }

    /// Birth date in the API's compact `YYYYMMDD` form
    pub fn compact_birth_date(&self) -> String {
        self.birth_date.format("%Y%m%d").to_string()
    }
}

/// Categorized outcome of one request attempt
#[derive(Clone, Debug, PartialEq)]
pub enum Classification {
    /// HTTP 200; carries the returned records (possibly none)
    Success(Vec<Value>),
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError(u16),
    /// Any other non-200 status
    ClientError(u16),
    /// Transport-level failure through the proxy (connect, timeout, reset)
    ConnectionFailure(String),
}

impl Classification {
    /// Short label for logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            Classification::Success(_) => "success",
            Classification::RateLimited => "rate_limited",
            Classification::ServerError(_) => "server_error",
            Classification::ClientError(_) => "client_error",
            Classification::ConnectionFailure(_) => "connection_failure",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Success(records) => write!(f, "success ({} records)", records.len()),
            Classification::RateLimited => write!(f, "rate limited (429)"),
            Classification::ServerError(code) => write!(f, "server error ({code})"),
            Classification::ClientError(code) => write!(f, "client error ({code})"),
            Classification::ConnectionFailure(reason) => write!(f, "connection failure: {reason}"),
        }
    }
}

/// One API record merged with its subject's identity fields
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRecord(Map<String, Value>);

impl ResultRecord {
    pub(crate) fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Look up one field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// All fields of the record
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Terminal state of one subject's retry loop
#[derive(Clone, Debug, PartialEq)]
pub enum SubjectOutcome {
    /// The API answered; `records` may be empty ("no match")
    Success {
        /// Records returned by the API, unmerged
        records: Vec<Value>,
        /// Attempts used, including pool-unavailable rounds
        attempts: u32,
    },
    /// The retry budget ran out
    Exhausted {
        /// Attempts used
        attempts: u32,
    },
    /// The API rejected the query with a non-retryable status
    Rejected {
        /// HTTP status returned
        status: u16,
        /// Attempts used
        attempts: u32,
    },
}

impl SubjectOutcome {
    /// Number of attempts the coordinator made
    pub fn attempts(&self) -> u32 {
        match self {
            SubjectOutcome::Success { attempts, .. }
            | SubjectOutcome::Exhausted { attempts }
            | SubjectOutcome::Rejected { attempts, .. } => *attempts,
        }
    }

    /// Records to hand to the accumulator; empty for anything but success
    pub fn into_records(self) -> Vec<Value> {
        match self {
            SubjectOutcome::Success { records, .. } => records,
            SubjectOutcome::Exhausted { .. } | SubjectOutcome::Rejected { .. } => Vec::new(),
        }
    }
}

/// Counters describing a completed run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Subjects submitted
    pub subjects: usize,
    /// Subjects whose lookup succeeded (with or without records)
    pub succeeded: usize,
    /// Subjects that ran out of attempts
    pub exhausted: usize,
    /// Subjects rejected by the API with a client error
    pub rejected: usize,
    /// Result records in the final output
    pub records: usize,
    /// Checkpoint writes, including the final one
    pub checkpoints: usize,
}

/// Events emitted while a run is in progress
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// One attempt for a subject did not succeed
    AttemptFailed {
        /// Subject being looked up
        subject_id: SubjectId,
        /// 1-based attempt number
        attempt: u32,
        /// Proxy used, if one was granted
        proxy: Option<String>,
        /// Classification label (see [`Classification::kind`])
        reason: String,
    },
    /// Every proxy was at quota when a subject asked for one
    PoolUnavailable {
        /// Subject that had to back off
        subject_id: SubjectId,
    },
    /// A proxy was removed after a connection failure
    ProxyEvicted {
        /// Evicted address
        address: String,
        /// Proxies left in the pool
        remaining: usize,
    },
    /// A subject finished successfully
    SubjectCompleted {
        /// Subject
        subject_id: SubjectId,
        /// Records returned
        records: usize,
        /// Attempts used
        attempts: u32,
    },
    /// A subject ran out of attempts
    SubjectExhausted {
        /// Subject
        subject_id: SubjectId,
        /// Attempts used
        attempts: u32,
    },
    /// A subject was rejected by the API
    SubjectRejected {
        /// Subject
        subject_id: SubjectId,
        /// HTTP status
        status: u16,
    },
    /// A checkpoint was written
    CheckpointWritten {
        /// Destination file
        path: PathBuf,
        /// Records in the snapshot
        records: usize,
    },
}
