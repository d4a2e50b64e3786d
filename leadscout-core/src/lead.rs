//! `Lead` and `LeadResult` (spec §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classification::Classification;

/// An opaque input record. `row_index` is 1-based and stable across runs
/// of the same logical input (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub row_index: u64,
    pub director_name: String,
    /// Arbitrary passthrough fields, copied verbatim into the output sink.
    pub fields: HashMap<String, Value>,
}

impl Lead {
    pub fn new(row_index: u64, director_name: impl Into<String>) -> Self {
        Self {
            row_index,
            director_name: director_name.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Outcome of processing a single `Lead` through the classifier pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Success,
    Failed,
    Skipped,
}

/// Stable error-kind tags surfaced on a `LeadResult` (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    LlmUnavailable,
    SchemaViolation,
    ContentFiltered,
    Auth,
    StorageError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::LlmUnavailable => "llm_unavailable",
            ErrorKind::SchemaViolation => "schema_violation",
            ErrorKind::ContentFiltered => "content_filtered",
            ErrorKind::Auth => "auth",
            ErrorKind::StorageError => "storage_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A committed (or about-to-be-committed) per-row outcome. Exactly one
/// `LeadResult` exists per `(job_id, row_index)` once committed (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadResult {
    pub row_index: u64,
    pub lead_fields: HashMap<String, Value>,
    pub classification: Option<Classification>,
    pub processing_status: ProcessingStatus,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub attempts: u32,
}

impl LeadResult {
    pub fn success(row_index: u64, lead_fields: HashMap<String, Value>, classification: Classification, attempts: u32) -> Self {
        Self {
            row_index,
            lead_fields,
            classification: Some(classification),
            processing_status: ProcessingStatus::Success,
            error_kind: None,
            error_message: None,
            attempts,
        }
    }

    pub fn skipped(row_index: u64, lead_fields: HashMap<String, Value>, error_kind: ErrorKind, error_message: impl Into<String>) -> Self {
        Self {
            row_index,
            lead_fields,
            classification: None,
            processing_status: ProcessingStatus::Skipped,
            error_kind: Some(error_kind),
            error_message: Some(error_message.into()),
            attempts: 0,
        }
    }

    pub fn failed(
        row_index: u64,
        lead_fields: HashMap<String, Value>,
        classification: Classification,
        error_kind: ErrorKind,
        error_message: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            row_index,
            lead_fields,
            classification: Some(classification),
            processing_status: ProcessingStatus::Failed,
            error_kind: Some(error_kind),
            error_message: Some(error_message.into()),
            attempts,
        }
    }
}
