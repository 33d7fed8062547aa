//! Core data model: identifier records, fetch outcomes, sessions and reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One data row from the uploaded spreadsheet
///
/// Records are created once by the spreadsheet reader and consumed read-only
/// by the orchestrator. Identifier uniqueness is NOT required: duplicate
/// identifiers are processed independently, each tied to its own `row_index`
/// so the report stays traceable per row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierRecord {
    /// 1-based data-row number, matching the original spreadsheet
    pub row_index: u32,

    /// The identifier cell, trimmed. Empty for blank cells — such rows are
    /// kept so the report row count equals the input data-row count.
    pub identifier: String,

    /// Extra columns from the same row, keyed by header name
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl IdentifierRecord {
    /// Create a record with no metadata
    pub fn new(row_index: u32, identifier: impl Into<String>) -> Self {
        Self {
            row_index,
            identifier: identifier.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// True if the identifier cell was blank or whitespace-only
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.identifier.is_empty()
    }
}

/// A resolved catalog entry returned by a successful lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// The identifier the lookup was performed for
    pub identifier: String,
    /// Catalog filename of the matched image
    pub filename: String,
    /// Direct download URL for the image binary
    pub url: String,
}

/// Terminal classification of one record's resolution attempt
///
/// Exactly one outcome exists per input record. Production order is
/// unconstrained (workers run concurrently); reporting order is restored by
/// the packager from `record.row_index`.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Lookup and fetch both succeeded
    Success {
        /// The input record this outcome belongs to
        record: IdentifierRecord,
        /// Raw image bytes as returned by the catalog
        image_bytes: Vec<u8>,
        /// Content type reported by the catalog (e.g. "image/jpeg")
        content_type: String,
    },
    /// The catalog has no image for this identifier
    NotFound {
        /// The input record this outcome belongs to
        record: IdentifierRecord,
        /// Human-readable explanation
        reason: String,
        /// Other variants of the same base product found in the catalog
        alternatives: Vec<String>,
    },
    /// All retry attempts were exhausted on a recoverable error
    TransientFailure {
        /// The input record this outcome belongs to
        record: IdentifierRecord,
        /// Human-readable explanation of the final failure
        reason: String,
        /// Number of attempts actually made
        attempts: u32,
    },
    /// The identifier was blank or malformed; the API was never contacted
    Invalid {
        /// The input record this outcome belongs to
        record: IdentifierRecord,
        /// Human-readable explanation
        reason: String,
    },
    /// The run was cancelled before this record was dispatched
    Cancelled {
        /// The input record this outcome belongs to
        record: IdentifierRecord,
    },
}

impl FetchOutcome {
    /// The input record this outcome belongs to
    #[must_use]
    pub fn record(&self) -> &IdentifierRecord {
        match self {
            FetchOutcome::Success { record, .. }
            | FetchOutcome::NotFound { record, .. }
            | FetchOutcome::TransientFailure { record, .. }
            | FetchOutcome::Invalid { record, .. }
            | FetchOutcome::Cancelled { record } => record,
        }
    }

    /// The stable status label for this outcome
    #[must_use]
    pub fn status(&self) -> RowStatus {
        match self {
            FetchOutcome::Success { .. } => RowStatus::Ok,
            FetchOutcome::NotFound { .. } => RowStatus::NotFound,
            FetchOutcome::TransientFailure { .. } => RowStatus::Failed,
            FetchOutcome::Invalid { .. } => RowStatus::Invalid,
            FetchOutcome::Cancelled { .. } => RowStatus::Cancelled,
        }
    }
}

/// Stable per-row status label used in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    /// Image retrieved and included in the archive
    Ok,
    /// The catalog has no match for the identifier
    NotFound,
    /// A recoverable error persisted through all retry attempts
    Failed,
    /// Blank or malformed identifier; never sent to the API
    Invalid,
    /// Row was not dispatched before cancellation
    Cancelled,
}

impl RowStatus {
    /// The snake_case label used in serialized reports
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Ok => "ok",
            RowStatus::NotFound => "not_found",
            RowStatus::Failed => "failed",
            RowStatus::Invalid => "invalid",
            RowStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-scoped aggregate of one pipeline invocation
///
/// Owned exclusively by one run and discarded after the result bundle is
/// handed to the caller; nothing is persisted across invocations.
#[derive(Debug)]
pub struct FetchSession {
    /// Input records in original spreadsheet order
    pub records: Vec<IdentifierRecord>,
    /// One outcome per record, index-aligned with `records`
    pub outcomes: Vec<FetchOutcome>,
    /// When the orchestrator started processing
    pub started_at: DateTime<Utc>,
    /// When the last outcome was produced
    pub completed_at: DateTime<Utc>,
}

impl FetchSession {
    /// Number of outcomes with the given status
    #[must_use]
    pub fn count(&self, status: RowStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status() == status).count()
    }
}

/// One row of the final status report, mirroring an input row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    /// 1-based spreadsheet data-row number
    pub row_index: u32,
    /// The identifier as read from the spreadsheet (possibly empty)
    pub identifier: String,
    /// Stable status label
    pub status: RowStatus,
    /// Human-readable reason string
    pub reason: String,
    /// Extra columns echoed from the input row
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// The downloadable result of one pipeline run
#[derive(Debug)]
pub struct ResultBundle {
    /// Zip archive containing one file per successfully retrieved image
    pub archive_bytes: Vec<u8>,
    /// Per-row report in original spreadsheet row order
    pub report_rows: Vec<ReportRow>,
}

impl ResultBundle {
    /// Serialize the report rows as a JSON array
    pub fn report_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(&self.report_rows)?)
    }
}

/// Progress event emitted while a run is in flight
///
/// Subscribers that lag or disconnect never affect the pipeline; events are
/// dropped silently when no receiver is listening.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A run started
    Started {
        /// Total number of records to process
        total_records: usize,
    },
    /// One record reached a terminal outcome
    RecordCompleted {
        /// 1-based spreadsheet data-row number
        row_index: u32,
        /// The identifier that was processed
        identifier: String,
        /// Terminal status for this row
        status: RowStatus,
    },
    /// The run finished and the bundle is being assembled
    Finished {
        /// Number of rows with status `ok`
        ok: usize,
        /// Number of rows with any non-`ok` status
        failed: usize,
    },
}
