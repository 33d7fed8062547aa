//! Result assembly: zip archive plus per-row status report
//!
//! The packager is the only component that sees the session as a whole. It
//! restores original spreadsheet order, names archive entries after the
//! identifiers and folds outcome details into human-readable report reasons.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{FetchOutcome, FetchSession, ReportRow, ResultBundle, RowStatus};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::FileOptions;

/// Builds the downloadable [`ResultBundle`] from a finished session
pub struct ResultPackager<'a> {
    config: &'a Config,
}

impl<'a> ResultPackager<'a> {
    /// Create a packager bound to the given configuration
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Assemble the archive and report for a finished session
    ///
    /// Report rows come out in input order, one per record, regardless of
    /// the order outcomes were produced in. Fails with
    /// [`Error::TooManyImages`] before writing anything when the success
    /// count exceeds the archive entry limit.
    pub fn package(&self, session: &FetchSession) -> Result<ResultBundle> {
        let selected = session.count(RowStatus::Ok);
        if selected > self.config.max_archive_entries {
            return Err(Error::TooManyImages {
                selected,
                limit: self.config.max_archive_entries,
            });
        }

        let archive_bytes = self.write_archive(session)?;
        let report_rows = session.outcomes.iter().map(report_row).collect();

        tracing::info!(
            images = selected,
            rows = session.outcomes.len(),
            archive_bytes = archive_bytes.len(),
            "packaged result bundle"
        );
        Ok(ResultBundle {
            archive_bytes,
            report_rows,
        })
    }

    fn write_archive(&self, session: &FetchSession) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        let mut used_names: HashSet<String> = HashSet::new();
        let mut seen_identifiers: HashSet<String> = HashSet::new();

        for outcome in &session.outcomes {
            let FetchOutcome::Success {
                record,
                image_bytes,
                content_type,
            } = outcome
            else {
                continue;
            };

            let stem = sanitize_name(&record.identifier);
            let extension = extension_for(content_type);

            // First occurrence of an identifier keeps the plain name; later
            // duplicates get a row suffix so every entry survives.
            let mut name = format!("{stem}.{extension}");
            if !seen_identifiers.insert(record.identifier.clone()) || used_names.contains(&name) {
                name = format!("{stem}_row{}.{extension}", record.row_index);
            }
            let mut counter = 1u32;
            while !used_names.insert(name.clone()) {
                name = format!("{stem}_row{}_{counter}.{extension}", record.row_index);
                counter += 1;
            }

            writer
                .start_file(&name, options)
                .map_err(|e| Error::Archive(format!("cannot start entry '{name}': {e}")))?;
            writer.write_all(image_bytes)?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| Error::Archive(format!("cannot finalize archive: {e}")))?;
        Ok(cursor.into_inner())
    }
}

fn report_row(outcome: &FetchOutcome) -> ReportRow {
    let record = outcome.record();
    let reason = match outcome {
        FetchOutcome::Success { .. } => "image retrieved".to_string(),
        FetchOutcome::NotFound {
            reason,
            alternatives,
            ..
        } => {
            if alternatives.is_empty() {
                reason.clone()
            } else {
                format!(
                    "{reason}; other variants exist: {}",
                    alternatives.join(", ")
                )
            }
        }
        FetchOutcome::TransientFailure {
            reason, attempts, ..
        } => {
            if *attempts > 1 {
                format!("{reason} (after {attempts} attempts)")
            } else {
                reason.clone()
            }
        }
        FetchOutcome::Invalid { reason, .. } => reason.clone(),
        FetchOutcome::Cancelled { .. } => {
            "run cancelled before this row was dispatched".to_string()
        }
    };

    ReportRow {
        row_index: record.row_index,
        identifier: record.identifier.clone(),
        status: outcome.status(),
        reason,
        metadata: record.metadata.clone(),
    }
}

/// Replace characters that are unsafe in archive entry names
fn sanitize_name(identifier: &str) -> String {
    let sanitized: String = identifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

/// Map a content type to a filename extension
fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/tiff" => "tif",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}
