//! Spreadsheet parsing into ordered identifier records
//!
//! Supports Excel workbooks (`.xlsx`/`.xls`) and CSV files. Cell values are
//! normalized to strings at this boundary so downstream components never
//! branch on raw cell types. The identifier header is matched
//! case-insensitively against a configurable alias set and may sit a few rows
//! into the sheet (price sheets put it on row 3).

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::IdentifierRecord;
use calamine::{Data, Reader};
use std::collections::BTreeMap;
use std::io::Cursor;

/// Parses a tabular input file into an ordered sequence of [`IdentifierRecord`]s
pub struct SpreadsheetReader<'a> {
    config: &'a Config,
}

impl<'a> SpreadsheetReader<'a> {
    /// Create a reader bound to the given configuration
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Parse an uploaded file into records
    ///
    /// The format is chosen by file extension, falling back to content
    /// sniffing for files without a recognized extension. Rows whose
    /// identifier cell is blank are kept (with an empty identifier) so the
    /// report row count equals the original data-row count; this includes
    /// entirely empty rows between populated ones. Only trailing empty rows
    /// are trimmed.
    pub fn parse(&self, filename: &str, bytes: &[u8]) -> Result<Vec<IdentifierRecord>> {
        let rows = if is_excel(filename, bytes) {
            self.read_excel_rows(bytes)?
        } else {
            read_csv_rows(bytes)?
        };
        self.build_records(rows)
    }

    /// Parse pasted text into records
    ///
    /// Identifiers may be separated by whitespace, newlines or commas, the
    /// formats a clipboard paste produces. Records get synthetic 1-based row
    /// indexes in paste order.
    pub fn parse_text(&self, input: &str) -> Result<Vec<IdentifierRecord>> {
        let records: Vec<IdentifierRecord> = input
            .split(|c: char| c.is_whitespace() || c == ',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .enumerate()
            .map(|(i, token)| IdentifierRecord::new(i as u32 + 1, token))
            .collect();

        if records.is_empty() {
            return Err(Error::EmptyInput);
        }
        tracing::debug!(count = records.len(), "parsed identifiers from text input");
        Ok(records)
    }

    fn read_excel_rows(&self, bytes: &[u8]) -> Result<Vec<Vec<String>>> {
        let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| Error::Format(format!("not a readable Excel workbook: {e}")))?;

        let sheet_names = workbook.sheet_names();
        let sheet = sheet_names
            .iter()
            .find(|name| self.config.sheet_name_aliases.contains(name.as_str()))
            .or_else(|| sheet_names.first())
            .cloned()
            .ok_or_else(|| Error::Format("workbook contains no sheets".to_string()))?;

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| Error::Format(format!("cannot read sheet '{sheet}': {e}")))?;

        Ok(range
            .rows()
            .map(|row| row.iter().map(normalize_cell).collect())
            .collect())
    }

    fn build_records(&self, rows: Vec<Vec<String>>) -> Result<Vec<IdentifierRecord>> {
        let (header_row, identifier_col) = self.locate_identifier_column(&rows)?;
        let headers = &rows[header_row];

        // Interior empty rows stay (they become blank-identifier records, so
        // row numbering keeps matching the sheet); trailing empties go.
        let data_rows = &rows[header_row + 1..];
        let data_rows = match data_rows
            .iter()
            .rposition(|row| row.iter().any(|cell| !cell.is_empty()))
        {
            Some(last) => &data_rows[..=last],
            None => &[],
        };

        let mut records = Vec::new();
        for (offset, row) in data_rows.iter().enumerate() {
            let row_index = offset as u32 + 1;
            let identifier = row.get(identifier_col).cloned().unwrap_or_default();
            let mut metadata = BTreeMap::new();
            for (col, header) in headers.iter().enumerate() {
                if col == identifier_col || header.is_empty() {
                    continue;
                }
                if let Some(value) = row.get(col)
                    && !value.is_empty()
                {
                    metadata.insert(header.clone(), value.clone());
                }
            }

            records.push(IdentifierRecord {
                row_index,
                identifier,
                metadata,
            });
        }

        if records.is_empty() {
            return Err(Error::EmptyInput);
        }
        tracing::debug!(
            rows = records.len(),
            header_row = header_row + 1,
            "parsed spreadsheet"
        );
        Ok(records)
    }

    /// Find the identifier header within the first `header_scan_rows` rows
    fn locate_identifier_column(&self, rows: &[Vec<String>]) -> Result<(usize, usize)> {
        let aliases: Vec<String> = self
            .config
            .identifier_column_aliases
            .iter()
            .map(|a| a.to_lowercase())
            .collect();

        for (row_idx, row) in rows.iter().take(self.config.header_scan_rows).enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                if aliases.iter().any(|a| a == &cell.to_lowercase()) {
                    return Ok((row_idx, col_idx));
                }
            }
        }

        Err(Error::Format(format!(
            "identifier column not found in the first {} rows (recognized headers: {})",
            self.config.header_scan_rows,
            aliases.join(", ")
        )))
    }
}

fn is_excel(filename: &str, bytes: &[u8]) -> bool {
    let lower = filename.to_lowercase();
    if lower.ends_with(".xlsx") || lower.ends_with(".xls") || lower.ends_with(".ods") {
        return true;
    }
    if lower.ends_with(".csv") || lower.ends_with(".txt") {
        return false;
    }
    // No recognized extension: sniff for zip (xlsx) or OLE compound (xls) magic
    bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0])
}

fn read_csv_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    let mut next_line = 1u64;
    let mut record = csv::StringRecord::new();
    loop {
        let more = reader
            .read_record(&mut record)
            .map_err(|e| Error::Format(format!("not a readable CSV file: {e}")))?;
        if !more {
            break;
        }
        // The csv reader silently skips blank lines; reinsert them as empty
        // rows so row numbering keeps matching the file.
        let line = record.position().map_or(next_line, |p| p.line());
        while next_line < line {
            rows.push(Vec::new());
            next_line += 1;
        }
        rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
        next_line = reader.position().line();
    }
    Ok(rows)
}

/// Render a spreadsheet cell as a trimmed string
///
/// Integral floats lose their trailing `.0` so numeric identifier columns
/// match their textual form.
fn normalize_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Error(_) => String::new(),
    }
}
