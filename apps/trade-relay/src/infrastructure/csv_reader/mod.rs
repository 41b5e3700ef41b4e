//! CSV Trade Reader
//!
//! Reads a headered CSV file into [`TradeRow`]s. Every row must have the
//! same number of fields as the header; a row that does not is reported
//! as a [`RowError`] and reading continues.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use serde_json::Value;

use crate::application::services::{RowError, TradeRow};

/// Errors that stop ingestion before any row is read.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The file could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: csv::Error,
    },

    /// The header row could not be read.
    #[error("failed to read header of {path}: {source}")]
    Header {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: csv::Error,
    },
}

/// Open `path` and return its rows in file order.
///
/// # Errors
///
/// Returns `IngestError` if the file cannot be opened or has no readable
/// header.
pub fn read_trade_rows(path: &Path) -> Result<TradeRows, IngestError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| IngestError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let headers = reader
        .headers()
        .map_err(|source| IngestError::Header {
            path: path.to_path_buf(),
            source,
        })?
        .clone();

    tracing::info!(path = %path.display(), columns = headers.len(), "Reading trades");

    Ok(TradeRows {
        headers,
        records: reader.into_records(),
        done: false,
    })
}

/// Iterator over the rows of a trade CSV file.
pub struct TradeRows {
    headers: StringRecord,
    records: StringRecordsIntoIter<File>,
    done: bool,
}

impl TradeRows {
    /// Column names from the header row.
    #[must_use]
    pub const fn headers(&self) -> &StringRecord {
        &self.headers
    }

    fn to_row(&self, record: &StringRecord) -> TradeRow {
        self.headers
            .iter()
            .zip(record.iter())
            .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
            .collect()
    }
}

impl Iterator for TradeRows {
    type Item = Result<TradeRow, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.records.next()? {
            Ok(record) => Some(Ok(self.to_row(&record))),
            Err(e) => {
                let line = e.position().map_or(0, csv::Position::line);
                // An I/O failure leaves the reader in an unknown state.
                if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                    self.done = true;
                }
                Some(Err(RowError {
                    line,
                    reason: describe(&e),
                }))
            }
        }
    }
}

fn describe(error: &csv::Error) -> String {
    match error.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("found {len} fields, expected {expected_len}"),
        _ => error.to_string(),
    }
}
