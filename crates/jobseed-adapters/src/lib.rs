//! Input adapters: delimited source files in, typed per-row fields out.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use jobseed_core::{ExtractedFields, RawRecord, RowLayout};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "jobseed-adapters";

/// Marks the first row as a header when found in its first cell.
pub const ID_HEADER_MARKER: &str = "ID";
/// Marks the first row as a header when found in its first or second cell.
pub const TITLE_HEADER_MARKER: &str = "案件名";

/// Rows narrower than this cannot be mapped onto any layout.
pub const MIN_COLUMNS: usize = 7;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("opening input {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("reading delimited input at line {line}: {source}")]
    Parse {
        line: u64,
        #[source]
        source: csv::Error,
    },
}

/// Rows of one input file, header removed.
#[derive(Debug, Clone, Default)]
pub struct InputTable {
    pub header: Option<Vec<String>>,
    pub records: Vec<RawRecord>,
}

/// A row discarded for having too few columns. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRow {
    pub position: usize,
    pub width: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub fields: Vec<ExtractedFields>,
    pub skipped: Vec<MalformedRow>,
}

pub fn load_input(path: impl AsRef<Path>) -> Result<InputTable, ExtractError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ExtractError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let table = read_input(file)?;
    debug!(path = %path.display(), rows = table.records.len(), "loaded input rows");
    Ok(table)
}

/// Reads comma-delimited UTF-8 rows of any width.
pub fn read_input<R: Read>(reader: R) -> Result<InputTable, ExtractError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result.map_err(|source| ExtractError::Parse {
            line: source.position().map(|p| p.line()).unwrap_or(0),
            source,
        })?;
        rows.push(record.iter().map(ToString::to_string).collect::<Vec<_>>());
    }
    if let Some(first) = rows.first_mut().and_then(|row| row.first_mut()) {
        if let Some(stripped) = first.strip_prefix('\u{feff}') {
            *first = stripped.to_string();
        }
    }

    let (header, rows) = detect_header(rows);
    let records = rows
        .into_iter()
        .enumerate()
        .map(|(position, columns)| RawRecord::new(position, columns))
        .collect();
    Ok(InputTable { header, records })
}

/// Splits off the first row when it looks like the export's header.
///
/// Only the id column is checked for `ID`, so a title such as `ID管理基盤構築` in the
/// second cell stays a data row.
pub fn detect_header(mut rows: Vec<Vec<String>>) -> (Option<Vec<String>>, Vec<Vec<String>>) {
    let is_header = rows.first().is_some_and(|first| {
        let cell = |idx: usize| first.get(idx).map(String::as_str).unwrap_or_default();
        cell(0).contains(ID_HEADER_MARKER)
            || cell(0).contains(TITLE_HEADER_MARKER)
            || cell(1).contains(TITLE_HEADER_MARKER)
    });
    if is_header {
        let header = rows.remove(0);
        return (Some(header), rows);
    }
    (None, rows)
}

pub fn layout_for_width(width: usize) -> Option<RowLayout> {
    match width {
        w if w >= 9 => Some(RowLayout::Full),
        8 => Some(RowLayout::WithoutRole),
        7 => Some(RowLayout::Legacy),
        _ => None,
    }
}

/// Maps one row onto the widest layout its column count supports.
pub fn extract_fields(record: &RawRecord) -> Result<ExtractedFields, MalformedRow> {
    let layout = layout_for_width(record.width()).ok_or(MalformedRow {
        position: record.position,
        width: record.width(),
    })?;
    let col = |idx: usize| record.columns.get(idx).cloned().unwrap_or_default();

    let fields = match layout {
        RowLayout::Full => ExtractedFields {
            position: record.position,
            layout,
            job_code: col(0).trim().to_string(),
            title: col(1),
            role_label: col(2),
            skills_text: col(3),
            price_text: col(4),
            location_text: col(5),
            summary: col(6),
            environment: col(7),
            requirements: col(8),
        },
        RowLayout::WithoutRole => ExtractedFields {
            position: record.position,
            layout,
            job_code: col(0).trim().to_string(),
            title: col(1),
            role_label: String::new(),
            skills_text: col(2),
            price_text: col(3),
            location_text: col(4),
            summary: col(5),
            environment: col(6),
            requirements: col(7),
        },
        RowLayout::Legacy => ExtractedFields {
            position: record.position,
            layout,
            job_code: synthesized_job_code(record.position),
            title: col(0),
            role_label: String::new(),
            skills_text: col(1),
            price_text: col(2),
            location_text: col(3),
            summary: col(4),
            environment: col(5),
            requirements: col(6),
        },
    };
    Ok(fields)
}

/// `JOB-00001` for the first data row.
pub fn synthesized_job_code(position: usize) -> String {
    format!("JOB-{:05}", position + 1)
}

pub fn extract_all(records: &[RawRecord]) -> Extraction {
    let mut extraction = Extraction::default();
    for record in records {
        match extract_fields(record) {
            Ok(fields) => extraction.fields.push(fields),
            Err(malformed) => {
                warn!(
                    position = malformed.position,
                    width = malformed.width,
                    "skipping row with too few columns"
                );
                extraction.skipped.push(malformed);
            }
        }
    }
    extraction
}
