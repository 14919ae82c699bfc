use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use jobseed_adapters::MalformedRow;
use jobseed_core::WorkStyle;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::builder::Classification;
use crate::dedup::Rename;
use crate::loader::{BatchFailure, LoadError};

/// End-of-run report: what was read, skipped, renamed, written and lost.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub input: String,
    pub mode: String,
    pub rows_read: usize,
    pub rows_processed: usize,
    pub skipped_rows: Vec<MalformedRow>,
    pub renames: Vec<Rename>,
    /// Table name to rows written, in write order.
    pub written: Vec<(String, usize)>,
    pub failed_batches: Vec<BatchFailure>,
    pub skipped_links: usize,
    pub output_files: Vec<String>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {} ({}) input={}", self.run_id, self.mode, self.input)?;
        writeln!(
            f,
            "rows: read={} processed={} skipped={}",
            self.rows_read,
            self.rows_processed,
            self.skipped_rows.len()
        )?;
        for row in &self.skipped_rows {
            writeln!(
                f,
                "  skipped row {} ({} columns)",
                row.position + 1,
                row.width
            )?;
        }
        writeln!(f, "renamed job codes: {}", self.renames.len())?;
        for rename in &self.renames {
            writeln!(f, "  {} -> {}", rename.original, rename.renamed)?;
        }
        for (table, rows) in &self.written {
            writeln!(f, "{table}: {rows} rows")?;
        }
        if !self.failed_batches.is_empty() {
            writeln!(f, "failed batches: {}", self.failed_batches.len())?;
            for failure in &self.failed_batches {
                writeln!(f, "  {failure}")?;
            }
        }
        if self.skipped_links > 0 {
            writeln!(f, "links skipped after failed job batches: {}", self.skipped_links)?;
        }
        for file in &self.output_files {
            writeln!(f, "wrote {file}")?;
        }
        Ok(())
    }
}

/// A direct load stopped by a reset or master failure. The summary covers the rows
/// read and everything written before the stop.
#[derive(Debug, Error)]
#[error("direct load aborted")]
pub struct RunAborted {
    pub summary: Box<RunSummary>,
    #[source]
    pub source: LoadError,
}

/// Classifier decisions tallied over a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassificationCounts {
    pub roles: BTreeMap<String, usize>,
    pub locations: BTreeMap<String, usize>,
    pub work_styles: BTreeMap<WorkStyle, usize>,
    pub unmatched_locations: usize,
}

impl ClassificationCounts {
    pub fn tally<'a>(classifications: impl IntoIterator<Item = &'a Classification>) -> Self {
        let mut counts = Self::default();
        for c in classifications {
            *counts.roles.entry(c.role_slug.clone()).or_default() += 1;
            *counts.locations.entry(c.location_name.clone()).or_default() += 1;
            *counts.work_styles.entry(c.work_style).or_default() += 1;
            if !c.location_matched {
                counts.unmatched_locations += 1;
            }
        }
        counts
    }
}

impl fmt::Display for ClassificationCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "roles:")?;
        for (slug, n) in &self.roles {
            writeln!(f, "  {slug}: {n}")?;
        }
        writeln!(f, "locations ({} unmatched):", self.unmatched_locations)?;
        for (name, n) in &self.locations {
            writeln!(f, "  {name}: {n}")?;
        }
        writeln!(f, "work styles:")?;
        for (style, n) in &self.work_styles {
            writeln!(f, "  {style}: {n}")?;
        }
        Ok(())
    }
}
