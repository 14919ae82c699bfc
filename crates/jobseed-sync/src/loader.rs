//! Outcome types shared by the script and direct loaders.

use std::fmt;

use jobseed_core::Phase;
use jobseed_storage::StoreError;
use serde::Serialize;
use thiserror::Error;

/// One rejected batch; `start..end` indexes the phase's rows in write order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub phase: Phase,
    pub table: &'static str,
    pub start: usize,
    pub end: usize,
    pub error: String,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows {}..{}: {}",
            self.table, self.start, self.end, self.error
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub rows: usize,
    pub written: usize,
    pub batches: usize,
    pub failed_batches: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub phases: Vec<PhaseReport>,
    pub failed_batches: Vec<BatchFailure>,
    /// Links not attempted because their job's batch failed.
    pub skipped_links: usize,
}

impl LoadReport {
    pub fn written(&self, phase: Phase) -> usize {
        self.phases
            .iter()
            .find(|p| p.phase == phase)
            .map_or(0, |p| p.written)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("clearing {table} failed: {source}")]
    Reset {
        table: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("master phase {phase} failed on {table} rows {start}..{end}: {message}")]
    MasterPhase {
        phase: Phase,
        table: &'static str,
        start: usize,
        end: usize,
        message: String,
    },
}

/// A load stopped by a fatal error, with everything written before it.
#[derive(Debug)]
pub struct LoadAborted {
    pub report: LoadReport,
    pub error: LoadError,
}

impl From<BatchFailure> for LoadError {
    fn from(failure: BatchFailure) -> Self {
        LoadError::MasterPhase {
            phase: failure.phase,
            table: failure.table,
            start: failure.start,
            end: failure.end,
            message: failure.error,
        }
    }
}
