use std::collections::HashSet;

use jobseed_core::Phase;
use jobseed_storage::{Filter, RemoteStore, Resolution, Returning, StoreError};
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{BatchSizes, WriteMode};
use crate::dataset::{link_row, Dataset, Row, TableShape};
use crate::loader::{BatchFailure, LoadAborted, LoadError, LoadReport, PhaseReport};

/// Writes a dataset through the store's table API, one bounded batch per request.
///
/// Masters must load completely or the run stops. Job and link batches that fail are
/// recorded and skipped, and links belonging to a failed job batch are never sent.
pub struct DirectLoader<'a> {
    store: &'a dyn RemoteStore,
    mode: WriteMode,
    batch_sizes: BatchSizes,
}

impl<'a> DirectLoader<'a> {
    pub fn new(store: &'a dyn RemoteStore, mode: WriteMode, batch_sizes: BatchSizes) -> Self {
        Self {
            store,
            mode,
            batch_sizes,
        }
    }

    /// Returns what was written so far alongside the error when a reset or master
    /// phase fails.
    pub async fn load(&self, dataset: &Dataset) -> Result<LoadReport, LoadAborted> {
        let mut report = LoadReport::default();
        if self.mode == WriteMode::Replace {
            if let Err(error) = self.reset().await {
                return Err(LoadAborted { report, error });
            }
        }

        for phase in [Phase::Locations, Phase::Roles, Phase::Skills] {
            let (phase_report, failures) = self.write_phase(phase, dataset.row_groups(phase)).await;
            report.phases.push(phase_report);
            if let Some(failure) = failures.into_iter().next() {
                report.failed_batches.push(failure.clone());
                return Err(LoadAborted {
                    report,
                    error: failure.into(),
                });
            }
        }

        let (jobs_report, job_failures) = self
            .write_phase(Phase::Jobs, dataset.row_groups(Phase::Jobs))
            .await;
        let failed_jobs: HashSet<Uuid> = job_failures
            .iter()
            .flat_map(|f| dataset.jobs[f.start..f.end].iter().map(|j| j.id))
            .collect();
        report.phases.push(jobs_report);
        report.failed_batches.extend(job_failures);

        let link_rows: Vec<Row> = dataset
            .links
            .iter()
            .filter(|link| !failed_jobs.contains(&link.job_id))
            .map(link_row)
            .collect();
        report.skipped_links = dataset.links.len() - link_rows.len();
        if report.skipped_links > 0 {
            warn!(
                skipped = report.skipped_links,
                "skipping links of jobs whose batch failed"
            );
        }

        let (links_report, link_failures) =
            self.write_phase(Phase::JobSkills, vec![link_rows]).await;
        report.phases.push(links_report);
        report.failed_batches.extend(link_failures);

        Ok(report)
    }

    /// Clears every table, dependents first.
    async fn reset(&self) -> Result<(), LoadError> {
        for phase in Phase::dependents_first() {
            let shape = TableShape::of(phase);
            self.store
                .delete_where(shape.table(), &Filter::all_rows(shape.reset_column))
                .await
                .map_err(|source| LoadError::Reset {
                    table: shape.table(),
                    source,
                })?;
            info!(table = shape.table(), "cleared table");
        }
        Ok(())
    }

    async fn write_phase(
        &self,
        phase: Phase,
        groups: Vec<Vec<Row>>,
    ) -> (PhaseReport, Vec<BatchFailure>) {
        let shape = TableShape::of(phase);
        let batch_size = self.batch_sizes.for_phase(phase);
        let rows: usize = groups.iter().map(Vec::len).sum();
        let span = info_span!("load_phase", %phase, rows, batch_size);

        async move {
            let mut report = PhaseReport {
                phase,
                rows,
                written: 0,
                batches: 0,
                failed_batches: 0,
            };
            let mut failures = Vec::new();
            let mut offset = 0usize;

            for group in &groups {
                for (idx, batch) in group.chunks(batch_size).enumerate() {
                    let start = offset + idx * batch_size;
                    let end = start + batch.len();
                    report.batches += 1;
                    match self.write_batch(&shape, batch).await {
                        Ok(()) => report.written += batch.len(),
                        Err(err) => {
                            warn!(%phase, table = shape.table(), start, end, error = %err, "batch failed");
                            report.failed_batches += 1;
                            failures.push(BatchFailure {
                                phase,
                                table: shape.table(),
                                start,
                                end,
                                error: err.to_string(),
                            });
                            if phase.is_master() {
                                return (report, failures);
                            }
                        }
                    }
                }
                offset += group.len();
            }
            info!(written = report.written, failed = report.failed_batches, "phase complete");
            (report, failures)
        }
        .instrument(span)
        .await
    }

    async fn write_batch(&self, shape: &TableShape, batch: &[Row]) -> Result<(), StoreError> {
        let payload: Vec<Value> = batch.iter().map(|row| shape.to_json(row)).collect();
        match self.mode {
            WriteMode::Replace => {
                self.store
                    .insert(shape.table(), &payload, Returning::Minimal)
                    .await?;
            }
            WriteMode::Merge => {
                let resolution = if shape.phase == Phase::JobSkills {
                    Resolution::IgnoreDuplicates
                } else {
                    Resolution::MergeDuplicates
                };
                self.store
                    .upsert(
                        shape.table(),
                        &payload,
                        &shape.conflict_target(),
                        resolution,
                        Returning::Minimal,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}
