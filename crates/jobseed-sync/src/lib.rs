//! Normalize-and-load pipeline: extracted rows in, master and fact tables out.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobseed_adapters::{extract_all, load_input, InputTable, MalformedRow};
use jobseed_core::Phase;
use jobseed_rules::RuleSet;
use jobseed_storage::{
    MemoryStore, PgScriptApplier, RemoteStore, RestConfig, RestStore, ScriptStore,
};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod builder;
pub mod config;
pub mod dataset;
pub mod dedup;
pub mod direct;
pub mod loader;
pub mod registry;
pub mod script;
pub mod summary;

pub use builder::{BuildError, BuiltJob, Classification, RecordBuilder};
pub use config::{BatchSizes, ConfigError, PipelineConfig, RunKind, WriteMode};
pub use dataset::{destination_schema, Dataset};
pub use dedup::{dedupe_job_codes, Rename};
pub use direct::DirectLoader;
pub use loader::{BatchFailure, LoadAborted, LoadError, LoadReport, PhaseReport};
pub use registry::{EntityKind, IdStrategy, MasterRegistry};
pub use script::{render_chunks, render_document, ScriptOptions};
pub use summary::{ClassificationCounts, RunAborted, RunSummary};

pub const CRATE_NAME: &str = "jobseed-sync";

/// Result of normalizing one input file, before anything is written.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub dataset: Dataset,
    pub rows_read: usize,
    pub skipped_rows: Vec<MalformedRow>,
    pub renames: Vec<Rename>,
    pub classifications: Vec<Classification>,
}

/// Runs extraction, classification, registration and deduplication over a whole table.
///
/// Rows are processed strictly in input order so first-sight id assignment and
/// renames are deterministic.
pub fn normalize(
    table: &InputTable,
    rules: &RuleSet,
    strategy: IdStrategy,
    published_at: DateTime<Utc>,
) -> Result<Normalized, BuildError> {
    let extraction = extract_all(&table.records);
    let mut registry = MasterRegistry::seeded(&rules.roles, strategy);
    let builder = RecordBuilder::new(rules, published_at);

    let mut built = Vec::with_capacity(extraction.fields.len());
    for fields in &extraction.fields {
        built.push(builder.build(fields, &mut registry)?);
    }
    let renames = dedupe_job_codes(&mut built, strategy);

    let classifications = built.iter().map(|b| b.classification.clone()).collect();
    let jobs = built.into_iter().map(|b| b.job).collect();
    Ok(Normalized {
        dataset: Dataset::assemble(&registry, jobs),
        rows_read: table.records.len(),
        skipped_rows: extraction.skipped,
        renames,
        classifications,
    })
}

/// How a script run should finish.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptRun {
    /// Write one `seed.sql` instead of numbered chunks.
    pub single_document: bool,
    /// Execute the written files against `DATABASE_URL`.
    pub apply: bool,
}

pub struct Pipeline {
    config: PipelineConfig,
    rules: RuleSet,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let rules = match &config.rules_dir {
            Some(dir) => RuleSet::from_dir(dir)
                .with_context(|| format!("loading rule tables from {}", dir.display()))?,
            None => RuleSet::builtin().context("loading built-in rule tables")?,
        };
        Ok(Self { config, rules })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn prepare(&self, published_at: DateTime<Utc>) -> Result<Normalized> {
        let input = &self.config.input;
        let table =
            load_input(input).with_context(|| format!("reading input {}", input.display()))?;
        let normalized = normalize(&table, &self.rules, self.config.id_strategy(), published_at)
            .context("normalizing input rows")?;
        info!(
            rows = normalized.rows_read,
            jobs = normalized.dataset.jobs.len(),
            skipped = normalized.skipped_rows.len(),
            renamed = normalized.renames.len(),
            "normalized input"
        );
        for row in &normalized.skipped_rows {
            warn!(position = row.position, width = row.width, "row skipped");
        }
        Ok(normalized)
    }

    fn summary(&self, started_at: DateTime<Utc>, mode: &str, normalized: &Normalized) -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            started_at,
            input: self.config.input.display().to_string(),
            mode: mode.to_string(),
            rows_read: normalized.rows_read,
            rows_processed: normalized.dataset.jobs.len(),
            skipped_rows: normalized.skipped_rows.clone(),
            renames: normalized.renames.clone(),
            written: Vec::new(),
            failed_batches: Vec::new(),
            skipped_links: 0,
            output_files: Vec::new(),
        }
    }

    /// Extraction and normalization only; nothing is written.
    pub fn check(&self) -> Result<(RunSummary, ClassificationCounts)> {
        self.config.validate(RunKind::Check)?;
        let started_at = Utc::now();
        let normalized = self.prepare(started_at)?;
        let mut summary = self.summary(started_at, "check", &normalized);
        summary.written = Phase::ALL
            .iter()
            .map(|p| (format!("{} (planned)", p.table()), normalized.dataset.row_count(*p)))
            .collect();
        let counts = ClassificationCounts::tally(&normalized.classifications);
        Ok((summary, counts))
    }

    /// Loads into the configured REST endpoint.
    pub async fn import(&self) -> Result<RunSummary> {
        self.config.validate(RunKind::Direct)?;
        let (Some(url), Some(key)) = (&self.config.supabase_url, &self.config.service_role_key)
        else {
            return Err(ConfigError::MissingCredentials(config::SUPABASE_URL_VAR).into());
        };
        let store = RestStore::new(RestConfig {
            timeout: self.config.http_timeout(),
            ..RestConfig::new(url.clone(), key.clone())
        })?;
        self.load_into(&store).await
    }

    /// Runs the direct loader against in-memory tables with the destination's constraints.
    pub async fn import_dry_run(&self) -> Result<RunSummary> {
        self.config.validate(RunKind::Check)?;
        let store = MemoryStore::new(destination_schema());
        self.load_into(&store).await
    }

    pub async fn load_into(&self, store: &dyn RemoteStore) -> Result<RunSummary> {
        let started_at = Utc::now();
        let normalized = self.prepare(started_at)?;
        let mut summary = self.summary(started_at, self.config.write_mode.as_str(), &normalized);

        let span = info_span!("direct_load", run_id = %summary.run_id, mode = %self.config.write_mode);
        let loader = DirectLoader::new(store, self.config.write_mode, self.config.batch_sizes);
        let (report, fatal) = match loader.load(&normalized.dataset).instrument(span).await {
            Ok(report) => (report, None),
            Err(LoadAborted { report, error }) => (report, Some(error)),
        };

        summary.written = Phase::ALL
            .iter()
            .map(|p| (p.table().to_string(), report.written(*p)))
            .collect();
        summary.failed_batches = report.failed_batches;
        summary.skipped_links = report.skipped_links;
        if let Some(source) = fatal {
            return Err(RunAborted {
                summary: Box::new(summary),
                source,
            }
            .into());
        }
        Ok(summary)
    }

    /// Writes seed scripts to the output directory and optionally applies them.
    pub async fn seed(&self, run: ScriptRun) -> Result<RunSummary> {
        self.config.validate(RunKind::Script)?;
        let database_url = if run.apply {
            Some(
                self.config
                    .database_url
                    .clone()
                    .context("DATABASE_URL must be set to apply seed scripts")?,
            )
        } else {
            None
        };

        let started_at = Utc::now();
        let normalized = self.prepare(started_at)?;
        let mut summary = self.summary(started_at, self.config.write_mode.as_str(), &normalized);

        let options = ScriptOptions {
            mode: self.config.write_mode,
            statement_rows: self.config.statement_rows,
            max_statements_per_chunk: self.config.max_statements_per_chunk,
        };
        let chunks = if run.single_document {
            vec![render_document(&normalized.dataset, &options)]
        } else {
            render_chunks(&normalized.dataset, &options)
        };

        let store = ScriptStore::new(&self.config.output_dir);
        let manifest = store
            .write_chunks(&chunks, started_at)
            .await
            .with_context(|| format!("writing seed scripts to {}", store.root().display()))?;
        summary.output_files = manifest
            .files
            .iter()
            .map(|f| store.root().join(&f.name).display().to_string())
            .collect();

        if let Some(url) = database_url {
            let applier = PgScriptApplier::connect(&url)
                .await
                .context("connecting to DATABASE_URL")?;
            let applied = applier
                .apply(&store, &manifest)
                .await
                .context("applying seed scripts")?;
            info!(applied, "seed scripts applied");
        }

        summary.written = Phase::ALL
            .iter()
            .map(|p| (p.table().to_string(), normalized.dataset.row_count(*p)))
            .collect();
        Ok(summary)
    }
}
