use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use jobseed_sync::{Pipeline, PipelineConfig, RunAborted, RunSummary, ScriptRun, WriteMode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobseed")]
#[command(about = "Normalize the job spreadsheet export and seed the job board database")]
struct Cli {
    /// Delimited export to read.
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    /// `replace` clears every table first; `merge` upserts on natural keys.
    #[arg(long, global = true)]
    mode: Option<WriteMode>,

    /// Directory holding roles.yaml, locations.yaml and skills.yaml.
    #[arg(long, global = true)]
    rules_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write straight to the REST endpoint in bounded batches.
    Import {
        /// Load into in-memory tables with the same constraints instead.
        #[arg(long)]
        dry_run: bool,
    },
    /// Render SQL seed scripts.
    Seed {
        #[arg(long)]
        single_file: bool,
        /// Execute the scripts against DATABASE_URL after writing them.
        #[arg(long)]
        apply: bool,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        max_statements: Option<usize>,
    },
    /// Extract and classify only, then print what would be written.
    Check,
}

/// Loads `.env.local` then `.env` from `dir`. Earlier files win; dotenvy never
/// overwrites a variable that is already set.
fn load_dotenv(dir: &Path) -> Vec<PathBuf> {
    [".env.local", ".env"]
        .into_iter()
        .filter_map(|file| dotenvy::from_path(dir.join(file)).ok().map(|()| dir.join(file)))
        .collect()
}

fn finish(summary: &RunSummary) -> Result<()> {
    print!("{summary}");
    if !summary.failed_batches.is_empty() {
        bail!(
            "{} batch(es) failed; see the summary above",
            summary.failed_batches.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before the subscriber, so RUST_LOG may come from an env file.
    let env_files = load_dotenv(Path::new("."));
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();
    for path in &env_files {
        info!(path = %path.display(), "loaded environment file");
    }

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        if let Some(aborted) = err.downcast_ref::<RunAborted>() {
            print!("{}", aborted.summary);
        }
        return Err(err);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(input) = cli.input {
        config.input = input;
    }
    if let Some(mode) = cli.mode {
        config.write_mode = mode;
    }
    if cli.rules_dir.is_some() {
        config.rules_dir = cli.rules_dir;
    }

    match cli.command {
        Commands::Import { dry_run } => {
            let pipeline = Pipeline::new(config)?;
            let summary = if dry_run {
                pipeline.import_dry_run().await?
            } else {
                pipeline.import().await?
            };
            finish(&summary)
        }
        Commands::Seed {
            single_file,
            apply,
            output_dir,
            max_statements,
        } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(max) = max_statements {
                config.max_statements_per_chunk = max;
            }
            let pipeline = Pipeline::new(config)?;
            let summary = pipeline
                .seed(ScriptRun {
                    single_document: single_file,
                    apply,
                })
                .await?;
            finish(&summary)
        }
        Commands::Check => {
            let pipeline = Pipeline::new(config)?;
            let (summary, counts) = pipeline.check()?;
            print!("{summary}");
            print!("{counts}");
            Ok(())
        }
    }
}
