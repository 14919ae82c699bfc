//! Destination store boundary: remote REST tables, in-memory tables, and seed script files.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

mod memory;
mod rest;
mod script;

pub use memory::{ForeignKey, MemoryStore, TableSchema};
pub use rest::{RestConfig, RestStore};
pub use script::{
    PgScriptApplier, ScriptChunk, ScriptManifest, ScriptManifestFile, ScriptStore, MANIFEST_FILE,
};

pub const CRATE_NAME: &str = "jobseed-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to {table} failed: {source}")]
    Request {
        table: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} from {table}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },
    #[error("{table} rejected the write: {message}")]
    Rejected { table: String, message: String },
    #[error("unknown table {0}")]
    UnknownTable(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest encoding failed: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("checksum mismatch for {file}: manifest has {expected}, file has {actual}")]
    Checksum {
        file: String,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn rejected(table: &str, message: impl Into<String>) -> Self {
        Self::Rejected {
            table: table.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Whether a write echoes the created rows back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returning {
    Representation,
    Minimal,
}

impl Returning {
    pub fn prefer(&self) -> &'static str {
        match self {
            Returning::Representation => "return=representation",
            Returning::Minimal => "return=minimal",
        }
    }
}

/// What an upsert does with a row whose conflict key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    MergeDuplicates,
    IgnoreDuplicates,
}

impl Resolution {
    pub fn prefer(&self) -> &'static str {
        match self {
            Resolution::MergeDuplicates => "resolution=merge-duplicates",
            Resolution::IgnoreDuplicates => "resolution=ignore-duplicates",
        }
    }
}

/// Rows whose `column` differs from `value`, in PostgREST `column=neq.value` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn neq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Matches every row with a non-null uuid in `column`.
    pub fn all_rows(column: impl Into<String>) -> Self {
        Self::neq(column, Uuid::nil().to_string())
    }

    pub fn query_pair(&self) -> (String, String) {
        (self.column.clone(), format!("neq.{}", self.value))
    }

    /// SQL semantics: a null or missing column never matches.
    pub fn matches(&self, cell: Option<&Value>) -> bool {
        cell.and_then(cell_text).is_some_and(|text| text != self.value)
    }
}

pub(crate) fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Table-level write API of the destination store.
///
/// Every call is one request: the store applies the whole batch or none of it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn insert(
        &self,
        table: &str,
        rows: &[Value],
        returning: Returning,
    ) -> Result<Vec<Value>, StoreError>;

    /// Insert-or-resolve keyed on the comma-separated `on_conflict` columns.
    async fn upsert(
        &self,
        table: &str,
        rows: &[Value],
        on_conflict: &str,
        resolution: Resolution,
        returning: Returning,
    ) -> Result<Vec<Value>, StoreError>;

    async fn delete_where(&self, table: &str, filter: &Filter) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}
