use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jobseed_core::Phase;
use serde::Serialize;
use thiserror::Error;

use crate::registry::IdStrategy;

pub const DEFAULT_INPUT: &str = "Tech@DB_ver1.2 - to FB.csv";
pub const SUPABASE_URL_VAR: &str = "NEXT_PUBLIC_SUPABASE_URL";
pub const SERVICE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("input file {} does not exist", .0.display())]
    MissingInput(PathBuf),
    #[error("{0} must be set for direct loads")]
    MissingCredentials(&'static str),
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// `replace` truncates and reloads; `merge` upserts on natural keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Replace,
    Merge,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Replace => "replace",
            WriteMode::Merge => "merge",
        }
    }

    /// Merge runs must address the same rows every time.
    pub fn id_strategy(&self) -> IdStrategy {
        match self {
            WriteMode::Replace => IdStrategy::Random,
            WriteMode::Merge => IdStrategy::NaturalKey,
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(WriteMode::Replace),
            "merge" => Ok(WriteMode::Merge),
            _ => Err(ConfigError::InvalidValue {
                var: "JOBSEED_WRITE_MODE",
                value: s.to_string(),
                reason: "expected replace or merge".to_string(),
            }),
        }
    }
}

/// Rows per request (direct mode) or per INSERT statement (script mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSizes {
    pub masters: usize,
    pub jobs: usize,
    pub links: usize,
}

impl BatchSizes {
    pub fn direct() -> Self {
        Self {
            masters: 500,
            jobs: 50,
            links: 500,
        }
    }

    pub fn script() -> Self {
        Self {
            masters: 500,
            jobs: 50,
            links: 100,
        }
    }

    pub fn for_phase(&self, phase: Phase) -> usize {
        let size = match phase {
            Phase::Locations | Phase::Roles | Phase::Skills => self.masters,
            Phase::Jobs => self.jobs,
            Phase::JobSkills => self.links,
        };
        size.max(1)
    }
}

/// Which entry point is about to run; decides what `validate` insists on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Direct,
    Script,
    Check,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub supabase_url: Option<String>,
    pub service_role_key: Option<String>,
    pub write_mode: WriteMode,
    pub output_dir: PathBuf,
    pub max_statements_per_chunk: usize,
    pub rules_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub http_timeout_secs: u64,
    pub batch_sizes: BatchSizes,
    pub statement_rows: BatchSizes,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            supabase_url: None,
            service_role_key: None,
            write_mode: WriteMode::Replace,
            output_dir: PathBuf::from("supabase"),
            max_statements_per_chunk: 50,
            rules_dir: None,
            database_url: None,
            http_timeout_secs: 30,
            batch_sizes: BatchSizes::direct(),
            statement_rows: BatchSizes::script(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let write_mode = match get("JOBSEED_WRITE_MODE") {
            Some(raw) => raw.parse()?,
            None => defaults.write_mode,
        };

        Ok(Self {
            input: get("JOBSEED_INPUT").map(PathBuf::from).unwrap_or(defaults.input),
            supabase_url: get(SUPABASE_URL_VAR),
            service_role_key: get(SERVICE_KEY_VAR),
            write_mode,
            output_dir: get("JOBSEED_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            max_statements_per_chunk: parse_number(
                "JOBSEED_MAX_STATEMENTS_PER_CHUNK",
                get("JOBSEED_MAX_STATEMENTS_PER_CHUNK"),
                defaults.max_statements_per_chunk,
            )?,
            rules_dir: get("JOBSEED_RULES_DIR").map(PathBuf::from),
            database_url: get("DATABASE_URL"),
            http_timeout_secs: parse_number(
                "JOBSEED_HTTP_TIMEOUT_SECS",
                get("JOBSEED_HTTP_TIMEOUT_SECS"),
                defaults.http_timeout_secs,
            )?,
            batch_sizes: defaults.batch_sizes,
            statement_rows: defaults.statement_rows,
        })
    }

    /// Fails before any processing when the run cannot possibly succeed.
    pub fn validate(&self, kind: RunKind) -> Result<(), ConfigError> {
        if !self.input.is_file() {
            return Err(ConfigError::MissingInput(self.input.clone()));
        }
        if kind == RunKind::Direct {
            if self.supabase_url.is_none() {
                return Err(ConfigError::MissingCredentials(SUPABASE_URL_VAR));
            }
            if self.service_role_key.is_none() {
                return Err(ConfigError::MissingCredentials(SERVICE_KEY_VAR));
            }
        }
        Ok(())
    }

    pub fn id_strategy(&self) -> IdStrategy {
        self.write_mode.id_strategy()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn parse_number<T: FromStr>(
    var: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: raw.clone(),
        reason: "expected a non-negative integer".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = PipelineConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config.input, PathBuf::from(DEFAULT_INPUT));
        assert_eq!(config.write_mode, WriteMode::Replace);
        assert_eq!(config.output_dir, PathBuf::from("supabase"));
        assert_eq!(config.max_statements_per_chunk, 50);
        assert_eq!(config.batch_sizes.for_phase(Phase::Jobs), 50);
        assert_eq!(config.statement_rows.for_phase(Phase::JobSkills), 100);
        assert_eq!(config.id_strategy(), IdStrategy::Random);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("JOBSEED_INPUT", "data/jobs.csv"),
            ("JOBSEED_WRITE_MODE", "Merge"),
            ("JOBSEED_MAX_STATEMENTS_PER_CHUNK", "10"),
            (SUPABASE_URL_VAR, "https://demo.supabase.co"),
            (SERVICE_KEY_VAR, "  "),
        ]))
        .expect("config");
        assert_eq!(config.input, PathBuf::from("data/jobs.csv"));
        assert_eq!(config.write_mode, WriteMode::Merge);
        assert_eq!(config.max_statements_per_chunk, 10);
        assert_eq!(config.supabase_url.as_deref(), Some("https://demo.supabase.co"));
        assert_eq!(config.service_role_key, None);
        assert_eq!(config.id_strategy(), IdStrategy::NaturalKey);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("JOBSEED_WRITE_MODE", "append")]))
            .unwrap_err();
        assert!(err.to_string().contains("JOBSEED_WRITE_MODE"));

        let err = PipelineConfig::from_lookup(lookup(&[("JOBSEED_HTTP_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "JOBSEED_HTTP_TIMEOUT_SECS", .. }));
    }

    #[test]
    fn validation_checks_input_then_credentials() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = PipelineConfig {
            input: dir.path().join("missing.csv"),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(RunKind::Check),
            Err(ConfigError::MissingInput(_))
        ));

        config.input = dir.path().join("jobs.csv");
        std::fs::write(&config.input, "a,b\n").expect("write file");
        config.validate(RunKind::Script).expect("valid config");
        assert!(matches!(
            config.validate(RunKind::Direct),
            Err(ConfigError::MissingCredentials(SUPABASE_URL_VAR))
        ));

        config.supabase_url = Some("https://demo.supabase.co".into());
        assert!(matches!(
            config.validate(RunKind::Direct),
            Err(ConfigError::MissingCredentials(SERVICE_KEY_VAR))
        ));
        config.service_role_key = Some("key".into());
        config.validate(RunKind::Direct).expect("valid config");
    }
}
