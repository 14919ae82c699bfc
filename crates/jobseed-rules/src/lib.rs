//! Versioned heuristic tables and the stateless classifiers built on them.
//!
//! Every pipeline entry point consumes the same [`RuleSet`]; the tables ship embedded
//! in the crate and can be replaced wholesale from a directory of YAML files.

use std::path::{Path, PathBuf};

use jobseed_core::{PriceRange, WorkStyle};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

mod locations;
mod price;
mod roles;
mod skills;
mod work_style;

pub use locations::{LocationMatch, LocationRule, LocationTable};
pub use price::{PricePolicy, RangeMarker};
pub use roles::{LeafRole, RoleCategory, RoleLabel, RoleTable};
pub use skills::{slugify, SkillRule, SkillTable};
pub use work_style::WorkStylePolicy;

pub const CRATE_NAME: &str = "jobseed-rules";

const ROLES_YAML: &str = include_str!("../rules/roles.yaml");
const LOCATIONS_YAML: &str = include_str!("../rules/locations.yaml");
const SKILLS_YAML: &str = include_str!("../rules/skills.yaml");
const POLICY_YAML: &str = include_str!("../rules/policy.yaml");

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("reading rules file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing rules file {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid {file}: {message}")]
    Invalid { file: String, message: String },
}

impl RulesError {
    pub(crate) fn invalid(file: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            file: file.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct PolicyFile {
    version: u32,
    work_style: WorkStylePolicy,
    price: PricePolicy,
}

/// All classification tables for one run.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub roles: RoleTable,
    pub locations: LocationTable,
    pub skills: SkillTable,
    pub work_style: WorkStylePolicy,
    pub price: PricePolicy,
    pub policy_version: u32,
}

impl RuleSet {
    /// Tables compiled into the binary.
    pub fn builtin() -> Result<Self, RulesError> {
        Self::from_sources(ROLES_YAML, LOCATIONS_YAML, SKILLS_YAML, POLICY_YAML)
    }

    /// Loads `roles.yaml`, `locations.yaml`, `skills.yaml` and `policy.yaml` from `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, RulesError> {
        let dir = dir.as_ref();
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|source| RulesError::Read { path, source })
        };
        Self::from_sources(
            &read("roles.yaml")?,
            &read("locations.yaml")?,
            &read("skills.yaml")?,
            &read("policy.yaml")?,
        )
    }

    fn from_sources(
        roles: &str,
        locations: &str,
        skills: &str,
        policy: &str,
    ) -> Result<Self, RulesError> {
        let roles = RoleTable::from_file(parse_yaml("roles.yaml", roles)?)?;
        let locations = LocationTable::from_file(parse_yaml("locations.yaml", locations)?)?;
        let skills = SkillTable::from_file(parse_yaml("skills.yaml", skills)?)?;
        let policy: PolicyFile = parse_yaml("policy.yaml", policy)?;
        policy.price.validate()?;
        debug!(
            roles_version = roles.version,
            locations_version = locations.version,
            skills_version = skills.version,
            policy_version = policy.version,
            "loaded rule tables"
        );
        Ok(Self {
            roles,
            locations,
            skills,
            work_style: policy.work_style,
            price: policy.price,
            policy_version: policy.version,
        })
    }

    pub fn classify_role<'a>(&'a self, role_label: &str, title: &str) -> &'a str {
        self.roles.classify(role_label, title)
    }

    pub fn classify_location(&self, location_text: &str) -> LocationMatch<'_> {
        self.locations.classify(location_text)
    }

    pub fn classify_work_style(&self, location_text: &str, requirements_text: &str) -> WorkStyle {
        self.work_style.classify(location_text, requirements_text)
    }

    pub fn parse_price(&self, price_text: &str) -> PriceRange {
        self.price.parse(price_text)
    }

    pub fn canonicalize_skills(&self, skill_text: &str) -> Vec<String> {
        self.skills.canonicalize(skill_text)
    }
}

fn parse_yaml<T: DeserializeOwned>(file: &str, text: &str) -> Result<T, RulesError> {
    serde_yaml::from_str(text).map_err(|source| RulesError::Parse {
        file: file.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtin_tables_load() {
        let rules = RuleSet::builtin().expect("builtin rules");
        assert_eq!(rules.roles.categories().len(), 6);
        assert!(rules.roles.labels().len() >= 65);
        assert_eq!(rules.skills.rules().len(), 45);
        assert_eq!(rules.price.man_yen_threshold, 2000);
    }

    #[test]
    fn end_to_end_row_classification() {
        let rules = RuleSet::builtin().expect("builtin rules");
        assert_eq!(
            rules.classify_role("バックエンドエンジニア", "Backend Dev"),
            "backend-engineer"
        );
        let location = rules.classify_location("東京都渋谷区");
        assert_eq!(location.name, "東京");
        assert_eq!(location.slug, "tokyo");
        assert_eq!(rules.classify_work_style("東京都渋谷区", "..."), WorkStyle::Onsite);
        assert_eq!(rules.parse_price("60〜80"), PriceRange::new(600_000, 800_000));
        assert_eq!(rules.canonicalize_skills("Python, AWS"), vec!["Python", "AWS"]);
    }

    #[test]
    fn tables_can_be_overridden_from_a_directory() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("roles.yaml"), ROLES_YAML).expect("write file");
        std::fs::write(dir.path().join("locations.yaml"), LOCATIONS_YAML).expect("write file");
        std::fs::write(dir.path().join("skills.yaml"), SKILLS_YAML).expect("write file");
        std::fs::write(
            dir.path().join("policy.yaml"),
            POLICY_YAML.replace("man_yen_threshold: 2000", "man_yen_threshold: 200"),
        )
        .expect("write file");

        let rules = RuleSet::from_dir(dir.path()).expect("rules from dir");
        assert_eq!(rules.price.man_yen_threshold, 200);
        assert_eq!(rules.parse_price("300〜500"), PriceRange::new(300, 500));
    }

    #[test]
    fn missing_rules_file_reports_path() {
        let dir = tempdir().expect("tempdir");
        let err = RuleSet::from_dir(dir.path()).unwrap_err();
        match err {
            RulesError::Read { path, .. } => assert!(path.ends_with("roles.yaml")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
