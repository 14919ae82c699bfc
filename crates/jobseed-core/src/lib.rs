//! Core data model shared by the extraction, normalization and load stages.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobseed-core";

/// One input row as read from the delimited file, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// 0-based position among the data rows (header already removed).
    pub position: usize,
    pub columns: Vec<String>,
}

impl RawRecord {
    pub fn new(position: usize, columns: Vec<String>) -> Self {
        Self { position, columns }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// Column layout recognised for a row, chosen from its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowLayout {
    /// 9 or more columns: code, title, role, skills, price, location, summary, env, requirements.
    Full,
    /// Exactly 8 columns: the role column is absent.
    WithoutRole,
    /// 7 columns: no job code and no role; the code is synthesized.
    Legacy,
}

/// Typed raw fields pulled out of one row. Text is kept verbatim apart from the job code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub position: usize,
    pub layout: RowLayout,
    pub job_code: String,
    pub title: String,
    pub role_label: String,
    pub skills_text: String,
    pub price_text: String,
    pub location_text: String,
    pub summary: String,
    pub environment: String,
    pub requirements: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStyle {
    Onsite,
    Hybrid,
    Remote,
}

impl WorkStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStyle::Onsite => "onsite",
            WorkStyle::Hybrid => "hybrid",
            WorkStyle::Remote => "remote",
        }
    }
}

impl fmt::Display for WorkStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Published,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Published => "published",
        }
    }
}

/// Monthly price bounds in yen. Both bounds are zero when the source text had no digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: i64,
    pub max: i64,
}

impl PriceRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }
}

/// A role or a role category. Categories are roles without a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRole {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub sort_order: i32,
}

impl CanonicalRole {
    pub fn is_category(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalLocation {
    pub id: Uuid,
    pub region: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSkill {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub sort_order: i32,
}

/// Fully normalized job posting. Text fields are stored unescaped; escaping is the
/// concern of whichever sink writes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub job_code: String,
    pub title: String,
    pub role_id: Uuid,
    pub location_id: Uuid,
    pub work_style: WorkStyle,
    pub price_min: i64,
    pub price_max: i64,
    pub description_md: String,
    pub requirements_md: String,
    /// Ordered, duplicate-free.
    pub skill_ids: Vec<Uuid>,
    pub status: JobStatus,
    pub is_active: bool,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobSkillLink {
    pub job_id: Uuid,
    pub skill_id: Uuid,
}

/// Ordered load stages. Declaration order is the mandatory write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Locations,
    Roles,
    Skills,
    Jobs,
    JobSkills,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Locations,
        Phase::Roles,
        Phase::Skills,
        Phase::Jobs,
        Phase::JobSkills,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Phase::Locations => "locations",
            Phase::Roles => "roles",
            Phase::Skills => "skills",
            Phase::Jobs => "jobs",
            Phase::JobSkills => "job_skills",
        }
    }

    /// Master phases must succeed in full before fact phases run.
    pub fn is_master(&self) -> bool {
        matches!(self, Phase::Locations | Phase::Roles | Phase::Skills)
    }

    /// Reverse of the write order, used when clearing tables.
    pub fn dependents_first() -> impl Iterator<Item = Phase> {
        Self::ALL.into_iter().rev()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered_masters_first() {
        let order: Vec<_> = Phase::ALL.iter().map(|p| p.table()).collect();
        assert_eq!(order, vec!["locations", "roles", "skills", "jobs", "job_skills"]);
        assert!(Phase::ALL.windows(2).all(|w| w[0] < w[1]));
        assert!(Phase::ALL.iter().take(3).all(Phase::is_master));
        assert!(!Phase::Jobs.is_master());
    }

    #[test]
    fn clearing_order_starts_with_links() {
        let order: Vec<_> = Phase::dependents_first().collect();
        assert_eq!(order.first(), Some(&Phase::JobSkills));
        assert_eq!(order.last(), Some(&Phase::Locations));
    }

    #[test]
    fn work_style_serializes_lowercase() {
        let json = serde_json::to_string(&WorkStyle::Hybrid).expect("serialize");
        assert_eq!(json, "\"hybrid\"");
        assert_eq!(WorkStyle::Remote.to_string(), "remote");
    }
}
