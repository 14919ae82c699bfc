use chrono::{DateTime, Utc};
use jobseed_core::{ExtractedFields, JobRecord, JobStatus, WorkStyle};
use jobseed_rules::RuleSet;
use thiserror::Error;

use crate::registry::{EntityKind, MasterRegistry};

pub const TITLE_PLACEHOLDER: &str = "エンジニア案件";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("row {position}: role slug {slug} is not registered")]
    UnknownRole { position: usize, slug: String },
}

/// What the classifiers decided for one row, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub role_slug: String,
    pub location_name: String,
    pub location_matched: bool,
    pub work_style: WorkStyle,
}

#[derive(Debug, Clone)]
pub struct BuiltJob {
    pub position: usize,
    pub job: JobRecord,
    pub classification: Classification,
}

/// Turns extracted fields into job records, registering masters on first sight.
#[derive(Debug)]
pub struct RecordBuilder<'a> {
    rules: &'a RuleSet,
    published_at: DateTime<Utc>,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(rules: &'a RuleSet, published_at: DateTime<Utc>) -> Self {
        Self {
            rules,
            published_at,
        }
    }

    pub fn build(
        &self,
        fields: &ExtractedFields,
        registry: &mut MasterRegistry,
    ) -> Result<BuiltJob, BuildError> {
        let title = match fields.title.trim() {
            "" => TITLE_PLACEHOLDER.to_string(),
            title => title.to_string(),
        };

        let role_slug = self.rules.classify_role(&fields.role_label, &title);
        let role_id = registry
            .get_role_id(role_slug)
            .ok_or_else(|| BuildError::UnknownRole {
                position: fields.position,
                slug: role_slug.to_string(),
            })?;

        let location = self.rules.classify_location(&fields.location_text);
        let location_id =
            registry.get_or_create_location_id(location.name, location.slug, location.region);

        let work_style = self
            .rules
            .classify_work_style(&fields.location_text, &fields.requirements);
        let price = self.rules.parse_price(&fields.price_text);

        let mut skill_ids = Vec::new();
        for name in self.rules.canonicalize_skills(&fields.skills_text) {
            let id = registry.get_or_create_skill_id(&name);
            if !skill_ids.contains(&id) {
                skill_ids.push(id);
            }
        }

        let job_code = fields.job_code.clone();
        let job = JobRecord {
            id: registry.strategy().id_for(EntityKind::Job, &job_code),
            job_code,
            title,
            role_id,
            location_id,
            work_style,
            price_min: price.min,
            price_max: price.max,
            description_md: description_markdown(&fields.summary, &fields.environment),
            requirements_md: requirements_markdown(&fields.requirements),
            skill_ids,
            status: JobStatus::Published,
            is_active: true,
            published_at: self.published_at,
        };

        Ok(BuiltJob {
            position: fields.position,
            job,
            classification: Classification {
                role_slug: role_slug.to_string(),
                location_name: location.name.to_string(),
                location_matched: location.matched,
                work_style,
            },
        })
    }
}

pub fn description_markdown(summary: &str, environment: &str) -> String {
    format!("## 【案件概要】\n{summary}\n\n### 【開発環境】\n{environment}")
}

pub fn requirements_markdown(requirements: &str) -> String {
    format!("## 【募集要項・条件】\n{requirements}")
}
