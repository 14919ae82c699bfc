//! The normalized dataset and its tabular shape, shared by both output modes.

use chrono::{DateTime, SecondsFormat, Utc};
use jobseed_core::{
    CanonicalLocation, CanonicalRole, CanonicalSkill, JobRecord, JobSkillLink, Phase,
};
use jobseed_storage::TableSchema;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::registry::MasterRegistry;

/// One typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Uuid(Uuid),
    Text(String),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl Cell {
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Uuid(id) => Value::String(id.to_string()),
            Cell::Text(text) => Value::String(text.clone()),
            Cell::Int(n) => Value::from(*n),
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Timestamp(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            Cell::Null => "NULL".to_string(),
            Cell::Uuid(id) => sql_quote(&id.to_string()),
            Cell::Text(text) => sql_quote(text),
            Cell::Int(n) => n.to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::Timestamp(ts) => sql_quote(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// Standard SQL string literal: single quotes doubled, everything else verbatim.
pub fn sql_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn optional_uuid(id: Option<Uuid>) -> Cell {
    id.map_or(Cell::Null, Cell::Uuid)
}

/// Column list, conflict key and reset filter column for one destination table.
#[derive(Debug, Clone, Copy)]
pub struct TableShape {
    pub phase: Phase,
    pub columns: &'static [&'static str],
    pub conflict_key: &'static [&'static str],
    pub reset_column: &'static str,
}

impl TableShape {
    pub fn of(phase: Phase) -> Self {
        match phase {
            Phase::Locations => Self {
                phase,
                columns: &["id", "region", "name", "slug"],
                conflict_key: &["slug"],
                reset_column: "id",
            },
            Phase::Roles => Self {
                phase,
                columns: &["id", "parent_id", "name", "slug", "sort_order", "is_active"],
                conflict_key: &["slug"],
                reset_column: "id",
            },
            Phase::Skills => Self {
                phase,
                columns: &["id", "name", "slug", "sort_order"],
                conflict_key: &["slug"],
                reset_column: "id",
            },
            Phase::Jobs => Self {
                phase,
                columns: &[
                    "id",
                    "job_code",
                    "title",
                    "role_id",
                    "work_style",
                    "price_min",
                    "price_max",
                    "location_id",
                    "description_md",
                    "requirements_md",
                    "status",
                    "is_active",
                    "published_at",
                ],
                conflict_key: &["job_code"],
                reset_column: "id",
            },
            Phase::JobSkills => Self {
                phase,
                columns: &["job_id", "skill_id"],
                conflict_key: &["job_id", "skill_id"],
                reset_column: "job_id",
            },
        }
    }

    pub fn table(&self) -> &'static str {
        self.phase.table()
    }

    pub fn conflict_target(&self) -> String {
        self.conflict_key.join(",")
    }

    /// Columns overwritten when a merge hits an existing natural key.
    pub fn update_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns
            .iter()
            .copied()
            .filter(|c| *c != "id" && !self.conflict_key.contains(c))
    }

    pub fn to_json(&self, row: &[Cell]) -> Value {
        let mut object = Map::with_capacity(self.columns.len());
        for (column, cell) in self.columns.iter().zip(row) {
            object.insert(column.to_string(), cell.to_json());
        }
        Value::Object(object)
    }
}

/// Tables and constraints of the destination store.
pub fn destination_schema() -> Vec<TableSchema> {
    vec![
        TableSchema::new("locations", &["id"]).unique(&["slug"]),
        TableSchema::new("roles", &["id"])
            .unique(&["slug"])
            .references("parent_id", "roles"),
        TableSchema::new("skills", &["id"]).unique(&["slug"]),
        TableSchema::new("jobs", &["id"])
            .unique(&["job_code"])
            .references("role_id", "roles")
            .references("location_id", "locations"),
        TableSchema::new("job_skills", &["job_id", "skill_id"])
            .references("job_id", "jobs")
            .references("skill_id", "skills"),
    ]
}

pub type Row = Vec<Cell>;

/// Everything one run writes.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub locations: Vec<CanonicalLocation>,
    pub roles: Vec<CanonicalRole>,
    pub skills: Vec<CanonicalSkill>,
    pub jobs: Vec<JobRecord>,
    pub links: Vec<JobSkillLink>,
}

impl Dataset {
    pub fn assemble(registry: &MasterRegistry, jobs: Vec<JobRecord>) -> Self {
        let links = jobs
            .iter()
            .flat_map(|job| {
                job.skill_ids.iter().map(move |skill_id| JobSkillLink {
                    job_id: job.id,
                    skill_id: *skill_id,
                })
            })
            .collect();
        Self {
            locations: registry.locations().to_vec(),
            roles: registry.roles().to_vec(),
            skills: registry.skills().to_vec(),
            jobs,
            links,
        }
    }

    pub fn row_count(&self, phase: Phase) -> usize {
        match phase {
            Phase::Locations => self.locations.len(),
            Phase::Roles => self.roles.len(),
            Phase::Skills => self.skills.len(),
            Phase::Jobs => self.jobs.len(),
            Phase::JobSkills => self.links.len(),
        }
    }

    /// Rows of one phase in write order. Roles come as two groups, categories then
    /// leaves, so no row references a parent written in the same statement.
    pub fn row_groups(&self, phase: Phase) -> Vec<Vec<Row>> {
        match phase {
            Phase::Locations => vec![self.locations.iter().map(location_row).collect()],
            Phase::Roles => {
                let (categories, leaves): (Vec<_>, Vec<_>) =
                    self.roles.iter().partition(|r| r.is_category());
                vec![
                    categories.into_iter().map(role_row).collect(),
                    leaves.into_iter().map(role_row).collect(),
                ]
            }
            Phase::Skills => vec![self.skills.iter().map(skill_row).collect()],
            Phase::Jobs => vec![self.jobs.iter().map(job_row).collect()],
            Phase::JobSkills => vec![self.links.iter().map(link_row).collect()],
        }
    }
}

pub fn location_row(location: &CanonicalLocation) -> Row {
    vec![
        Cell::Uuid(location.id),
        Cell::Text(location.region.clone()),
        Cell::Text(location.name.clone()),
        Cell::Text(location.slug.clone()),
    ]
}

pub fn role_row(role: &CanonicalRole) -> Row {
    vec![
        Cell::Uuid(role.id),
        optional_uuid(role.parent_id),
        Cell::Text(role.name.clone()),
        Cell::Text(role.slug.clone()),
        Cell::Int(role.sort_order.into()),
        Cell::Bool(true),
    ]
}

pub fn skill_row(skill: &CanonicalSkill) -> Row {
    vec![
        Cell::Uuid(skill.id),
        Cell::Text(skill.name.clone()),
        Cell::Text(skill.slug.clone()),
        Cell::Int(skill.sort_order.into()),
    ]
}

pub fn job_row(job: &JobRecord) -> Row {
    vec![
        Cell::Uuid(job.id),
        Cell::Text(job.job_code.clone()),
        Cell::Text(job.title.clone()),
        Cell::Uuid(job.role_id),
        Cell::Text(job.work_style.as_str().to_string()),
        Cell::Int(job.price_min),
        Cell::Int(job.price_max),
        Cell::Uuid(job.location_id),
        Cell::Text(job.description_md.clone()),
        Cell::Text(job.requirements_md.clone()),
        Cell::Text(job.status.as_str().to_string()),
        Cell::Bool(job.is_active),
        Cell::Timestamp(job.published_at),
    ]
}

pub fn link_row(link: &JobSkillLink) -> Row {
    vec![Cell::Uuid(link.job_id), Cell::Uuid(link.skill_id)]
}
