//! Run-scoped master data: one identifier per canonical key.

use std::collections::{HashMap, HashSet};

use jobseed_core::{CanonicalLocation, CanonicalRole, CanonicalSkill};
use jobseed_rules::{slugify, RoleTable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SKILL_SLUG_MAX_CHARS: usize = 40;
const SKILL_SLUG_MIN_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Role,
    Location,
    Skill,
    Job,
}

impl EntityKind {
    fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Role => "role",
            EntityKind::Location => "location",
            EntityKind::Skill => "skill",
            EntityKind::Job => "job",
        }
    }
}

/// How identifiers are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Fresh v4 ids every run.
    Random,
    /// v5 ids over the natural key, identical across runs.
    NaturalKey,
}

impl IdStrategy {
    pub fn id_for(&self, kind: EntityKind, natural_key: &str) -> Uuid {
        match self {
            IdStrategy::Random => Uuid::new_v4(),
            IdStrategy::NaturalKey => Uuid::new_v5(
                &Uuid::NAMESPACE_URL,
                format!("jobseed:{}:{}", kind.as_str(), natural_key).as_bytes(),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MasterRegistry {
    strategy: IdStrategy,
    roles: Vec<CanonicalRole>,
    role_ids: HashMap<String, Uuid>,
    locations: Vec<CanonicalLocation>,
    location_ids: HashMap<String, Uuid>,
    skills: Vec<CanonicalSkill>,
    skill_ids: HashMap<String, Uuid>,
    skill_slugs: HashSet<String>,
    issued: HashSet<Uuid>,
}

impl MasterRegistry {
    /// Registers every category and leaf role up front so row processing only reads roles.
    pub fn seeded(roles: &RoleTable, strategy: IdStrategy) -> Self {
        let mut registry = Self {
            strategy,
            roles: Vec::new(),
            role_ids: HashMap::new(),
            locations: Vec::new(),
            location_ids: HashMap::new(),
            skills: Vec::new(),
            skill_ids: HashMap::new(),
            skill_slugs: HashSet::new(),
            issued: HashSet::new(),
        };

        for (idx, category) in roles.categories().iter().enumerate() {
            let id = registry.issue(EntityKind::Role, &category.slug);
            registry.role_ids.insert(category.slug.clone(), id);
            registry.roles.push(CanonicalRole {
                id,
                parent_id: None,
                name: category.name.clone(),
                slug: category.slug.clone(),
                sort_order: idx as i32 + 1,
            });
        }

        let mut per_category: HashMap<&str, i32> = HashMap::new();
        for leaf in roles.leaf_roles() {
            let parent_id = registry.role_ids.get(&leaf.category_slug).copied();
            let order = per_category.entry(leaf.category_slug.as_str()).or_default();
            *order += 1;
            let id = registry.issue(EntityKind::Role, &leaf.slug);
            registry.role_ids.insert(leaf.slug.clone(), id);
            registry.roles.push(CanonicalRole {
                id,
                parent_id,
                name: leaf.name.clone(),
                slug: leaf.slug.clone(),
                sort_order: *order,
            });
        }
        registry
    }

    pub fn strategy(&self) -> IdStrategy {
        self.strategy
    }

    fn issue(&mut self, kind: EntityKind, natural_key: &str) -> Uuid {
        let mut id = self.strategy.id_for(kind, natural_key);
        // v4 collisions are astronomically unlikely; v5 ones mean two keys hashed alike.
        while !self.issued.insert(id) {
            id = Uuid::new_v4();
        }
        id
    }

    pub fn get_role_id(&self, slug: &str) -> Option<Uuid> {
        self.role_ids.get(slug).copied()
    }

    /// Keyed by normalized name; the first sighting fixes slug and region.
    pub fn get_or_create_location_id(&mut self, name: &str, slug: &str, region: &str) -> Uuid {
        if let Some(id) = self.location_ids.get(name) {
            return *id;
        }
        let id = self.issue(EntityKind::Location, slug);
        self.location_ids.insert(name.to_string(), id);
        self.locations.push(CanonicalLocation {
            id,
            region: region.to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
        });
        id
    }

    pub fn get_or_create_skill_id(&mut self, name: &str) -> Uuid {
        if let Some(id) = self.skill_ids.get(name) {
            return *id;
        }
        let id = self.issue(EntityKind::Skill, name);
        let slug = self.unique_skill_slug(name, id);
        self.skill_ids.insert(name.to_string(), id);
        self.skills.push(CanonicalSkill {
            id,
            name: name.to_string(),
            slug,
            sort_order: self.skills.len() as i32 + 1,
        });
        id
    }

    fn unique_skill_slug(&mut self, name: &str, id: Uuid) -> String {
        let base = slugify(name);
        let mut slug = if base.chars().count() < SKILL_SLUG_MIN_CHARS {
            format!("skill-{id}")
        } else {
            let head: String = base.chars().take(SKILL_SLUG_MAX_CHARS).collect();
            let head = head.trim_end_matches('-');
            format!("{head}-{}", &id.simple().to_string()[..8])
        };
        if self.skill_slugs.contains(&slug) {
            slug = format!("{}-{}", slugify(name), id.simple());
        }
        self.skill_slugs.insert(slug.clone());
        slug
    }

    pub fn role_slug(&self, id: Uuid) -> Option<&str> {
        self.roles
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.slug.as_str())
    }

    pub fn location(&self, id: Uuid) -> Option<&CanonicalLocation> {
        self.locations.iter().find(|l| l.id == id)
    }

    pub fn skill(&self, id: Uuid) -> Option<&CanonicalSkill> {
        self.skills.iter().find(|s| s.id == id)
    }

    /// Categories first, then leaves.
    pub fn roles(&self) -> &[CanonicalRole] {
        &self.roles
    }

    pub fn locations(&self) -> &[CanonicalLocation] {
        &self.locations
    }

    pub fn skills(&self) -> &[CanonicalSkill] {
        &self.skills
    }
}
