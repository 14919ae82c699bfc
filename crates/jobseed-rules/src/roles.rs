use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::RulesError;

const FILE: &str = "roles.yaml";

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RolesFile {
    version: u32,
    default_slug: String,
    categories: Vec<RoleCategory>,
    #[serde(default)]
    aliases: Vec<RoleLabel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoleCategory {
    pub slug: String,
    pub name: String,
    pub labels: Vec<RoleLabel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoleLabel {
    pub label: String,
    pub slug: String,
}

/// A leaf role as seeded into the registry: the first label mapped to a slug names it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafRole {
    pub slug: String,
    pub name: String,
    pub category_slug: String,
}

#[derive(Debug, Clone)]
pub struct RoleTable {
    pub version: u32,
    default_slug: String,
    categories: Vec<RoleCategory>,
    /// Category labels in file order followed by aliases.
    labels: Vec<RoleLabel>,
    exact: HashMap<String, usize>,
    leaves: Vec<LeafRole>,
}

impl RoleTable {
    pub(crate) fn from_file(file: RolesFile) -> Result<Self, RulesError> {
        let mut leaves: Vec<LeafRole> = Vec::new();
        let mut leaf_slugs = HashSet::new();
        let mut category_slugs = HashSet::new();
        let mut labels = Vec::new();

        for category in &file.categories {
            if !category_slugs.insert(category.slug.as_str()) {
                return Err(RulesError::invalid(
                    FILE,
                    format!("duplicate category slug {}", category.slug),
                ));
            }
            for label in &category.labels {
                if leaf_slugs.insert(label.slug.clone()) {
                    leaves.push(LeafRole {
                        slug: label.slug.clone(),
                        name: label.label.clone(),
                        category_slug: category.slug.clone(),
                    });
                }
                labels.push(label.clone());
            }
        }

        if let Some(clash) = leaves.iter().find(|l| category_slugs.contains(l.slug.as_str())) {
            return Err(RulesError::invalid(
                FILE,
                format!("role slug {} is also a category slug", clash.slug),
            ));
        }
        for alias in &file.aliases {
            if !leaf_slugs.contains(&alias.slug) {
                return Err(RulesError::invalid(
                    FILE,
                    format!("alias {} points at unknown slug {}", alias.label, alias.slug),
                ));
            }
            labels.push(alias.clone());
        }
        if !leaf_slugs.contains(&file.default_slug) {
            return Err(RulesError::invalid(
                FILE,
                format!("default slug {} is not a known role", file.default_slug),
            ));
        }

        let mut exact = HashMap::new();
        for (idx, label) in labels.iter().enumerate() {
            exact.entry(label.label.clone()).or_insert(idx);
        }

        Ok(Self {
            version: file.version,
            default_slug: file.default_slug,
            categories: file.categories,
            labels,
            exact,
            leaves,
        })
    }

    pub fn categories(&self) -> &[RoleCategory] {
        &self.categories
    }

    pub fn labels(&self) -> &[RoleLabel] {
        &self.labels
    }

    pub fn leaf_roles(&self) -> &[LeafRole] {
        &self.leaves
    }

    pub fn default_slug(&self) -> &str {
        &self.default_slug
    }

    /// Maps a role label (falling back to the job title) to a known role slug.
    ///
    /// Priority: exact label, a known label inside the role text, a known label inside
    /// the title, then the default slug. Labels are CJK so matching is case-sensitive.
    pub fn classify(&self, role_label: &str, title: &str) -> &str {
        let role_label = role_label.trim();
        if !role_label.is_empty() {
            if let Some(&idx) = self.exact.get(role_label) {
                return &self.labels[idx].slug;
            }
            if let Some(found) = self.first_contained_in(role_label) {
                return found;
            }
        }
        let title = title.trim();
        if !title.is_empty() {
            if let Some(found) = self.first_contained_in(title) {
                return found;
            }
        }
        &self.default_slug
    }

    fn first_contained_in(&self, text: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| text.contains(l.label.as_str()))
            .map(|l| l.slug.as_str())
    }
}

#[cfg(test)]
mod tests {
    use crate::RuleSet;

    fn table() -> crate::RoleTable {
        RuleSet::builtin().expect("builtin rules").roles
    }

    #[test]
    fn exact_label_wins() {
        let roles = table();
        assert_eq!(roles.classify("PMO", "インフラエンジニア募集"), "pmo");
        assert_eq!(roles.classify("システムエンジニア(SE)", ""), "system-engineer");
    }

    #[test]
    fn label_contained_in_role_text() {
        let roles = table();
        assert_eq!(roles.classify("シニアゲームディレクター", ""), "game-director");
        assert_eq!(roles.classify("Web系マーケター", ""), "web-marketer");
    }

    #[test]
    fn title_is_consulted_after_role_text() {
        let roles = table();
        assert_eq!(roles.classify("", "【急募】インフラエンジニア/AWS"), "infrastructure-engineer");
        assert_eq!(roles.classify("不明", "SAPコンサルタント案件"), "sap-consultant");
    }

    #[test]
    fn unknown_text_falls_back_to_default() {
        let roles = table();
        assert_eq!(roles.classify("", ""), "system-engineer");
        assert_eq!(roles.classify("営業", "案件"), "system-engineer");
    }

    #[test]
    fn alias_labels_resolve_after_categories() {
        let roles = table();
        assert_eq!(roles.classify("事務", ""), "technical-support");
        assert_eq!(roles.labels().last().unwrap().label, "事務");
    }

    #[test]
    fn leaf_roles_carry_their_first_label_and_category() {
        let roles = table();
        let marketer = roles
            .leaf_roles()
            .iter()
            .find(|l| l.slug == "web-marketer")
            .expect("web marketer");
        assert_eq!(marketer.name, "Webマーケター");
        assert_eq!(marketer.category_slug, "marketer");

        let support = roles
            .leaf_roles()
            .iter()
            .find(|l| l.slug == "technical-support")
            .expect("technical support");
        assert_eq!(support.category_slug, "engineer");

        let slugs: std::collections::HashSet<_> =
            roles.leaf_roles().iter().map(|l| l.slug.as_str()).collect();
        assert_eq!(slugs.len(), roles.leaf_roles().len());
    }

    #[test]
    fn unknown_alias_target_is_rejected() {
        let yaml = r#"
version: 1
default_slug: a
categories:
  - { slug: cat, name: Cat, labels: [ { label: A, slug: a } ] }
aliases:
  - { label: B, slug: missing }
"#;
        let file = serde_yaml::from_str(yaml).expect("parse yaml");
        assert!(crate::RoleTable::from_file(file).is_err());
    }
}
