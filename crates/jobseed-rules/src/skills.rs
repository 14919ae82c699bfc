use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::RulesError;

const FILE: &str = "skills.yaml";

static PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(.*?\)|（.*?）").expect("valid parenthetical regex"));
static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SkillsFile {
    version: u32,
    max_verbatim_chars: usize,
    min_substring_alias_chars: usize,
    canonical: Vec<SkillRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SkillRule {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SkillTable {
    pub version: u32,
    max_verbatim_chars: usize,
    min_substring_alias_chars: usize,
    rules: Vec<SkillRule>,
    /// (lowercase alias, index into `rules`) in first-listed order.
    aliases: Vec<(String, usize)>,
    by_alias: HashMap<String, usize>,
}

impl SkillTable {
    pub(crate) fn from_file(file: SkillsFile) -> Result<Self, RulesError> {
        let mut aliases: Vec<(String, usize)> = Vec::new();
        let mut by_alias: HashMap<String, usize> = HashMap::new();

        for (rule_idx, rule) in file.canonical.iter().enumerate() {
            if rule.name.trim().is_empty() {
                return Err(RulesError::invalid(FILE, format!("entry {rule_idx} has no name")));
            }
            let names = std::iter::once(&rule.name).chain(rule.aliases.iter());
            for alias in names.map(|a| a.trim().to_lowercase()).filter(|a| !a.is_empty()) {
                match by_alias.get(&alias) {
                    Some(&pos) => aliases[pos].1 = rule_idx,
                    None => {
                        by_alias.insert(alias.clone(), aliases.len());
                        aliases.push((alias, rule_idx));
                    }
                }
            }
        }

        Ok(Self {
            version: file.version,
            max_verbatim_chars: file.max_verbatim_chars,
            min_substring_alias_chars: file.min_substring_alias_chars,
            rules: file.canonical,
            aliases,
            by_alias,
        })
    }

    pub fn rules(&self) -> &[SkillRule] {
        &self.rules
    }

    /// Canonical skill names for a free-text skill list, unique, in first-seen order.
    pub fn canonicalize(&self, text: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for raw in text.split([',', '、', '\n']) {
            let cleaned = PARENTHETICAL.replace_all(raw, "");
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                continue;
            }
            if let Some(name) = self.resolve(cleaned) {
                if !out.iter().any(|seen| seen == name) {
                    out.push(name.to_string());
                }
            }
        }
        out
    }

    /// Exact alias, then first alias contained in the entry, then the entry itself when short.
    pub fn resolve<'a>(&'a self, entry: &'a str) -> Option<&'a str> {
        let lowered = entry.to_lowercase();
        if let Some(&pos) = self.by_alias.get(&lowered) {
            return Some(&self.rules[self.aliases[pos].1].name);
        }
        let contained = self.aliases.iter().find(|(alias, _)| {
            alias.chars().count() >= self.min_substring_alias_chars && lowered.contains(alias.as_str())
        });
        if let Some((_, rule_idx)) = contained {
            return Some(&self.rules[*rule_idx].name);
        }
        (entry.chars().count() < self.max_verbatim_chars).then_some(entry)
    }
}

/// Lowercase ASCII slug with runs of anything else collapsed to `-`.
pub fn slugify(name: &str) -> String {
    NON_SLUG
        .replace_all(&name.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuleSet;

    fn table() -> SkillTable {
        RuleSet::builtin().expect("builtin rules").skills
    }

    #[test]
    fn substring_alias_absorbs_suffixes() {
        assert_eq!(table().canonicalize("AWS構築"), vec!["AWS"]);
        assert_eq!(table().canonicalize("AWS, AWS構築, EC2"), vec!["AWS"]);
    }

    #[test]
    fn parentheticals_are_stripped_before_matching() {
        assert_eq!(
            table().canonicalize("Java(Spring Boot)、Python（Django）"),
            vec!["Java", "Python"]
        );
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        assert_eq!(table().canonicalize("PYTHON\nmysql"), vec!["Python", "SQL"]);
        assert_eq!(table().canonicalize("google cloud"), vec!["Google Cloud Platform(GCP)"]);
    }

    #[test]
    fn later_definition_owns_a_shared_alias() {
        assert_eq!(table().canonicalize("laravel, rails"), vec!["Laravel", "Ruby on Rails"]);
    }

    #[test]
    fn order_is_first_seen_and_unique() {
        assert_eq!(
            table().canonicalize("React, TypeScript, react.js"),
            vec!["React", "TypeScript"]
        );
    }

    #[test]
    fn unknown_short_entries_are_kept_verbatim() {
        assert_eq!(table().canonicalize("Rust, Python"), vec!["Rust", "Python"]);
    }

    #[test]
    fn long_unmatched_entries_are_dropped() {
        let long = "要件定義から運用保守まで一貫して担当できる方を募集しています";
        assert_eq!(long.chars().count(), 30);
        assert!(table().canonicalize(long).is_empty());
    }

    #[test]
    fn empty_entries_are_skipped() {
        assert_eq!(table().canonicalize("Python,, ,AWS\n"), vec!["Python", "AWS"]);
        assert!(table().canonicalize("").is_empty());
        assert!(table().canonicalize("(備考)").is_empty());
    }

    #[test]
    fn slugify_collapses_non_ascii() {
        assert_eq!(slugify("Ruby on Rails"), "ruby-on-rails");
        assert_eq!(slugify("Go言語"), "go");
        assert_eq!(slugify("Google Cloud Platform(GCP)"), "google-cloud-platform-gcp");
        assert_eq!(slugify("日本語"), "");
    }
}
