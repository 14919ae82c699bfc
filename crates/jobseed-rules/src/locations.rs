use std::collections::HashSet;

use serde::Deserialize;

use crate::RulesError;

const FILE: &str = "locations.yaml";

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LocationsFile {
    version: u32,
    fallback: LocationFallback,
    entries: Vec<LocationRule>,
}

#[derive(Debug, Clone, Deserialize)]
struct LocationFallback {
    name: String,
    slug: String,
    region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocationRule {
    pub name: String,
    pub slug: String,
    pub region: String,
    pub keywords: Vec<String>,
}

/// Result of classifying one location text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationMatch<'a> {
    pub name: &'a str,
    pub slug: &'a str,
    pub region: &'a str,
    pub matched: bool,
}

#[derive(Debug, Clone)]
pub struct LocationTable {
    pub version: u32,
    fallback: LocationFallback,
    entries: Vec<LocationRule>,
    /// Lowercased keywords, parallel to `entries`.
    keywords: Vec<Vec<String>>,
}

impl LocationTable {
    pub(crate) fn from_file(file: LocationsFile) -> Result<Self, RulesError> {
        let mut names = HashSet::new();
        let mut slugs = HashSet::new();
        for entry in &file.entries {
            if !names.insert(entry.name.as_str()) || !slugs.insert(entry.slug.as_str()) {
                return Err(RulesError::invalid(
                    FILE,
                    format!("location {} ({}) is listed twice", entry.name, entry.slug),
                ));
            }
            if entry.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(RulesError::invalid(
                    FILE,
                    format!("location {} has an empty keyword", entry.name),
                ));
            }
        }
        if slugs.contains(file.fallback.slug.as_str()) {
            return Err(RulesError::invalid(
                FILE,
                format!("fallback slug {} collides with an entry", file.fallback.slug),
            ));
        }

        let keywords = file
            .entries
            .iter()
            .map(|e| e.keywords.iter().map(|k| k.to_lowercase()).collect())
            .collect();
        Ok(Self {
            version: file.version,
            fallback: file.fallback,
            entries: file.entries,
            keywords,
        })
    }

    /// First entry (in table order) with a keyword inside `text`; the fallback otherwise.
    pub fn classify(&self, text: &str) -> LocationMatch<'_> {
        let lowered = text.to_lowercase();
        let hit = self
            .entries
            .iter()
            .zip(&self.keywords)
            .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k.as_str())));
        match hit {
            Some((entry, _)) => LocationMatch {
                name: &entry.name,
                slug: &entry.slug,
                region: &entry.region,
                matched: true,
            },
            None => LocationMatch {
                name: &self.fallback.name,
                slug: &self.fallback.slug,
                region: &self.fallback.region,
                matched: false,
            },
        }
    }
}
