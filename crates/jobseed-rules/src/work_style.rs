use jobseed_core::WorkStyle;
use serde::Deserialize;

/// Keyword rule for remote work. Keywords are compared case-insensitively.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkStylePolicy {
    pub remote_keywords: Vec<String>,
    pub full_keywords: Vec<String>,
}

impl WorkStylePolicy {
    /// `onsite` unless a remote keyword appears in either text; `remote` when a "full"
    /// qualifier also appears in either text, `hybrid` otherwise.
    pub fn classify(&self, location_text: &str, requirements_text: &str) -> WorkStyle {
        let texts = [location_text.to_lowercase(), requirements_text.to_lowercase()];
        let mentions = |keywords: &[String]| {
            keywords
                .iter()
                .map(|k| k.to_lowercase())
                .any(|k| texts.iter().any(|t| t.contains(&k)))
        };

        if !mentions(&self.remote_keywords) {
            WorkStyle::Onsite
        } else if mentions(&self.full_keywords) {
            WorkStyle::Remote
        } else {
            WorkStyle::Hybrid
        }
    }
}
