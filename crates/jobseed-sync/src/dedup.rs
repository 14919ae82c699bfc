use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::builder::BuiltJob;
use crate::registry::{EntityKind, IdStrategy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub position: usize,
    pub original: String,
    pub renamed: String,
}

/// Makes job codes unique in encounter order.
///
/// The n-th occurrence of a code becomes `{code}-{n}`; when that candidate is itself
/// already taken, n keeps counting up. Under natural-key ids the job id follows the
/// final code.
pub fn dedupe_job_codes(jobs: &mut [BuiltJob], strategy: IdStrategy) -> Vec<Rename> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    let mut renames = Vec::new();

    for built in jobs.iter_mut() {
        let code = built.job.job_code.clone();
        let seen = occurrences.entry(code.clone()).or_default();
        *seen += 1;

        if *seen == 1 && taken.insert(code.clone()) {
            continue;
        }

        let mut n = (*seen).max(2);
        let mut candidate = format!("{code}-{n}");
        while taken.contains(&candidate) {
            n += 1;
            candidate = format!("{code}-{n}");
        }
        taken.insert(candidate.clone());

        built.job.job_code = candidate.clone();
        if strategy == IdStrategy::NaturalKey {
            built.job.id = strategy.id_for(EntityKind::Job, &candidate);
        }
        renames.push(Rename {
            position: built.position,
            original: code,
            renamed: candidate,
        });
    }
    renames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Classification;
    use chrono::Utc;
    use jobseed_core::{JobRecord, JobStatus, WorkStyle};
    use uuid::Uuid;

    fn job(position: usize, code: &str) -> BuiltJob {
        BuiltJob {
            position,
            job: JobRecord {
                id: Uuid::new_v4(),
                job_code: code.to_string(),
                title: "t".to_string(),
                role_id: Uuid::nil(),
                location_id: Uuid::nil(),
                work_style: WorkStyle::Onsite,
                price_min: 0,
                price_max: 0,
                description_md: String::new(),
                requirements_md: String::new(),
                skill_ids: Vec::new(),
                status: JobStatus::Published,
                is_active: true,
                published_at: Utc::now(),
            },
            classification: Classification {
                role_slug: "sre".to_string(),
                location_name: "東京".to_string(),
                location_matched: true,
                work_style: WorkStyle::Onsite,
            },
        }
    }

    fn codes(jobs: &[BuiltJob]) -> Vec<&str> {
        jobs.iter().map(|j| j.job.job_code.as_str()).collect()
    }

    #[test]
    fn repeated_codes_get_occurrence_suffixes() {
        let mut jobs = vec![job(0, "J-1"), job(1, "J-2"), job(2, "J-1"), job(3, "J-1")];
        let renames = dedupe_job_codes(&mut jobs, IdStrategy::Random);
        assert_eq!(codes(&jobs), vec!["J-1", "J-2", "J-1-2", "J-1-3"]);
        assert_eq!(
            renames,
            vec![
                Rename {
                    position: 2,
                    original: "J-1".to_string(),
                    renamed: "J-1-2".to_string()
                },
                Rename {
                    position: 3,
                    original: "J-1".to_string(),
                    renamed: "J-1-3".to_string()
                },
            ]
        );
    }

    #[test]
    fn renames_never_collide_with_literal_codes() {
        let mut jobs = vec![job(0, "A"), job(1, "A-2"), job(2, "A"), job(3, "A-2")];
        dedupe_job_codes(&mut jobs, IdStrategy::Random);
        assert_eq!(codes(&jobs), vec!["A", "A-2", "A-3", "A-2-2"]);

        let mut jobs = vec![job(0, "A"), job(1, "A"), job(2, "A-2")];
        dedupe_job_codes(&mut jobs, IdStrategy::Random);
        assert_eq!(codes(&jobs), vec!["A", "A-2", "A-2-2"]);
    }

    #[test]
    fn unique_codes_are_untouched() {
        let mut jobs = vec![job(0, "X"), job(1, "Y")];
        assert!(dedupe_job_codes(&mut jobs, IdStrategy::Random).is_empty());
        assert_eq!(codes(&jobs), vec!["X", "Y"]);
    }

    #[test]
    fn natural_key_ids_follow_the_final_code() {
        let strategy = IdStrategy::NaturalKey;
        let mut jobs = vec![job(0, "J-1"), job(1, "J-1")];
        dedupe_job_codes(&mut jobs, strategy);
        assert_eq!(jobs[1].job.id, strategy.id_for(EntityKind::Job, "J-1-2"));
    }
}
