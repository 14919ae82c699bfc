//! Seed script rendering: one INSERT per bounded group of rows, grouped into
//! transaction-wrapped documents.

use jobseed_core::Phase;
use jobseed_storage::ScriptChunk;

use crate::config::{BatchSizes, WriteMode};
use crate::dataset::{Dataset, Row, TableShape};

pub const SINGLE_DOCUMENT_NAME: &str = "seed.sql";

#[derive(Debug, Clone, Copy)]
pub struct ScriptOptions {
    pub mode: WriteMode,
    pub statement_rows: BatchSizes,
    pub max_statements_per_chunk: usize,
}

/// Section of the output: the reset block or one phase.
struct Section {
    label: &'static str,
    statements: Vec<String>,
}

fn sections(dataset: &Dataset, options: &ScriptOptions) -> Vec<Section> {
    let mut sections = Vec::new();
    if options.mode == WriteMode::Replace {
        sections.push(Section {
            label: "reset",
            statements: Phase::dependents_first()
                .map(|phase| format!("TRUNCATE TABLE public.{} CASCADE;", phase.table()))
                .collect(),
        });
    }
    for phase in Phase::ALL {
        let shape = TableShape::of(phase);
        let per_statement = options.statement_rows.for_phase(phase);
        let statements: Vec<String> = dataset
            .row_groups(phase)
            .iter()
            .flat_map(|group| group.chunks(per_statement))
            .map(|rows| insert_statement(&shape, rows, options.mode))
            .collect();
        if !statements.is_empty() {
            sections.push(Section {
                label: phase.table(),
                statements,
            });
        }
    }
    sections
}

/// Numbered documents `seed_{NN}_{label}.sql` of at most `max_statements_per_chunk`
/// statements each, in execution order. Numbers are zero-padded to the width of the
/// chunk count (at least two digits) so names sort in execution order.
pub fn render_chunks(dataset: &Dataset, options: &ScriptOptions) -> Vec<ScriptChunk> {
    let per_chunk = options.max_statements_per_chunk.max(1);
    let mut parts = Vec::new();
    for section in sections(dataset, options) {
        let count = section.statements.len().div_ceil(per_chunk);
        for (part, statements) in section.statements.chunks(per_chunk).enumerate() {
            parts.push((
                section.label,
                transaction(
                    &format!("{} ({} of {})", section.label, part + 1, count),
                    statements,
                ),
                statements.len(),
            ));
        }
    }

    let width = parts.len().to_string().len().max(2);
    parts
        .into_iter()
        .enumerate()
        .map(|(idx, (label, contents, statements))| ScriptChunk {
            file_name: format!("seed_{:0width$}_{label}.sql", idx + 1),
            contents,
            statements,
        })
        .collect()
}

/// Everything in one document, each section its own transaction.
pub fn render_document(dataset: &Dataset, options: &ScriptOptions) -> ScriptChunk {
    let sections = sections(dataset, options);
    let statements = sections.iter().map(|s| s.statements.len()).sum();
    let contents = sections
        .iter()
        .map(|s| transaction(s.label, &s.statements))
        .collect::<Vec<_>>()
        .join("\n");
    ScriptChunk {
        file_name: SINGLE_DOCUMENT_NAME.to_string(),
        contents,
        statements,
    }
}

fn transaction(title: &str, statements: &[String]) -> String {
    format!("-- {title}\nBEGIN;\n\n{}\n\nCOMMIT;\n", statements.join("\n\n"))
}

pub fn insert_statement(shape: &TableShape, rows: &[Row], mode: WriteMode) -> String {
    let values = rows
        .iter()
        .map(|row| {
            let cells: Vec<String> = row.iter().map(|cell| cell.to_sql()).collect();
            format!("  ({})", cells.join(", "))
        })
        .collect::<Vec<_>>()
        .join(",\n");

    let mut statement = format!(
        "INSERT INTO public.{} ({}) VALUES\n{}",
        shape.table(),
        shape.columns.join(", "),
        values
    );
    if mode == WriteMode::Merge {
        let updates: Vec<String> = shape
            .update_columns()
            .map(|column| format!("{column} = EXCLUDED.{column}"))
            .collect();
        let target = shape.conflict_key.join(", ");
        if updates.is_empty() {
            statement.push_str(&format!("\nON CONFLICT ({target}) DO NOTHING"));
        } else {
            statement.push_str(&format!(
                "\nON CONFLICT ({target}) DO UPDATE SET {}",
                updates.join(", ")
            ));
        }
    }
    statement.push(';');
    statement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Cell;
    use jobseed_core::{CanonicalLocation, CanonicalSkill};
    use uuid::Uuid;

    fn options(mode: WriteMode, max_statements_per_chunk: usize) -> ScriptOptions {
        ScriptOptions {
            mode,
            statement_rows: BatchSizes {
                masters: 2,
                jobs: 2,
                links: 2,
            },
            max_statements_per_chunk,
        }
    }

    fn dataset() -> Dataset {
        Dataset {
            locations: vec![CanonicalLocation {
                id: Uuid::nil(),
                region: "関東".into(),
                name: "東京".into(),
                slug: "tokyo".into(),
            }],
            skills: (0..5)
                .map(|i| CanonicalSkill {
                    id: Uuid::new_v4(),
                    name: format!("S{i}'s"),
                    slug: format!("s{i}"),
                    sort_order: i + 1,
                })
                .collect(),
            ..Dataset::default()
        }
    }

    #[test]
    fn text_literals_double_single_quotes() {
        let shape = TableShape::of(Phase::Locations);
        let sql = insert_statement(
            &shape,
            &[vec![
                Cell::Uuid(Uuid::nil()),
                Cell::Text("関東".into()),
                Cell::Text("O'Hare".into()),
                Cell::Text("ohare".into()),
            ]],
            WriteMode::Replace,
        );
        assert_eq!(
            sql,
            "INSERT INTO public.locations (id, region, name, slug) VALUES\n  \
             ('00000000-0000-0000-0000-000000000000', '関東', 'O''Hare', 'ohare');"
        );
    }

    #[test]
    fn merge_statements_upsert_on_natural_keys() {
        let sql = insert_statement(
            &TableShape::of(Phase::Skills),
            &[vec![
                Cell::Uuid(Uuid::nil()),
                Cell::Text("Go言語".into()),
                Cell::Text("go".into()),
                Cell::Int(1),
            ]],
            WriteMode::Merge,
        );
        assert!(sql.ends_with(
            "ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name, sort_order = EXCLUDED.sort_order;"
        ));

        let sql = insert_statement(
            &TableShape::of(Phase::JobSkills),
            &[vec![Cell::Uuid(Uuid::nil()), Cell::Uuid(Uuid::nil())]],
            WriteMode::Merge,
        );
        assert!(sql.ends_with("ON CONFLICT (job_id, skill_id) DO NOTHING;"));
    }

    #[test]
    fn chunks_are_numbered_bounded_and_ordered() {
        let chunks = render_chunks(&dataset(), &options(WriteMode::Replace, 2));
        let names: Vec<_> = chunks.iter().map(|c| c.file_name.as_str()).collect();
        // reset: 5 truncates, locations: 1 insert, skills: 5 rows at 2 per insert = 3
        assert_eq!(
            names,
            vec![
                "seed_01_reset.sql",
                "seed_02_reset.sql",
                "seed_03_reset.sql",
                "seed_04_locations.sql",
                "seed_05_skills.sql",
                "seed_06_skills.sql",
            ]
        );
        assert!(chunks.iter().all(|c| c.statements <= 2));
        assert!(chunks[0].contents.contains("TRUNCATE TABLE public.job_skills CASCADE;"));
        assert!(chunks
            .iter()
            .all(|c| c.contents.contains("BEGIN;") && c.contents.ends_with("COMMIT;\n")));
        assert!(chunks[4].contents.contains("'S0''s'"));
    }

    #[test]
    fn chunk_numbers_widen_past_ninety_nine() {
        let dataset = Dataset {
            skills: (0..120)
                .map(|i| CanonicalSkill {
                    id: Uuid::new_v4(),
                    name: format!("S{i}"),
                    slug: format!("s{i}"),
                    sort_order: i + 1,
                })
                .collect(),
            ..Dataset::default()
        };
        let chunks = render_chunks(&dataset, &options(WriteMode::Merge, 1));
        // 120 skills at 2 rows per insert, one insert per chunk
        assert_eq!(chunks.len(), 60);
        assert_eq!(chunks[0].file_name, "seed_01_skills.sql");

        let chunks = render_chunks(
            &dataset,
            &ScriptOptions {
                statement_rows: BatchSizes {
                    masters: 1,
                    jobs: 1,
                    links: 1,
                },
                ..options(WriteMode::Merge, 1)
            },
        );
        assert_eq!(chunks.len(), 120);
        assert_eq!(chunks[0].file_name, "seed_001_skills.sql");
        assert_eq!(chunks[119].file_name, "seed_120_skills.sql");
        let mut sorted: Vec<_> = chunks.iter().map(|c| c.file_name.clone()).collect();
        sorted.sort();
        assert!(sorted.iter().zip(&chunks).all(|(name, c)| *name == c.file_name));
    }

    #[test]
    fn merge_mode_has_no_truncation() {
        let chunks = render_chunks(&dataset(), &options(WriteMode::Merge, 50));
        assert_eq!(chunks[0].file_name, "seed_01_locations.sql");
        assert!(chunks.iter().all(|c| !c.contents.contains("TRUNCATE")));
    }

    #[test]
    fn single_document_holds_every_statement() {
        let document = render_document(&dataset(), &options(WriteMode::Replace, 1));
        assert_eq!(document.file_name, SINGLE_DOCUMENT_NAME);
        assert_eq!(document.statements, 5 + 1 + 3);
        assert_eq!(document.contents.matches("BEGIN;").count(), 3);
        let truncate = document.contents.find("TRUNCATE").unwrap();
        let insert = document.contents.find("INSERT").unwrap();
        assert!(truncate < insert);
    }
}
