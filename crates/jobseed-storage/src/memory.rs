use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::{cell_text, Filter, RemoteStore, Resolution, Returning, StoreError};

type Row = Map<String, Value>;

/// `column` must hold the `id` of an existing row in `references`.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub column: String,
    pub references: String,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    /// Primary key first, then any further unique column sets.
    pub unique: Vec<Vec<String>>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, primary_key: &[&str]) -> Self {
        Self {
            name: name.into(),
            unique: vec![to_columns(primary_key)],
            foreign_keys: Vec::new(),
        }
    }

    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.unique.push(to_columns(columns));
        self
    }

    pub fn references(mut self, column: &str, table: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.to_string(),
            references: table.to_string(),
        });
        self
    }
}

fn to_columns(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Vec<Row>>,
    write_calls: HashMap<String, usize>,
}

/// Relational tables held in memory, enforcing unique keys and foreign keys per request.
///
/// Used for dry runs of direct mode and as the store double in tests. Failures can be
/// scripted per table and per write call.
#[derive(Debug)]
pub struct MemoryStore {
    schema: HashMap<String, TableSchema>,
    failing_writes: HashSet<(String, usize)>,
    failing_deletes: HashSet<String>,
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(schema: impl IntoIterator<Item = TableSchema>) -> Self {
        Self {
            schema: schema.into_iter().map(|t| (t.name.clone(), t)).collect(),
            failing_writes: HashSet::new(),
            failing_deletes: HashSet::new(),
            state: Mutex::new(State::default()),
        }
    }

    /// Makes the `call_index`-th (0-based) insert or upsert on `table` fail.
    pub fn with_write_failure(mut self, table: &str, call_index: usize) -> Self {
        self.failing_writes.insert((table.to_string(), call_index));
        self
    }

    pub fn with_delete_failure(mut self, table: &str) -> Self {
        self.failing_deletes.insert(table.to_string());
        self
    }

    pub async fn rows(&self, table: &str) -> Vec<Row> {
        let state = self.state.lock().await;
        state.tables.get(table).cloned().unwrap_or_default()
    }

    pub async fn count(&self, table: &str) -> usize {
        let state = self.state.lock().await;
        state.tables.get(table).map_or(0, Vec::len)
    }

    fn table_schema(&self, table: &str) -> Result<&TableSchema, StoreError> {
        self.schema
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    fn check_scripted_failure(&self, state: &mut State, table: &str) -> Result<(), StoreError> {
        let calls = state.write_calls.entry(table.to_string()).or_default();
        let index = *calls;
        *calls += 1;
        if self.failing_writes.contains(&(table.to_string(), index)) {
            return Err(StoreError::Status {
                table: table.to_string(),
                status: 500,
                body: format!("scripted failure on write call {index}"),
            });
        }
        Ok(())
    }

    fn check_foreign_keys(
        &self,
        state: &State,
        schema: &TableSchema,
        row: &Row,
    ) -> Result<(), StoreError> {
        for fk in &schema.foreign_keys {
            let Some(value) = row.get(&fk.column).and_then(cell_text) else {
                continue;
            };
            let exists = state.tables.get(&fk.references).is_some_and(|rows| {
                rows.iter()
                    .any(|r| r.get("id").and_then(cell_text).as_deref() == Some(value.as_str()))
            });
            if !exists {
                return Err(StoreError::rejected(
                    &schema.name,
                    format!(
                        "{} = {value} is not present in {}",
                        fk.column, fk.references
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_unique(schema: &TableSchema, rows: &[Row], row: &Row) -> Result<(), StoreError> {
        for columns in &schema.unique {
            let Some(key) = key_of(row, columns) else {
                continue;
            };
            if rows.iter().any(|r| key_of(r, columns).as_ref() == Some(&key)) {
                return Err(StoreError::rejected(
                    &schema.name,
                    format!("duplicate key ({}) = ({})", columns.join(", "), key.join(", ")),
                ));
            }
        }
        Ok(())
    }

    async fn write(
        &self,
        table: &str,
        rows: &[Value],
        conflict: Option<(&str, Resolution)>,
        returning: Returning,
    ) -> Result<Vec<Value>, StoreError> {
        let schema = self.table_schema(table)?;
        let mut state = self.state.lock().await;
        self.check_scripted_failure(&mut state, table)?;

        let conflict_columns: Option<(Vec<String>, Resolution)> = conflict.map(|(cols, res)| {
            (
                cols.split(',').map(|c| c.trim().to_string()).collect(),
                res,
            )
        });

        let mut staged = state.tables.get(table).cloned().unwrap_or_default();
        let mut written = Vec::new();
        for value in rows {
            let Value::Object(row) = value else {
                return Err(StoreError::rejected(table, "row is not a JSON object"));
            };
            self.check_foreign_keys(&state, schema, row)?;

            if let Some((columns, resolution)) = &conflict_columns {
                let key = key_of(row, columns);
                let existing = key.as_ref().and_then(|key| {
                    staged
                        .iter()
                        .position(|r| key_of(r, columns).as_ref() == Some(key))
                });
                if let Some(idx) = existing {
                    if *resolution == Resolution::MergeDuplicates {
                        for (column, cell) in row {
                            staged[idx].insert(column.clone(), cell.clone());
                        }
                        written.push(Value::Object(staged[idx].clone()));
                    }
                    continue;
                }
            }

            Self::check_unique(schema, &staged, row)?;
            staged.push(row.clone());
            written.push(value.clone());
        }
        state.tables.insert(table.to_string(), staged);

        Ok(match returning {
            Returning::Representation => written,
            Returning::Minimal => Vec::new(),
        })
    }
}

fn key_of(row: &Row, columns: &[String]) -> Option<Vec<String>> {
    columns
        .iter()
        .map(|c| row.get(c).and_then(cell_text))
        .collect()
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn insert(
        &self,
        table: &str,
        rows: &[Value],
        returning: Returning,
    ) -> Result<Vec<Value>, StoreError> {
        self.write(table, rows, None, returning).await
    }

    async fn upsert(
        &self,
        table: &str,
        rows: &[Value],
        on_conflict: &str,
        resolution: Resolution,
        returning: Returning,
    ) -> Result<Vec<Value>, StoreError> {
        self.write(table, rows, Some((on_conflict, resolution)), returning)
            .await
    }

    async fn delete_where(&self, table: &str, filter: &Filter) -> Result<(), StoreError> {
        self.table_schema(table)?;
        if self.failing_deletes.contains(table) {
            return Err(StoreError::Status {
                table: table.to_string(),
                status: 500,
                body: "scripted delete failure".to_string(),
            });
        }

        let mut state = self.state.lock().await;
        let rows = state.tables.get(table).cloned().unwrap_or_default();
        let (doomed, kept): (Vec<Row>, Vec<Row>) = rows
            .into_iter()
            .partition(|r| filter.matches(r.get(&filter.column)));

        let doomed_ids: HashSet<String> = doomed
            .iter()
            .filter_map(|r| r.get("id").and_then(cell_text))
            .collect();
        for dependent in self.schema.values() {
            for fk in dependent.foreign_keys.iter().filter(|fk| fk.references == table) {
                let referenced = state.tables.get(&dependent.name).is_some_and(|rows| {
                    rows.iter().any(|r| {
                        r.get(&fk.column)
                            .and_then(cell_text)
                            .is_some_and(|v| doomed_ids.contains(&v))
                    })
                });
                // A self-reference is fine when the referencing rows go too.
                if referenced && !(dependent.name == table && kept.is_empty()) {
                    return Err(StoreError::rejected(
                        table,
                        format!("rows are still referenced by {}.{}", dependent.name, fk.column),
                    ));
                }
            }
        }

        state.tables.insert(table.to_string(), kept);
        Ok(())
    }
}
