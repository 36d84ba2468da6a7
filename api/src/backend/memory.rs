//! In-memory table source used by unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};

use super::{BackendError, Filter, Query, TableSource};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Select { table: String, columns: String, filter: Filter },
    Insert { table: String, row: Value },
    Upsert { table: String, row: Value, on_conflict: String },
    Update { table: String, filter: Filter, patch: Value },
    Delete { table: String, filter: Filter },
}

#[derive(Default)]
pub struct MemorySource {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    /// Select column lists that fail as if the relation did not exist.
    broken_selects: HashSet<String>,
    /// Tables whose writes are refused by a row-level policy.
    locked_tables: HashSet<String>,
    failing_tables: HashSet<String>,
    /// Echo inserted rows back untouched, without generated columns.
    bare_inserts: bool,
    calls: Mutex<Vec<Call>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        self.tables.lock().unwrap().insert(table.into(), rows);
        self
    }

    pub fn breaking_select_containing(mut self, fragment: &str) -> Self {
        self.broken_selects.insert(fragment.into());
        self
    }

    pub fn locking(mut self, table: &str) -> Self {
        self.locked_tables.insert(table.into());
        self
    }

    pub fn failing(mut self, table: &str) -> Self {
        self.failing_tables.insert(table.into());
        self
    }

    pub fn echoing_bare_inserts(mut self) -> Self {
        self.bare_inserts = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_table(&self, table: &str) -> Result<(), BackendError> {
        if self.failing_tables.contains(table) {
            return Err(BackendError::from_body(
                StatusCode::SERVICE_UNAVAILABLE,
                r#"{"message":"table unavailable"}"#,
            ));
        }
        Ok(())
    }

    fn check_write(&self, table: &str) -> Result<(), BackendError> {
        self.check_table(table)?;
        if self.locked_tables.contains(table) {
            return Err(BackendError::from_body(
                StatusCode::FORBIDDEN,
                r#"{"code":"42501","message":"new row violates row-level security policy"}"#,
            ));
        }
        Ok(())
    }
}

fn matches(row: &Value, filter: &Filter) -> bool {
    filter.pairs().iter().all(|(column, condition)| {
        let field = match row.get(column) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "null".to_string(),
            Some(other) => other.to_string(),
        };

        if let Some(expected) = condition.strip_prefix("eq.") {
            field == expected
        } else if let Some(list) = condition
            .strip_prefix("in.(")
            .and_then(|l| l.strip_suffix(')'))
        {
            list.split(',').any(|v| v == field)
        } else {
            false
        }
    })
}

#[async_trait]
impl TableSource for MemorySource {
    async fn select(
        &self,
        table: &str,
        query: &Query,
        _token: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        self.record(Call::Select {
            table: table.into(),
            columns: query.columns.clone(),
            filter: query.filter.clone(),
        });
        self.check_table(table)?;

        if self
            .broken_selects
            .iter()
            .any(|fragment| query.columns.contains(fragment.as_str()))
        {
            return Err(BackendError::from_body(
                StatusCode::BAD_REQUEST,
                r#"{"code":"PGRST200","message":"Could not find a relationship in the schema cache"}"#,
            ));
        }

        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches(row, &query.filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(
        &self,
        table: &str,
        row: Value,
        _token: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        self.record(Call::Insert {
            table: table.into(),
            row: row.clone(),
        });
        self.check_write(table)?;

        if self.bare_inserts {
            return Ok(vec![row]);
        }

        let mut row = row;
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.into()).or_default();

        // Fill in what the database would: the next id and the insert time
        if let Some(fields) = row.as_object_mut() {
            let next_id = rows
                .iter()
                .filter_map(|r| r.get("id").and_then(Value::as_i64))
                .max()
                .unwrap_or(0)
                + 1;
            fields.entry("id").or_insert(json!(next_id));
            fields
                .entry("created_at")
                .or_insert(json!(chrono::Utc::now().to_rfc3339()));
        }

        rows.push(row.clone());
        Ok(vec![row])
    }

    async fn upsert(
        &self,
        table: &str,
        row: Value,
        on_conflict: &str,
        _token: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        self.record(Call::Upsert {
            table: table.into(),
            row: row.clone(),
            on_conflict: on_conflict.into(),
        });
        self.check_write(table)?;

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.into()).or_default();
        let keys: Vec<&str> = on_conflict.split(',').collect();
        let existing = rows
            .iter_mut()
            .find(|r| keys.iter().all(|k| r.get(*k) == row.get(*k)));
        match existing {
            Some(existing) => *existing = row.clone(),
            None => rows.push(row.clone()),
        }
        Ok(vec![row])
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Value,
        _token: Option<&str>,
    ) -> Result<Vec<Value>, BackendError> {
        self.record(Call::Update {
            table: table.into(),
            filter: filter.clone(),
            patch: patch.clone(),
        });
        self.check_write(table)?;

        let mut tables = self.tables.lock().unwrap();
        let mut updated = vec![];
        for row in tables.entry(table.into()).or_default().iter_mut() {
            if !matches(row, filter) {
                continue;
            }
            if let (Some(target), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
                for (k, v) in changes {
                    target.insert(k.clone(), v.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(
        &self,
        table: &str,
        filter: &Filter,
        _token: Option<&str>,
    ) -> Result<(), BackendError> {
        self.record(Call::Delete {
            table: table.into(),
            filter: filter.clone(),
        });
        self.check_write(table)?;

        self.tables
            .lock()
            .unwrap()
            .entry(table.into())
            .or_default()
            .retain(|row| !matches(row, filter));
        Ok(())
    }
}
