//! Persistence port and its SQLite implementation.
//!
//! The store assigns primary keys (`uid`) and a `created_at` default on insert,
//! which is the "auto-generating" contract the adapter relies on.

use crate::adapter::Record;
use rusqlite::Connection;
use serde_json::Value;

pub const PRIMARY_KEY: &str = "uid";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("table name must not be empty")]
    InvalidTable,
    #[error("row in {table} is not a JSON object")]
    CorruptRow { table: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Conjunction of column equality predicates. Empty matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    eq: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and_equals(column, value)
    }

    pub fn and_equals(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.push((column.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.eq.is_empty()
    }

    pub fn matches(&self, row: &Record) -> bool {
        self.eq
            .iter()
            .all(|(col, want)| row.get(col).map(|v| v == want).unwrap_or(false))
    }

    /// Parses `{ "column": value, ... }`; absent or null means no filter.
    pub fn from_json(v: Option<&Value>) -> Result<Self, String> {
        match v {
            None | Some(Value::Null) => Ok(Self::all()),
            Some(Value::Object(m)) => Ok(Self {
                eq: m.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            }),
            Some(_) => Err("filter must be an object".into()),
        }
    }
}

pub trait RecordStore {
    fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Record>, StoreError>;

    fn count(&self, table: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Returns the stored row, including store-assigned defaults.
    fn insert(&self, table: &str, record: Record) -> Result<Record, StoreError>;

    /// Merges `patch` into every matching row. Returns the number of rows changed.
    fn update(
        &self,
        table: &str,
        patch: &Record,
        match_column: &str,
        match_value: &Value,
    ) -> Result<u64, StoreError>;

    fn delete(&self, table: &str, match_column: &str, match_value: &Value)
        -> Result<u64, StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    fn rows_with_uid(&self, table: &str) -> Result<Vec<(String, Record)>, StoreError> {
        check_table(table)?;
        let mut stmt = self
            .conn
            .prepare("SELECT uid, data FROM records WHERE table_name = ? ORDER BY rowid")?;
        let raw = stmt
            .query_map([table], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(raw.len());
        for (uid, data) in raw {
            match serde_json::from_str::<Value>(&data)? {
                Value::Object(row) => out.push((uid, row)),
                _ => {
                    return Err(StoreError::CorruptRow {
                        table: table.to_string(),
                    })
                }
            }
        }
        Ok(out)
    }

    fn matching_uids(
        &self,
        table: &str,
        match_column: &str,
        match_value: &Value,
    ) -> Result<Vec<(String, Record)>, StoreError> {
        let filter = Filter::equals(match_column, match_value.clone());
        Ok(self
            .rows_with_uid(table)?
            .into_iter()
            .filter(|(_, row)| filter.matches(row))
            .collect())
    }
}

impl RecordStore for SqliteStore {
    fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .rows_with_uid(table)?
            .into_iter()
            .map(|(_, row)| row)
            .filter(|row| filter.matches(row))
            .collect())
    }

    fn count(&self, table: &str, filter: &Filter) -> Result<u64, StoreError> {
        if filter.is_empty() {
            check_table(table)?;
            let n: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM records WHERE table_name = ?",
                [table],
                |r| r.get(0),
            )?;
            return Ok(n.max(0) as u64);
        }
        Ok(self.select(table, filter)?.len() as u64)
    }

    fn insert(&self, table: &str, mut record: Record) -> Result<Record, StoreError> {
        check_table(table)?;
        let uid = match record.get(PRIMARY_KEY) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        record.insert(PRIMARY_KEY.to_string(), Value::String(uid.clone()));

        let created_at = match record.get(CREATED_AT).and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => now_stamp(),
        };
        record.insert(CREATED_AT.to_string(), Value::String(created_at.clone()));

        self.conn.execute(
            "INSERT INTO records(table_name, uid, data, created_at) VALUES(?, ?, ?, ?)",
            (table, &uid, serde_json::to_string(&record)?, &created_at),
        )?;
        tracing::debug!(table, uid = %uid, "row inserted");
        Ok(record)
    }

    fn update(
        &self,
        table: &str,
        patch: &Record,
        match_column: &str,
        match_value: &Value,
    ) -> Result<u64, StoreError> {
        let targets = self.matching_uids(table, match_column, match_value)?;
        if targets.is_empty() {
            return Ok(0);
        }

        let stamp = now_stamp();
        let tx = self.conn.unchecked_transaction()?;
        for (uid, mut row) in targets.iter().cloned() {
            for (k, v) in patch {
                // The primary key and creation stamp belong to the store.
                if k == PRIMARY_KEY || k == CREATED_AT {
                    continue;
                }
                row.insert(k.clone(), v.clone());
            }
            row.insert(UPDATED_AT.to_string(), Value::String(stamp.clone()));
            tx.execute(
                "UPDATE records SET data = ?, updated_at = ? WHERE table_name = ? AND uid = ?",
                (serde_json::to_string(&row)?, &stamp, table, &uid),
            )?;
        }
        tx.commit()?;
        tracing::debug!(table, match_column, rows = targets.len(), "rows updated");
        Ok(targets.len() as u64)
    }

    fn delete(
        &self,
        table: &str,
        match_column: &str,
        match_value: &Value,
    ) -> Result<u64, StoreError> {
        if match_column == PRIMARY_KEY {
            if let Some(uid) = match_value.as_str() {
                check_table(table)?;
                let n = self.conn.execute(
                    "DELETE FROM records WHERE table_name = ? AND uid = ?",
                    (table, uid),
                )?;
                return Ok(n as u64);
            }
        }

        let targets = self.matching_uids(table, match_column, match_value)?;
        let tx = self.conn.unchecked_transaction()?;
        for (uid, _) in &targets {
            tx.execute(
                "DELETE FROM records WHERE table_name = ? AND uid = ?",
                (table, uid),
            )?;
        }
        tx.commit()?;
        tracing::debug!(table, match_column, rows = targets.len(), "rows deleted");
        Ok(targets.len() as u64)
    }
}

fn check_table(table: &str) -> Result<(), StoreError> {
    if table.trim().is_empty() {
        return Err(StoreError::InvalidTable);
    }
    Ok(())
}

fn now_stamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
