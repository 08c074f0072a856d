//! Form-to-record adapter.
//!
//! Turns UI-shaped form values into a record for one backing table. Only
//! columns named by the form's whitelist are ever emitted, and an update
//! payload never carries the primary key (it travels as the match predicate).

use crate::rules::{FieldMap, RulesDocument, ASSIGNMENTS_TABLE};
use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Record = Map<String, Value>;

pub const ASSIGNMENT_CODE_COLUMN: &str = "assignmentCode";
const ASSIGNMENT_CODE_PREFIX: &str = "ASN-";
const ASSIGNMENT_CODE_BOUND: u32 = 100_000;
const ID_RANDOM_BOUND: u32 = 10_000;
const RANDOM_TOKEN: &str = "{random}";

pub trait Clock {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Utc::now().date_naive()
    }
}

pub trait RandomSource {
    /// Uniform integer in `0..bound`.
    fn below(&self, bound: u32) -> u32;
}

pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..bound)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitMode {
    #[default]
    Create,
    Update,
}

#[derive(Debug, Clone, Default)]
pub struct FormOptions {
    pub mode: SubmitMode,
    pub primary_key_column: Option<String>,
    pub existing_row: Option<Record>,
}

impl FormOptions {
    pub fn update(primary_key_column: impl Into<String>, existing_row: Option<Record>) -> Self {
        Self {
            mode: SubmitMode::Update,
            primary_key_column: Some(primary_key_column.into()),
            existing_row,
        }
    }
}

/// Adapter output. An unresolved form id yields all three fields as `None`;
/// callers must check `table` before persisting anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptedForm {
    pub table: Option<String>,
    pub ui_section: Option<String>,
    pub record: Option<Record>,
}

impl AdaptedForm {
    fn unresolved() -> Self {
        Self {
            table: None,
            ui_section: None,
            record: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.table.is_some()
    }
}

pub struct FormAdapter<'a> {
    rules: &'a RulesDocument,
    clock: &'a dyn Clock,
    random: &'a dyn RandomSource,
}

impl<'a> FormAdapter<'a> {
    pub fn new(rules: &'a RulesDocument, clock: &'a dyn Clock, random: &'a dyn RandomSource) -> Self {
        Self {
            rules,
            clock,
            random,
        }
    }

    pub fn process(&self, form_or_section_id: &str, raw: &Record, options: &FormOptions) -> AdaptedForm {
        let Some(form_id) = self.rules.resolve_form(form_or_section_id) else {
            tracing::error!(form_or_section_id, "unresolved form context");
            return AdaptedForm::unresolved();
        };
        let Some(table) = self.rules.table_for_form(form_id) else {
            tracing::error!(form_id, "form has no target table");
            return AdaptedForm::unresolved();
        };
        let ui_section = self.rules.ui_section_for_table(table).map(str::to_string);
        let whitelist = self.rules.whitelist(form_id);
        let is_update = options.mode == SubmitMode::Update;
        let code_is_immutable = table == ASSIGNMENTS_TABLE && is_update;

        let mut record = Record::new();
        for pair in whitelist.iter() {
            if let Some(v) = submitted(raw, &pair.ui_field) {
                record.insert(pair.column.clone(), v.clone());
            }
        }
        if code_is_immutable {
            record.remove(ASSIGNMENT_CODE_COLUMN);
        }

        self.inject_system_fields(table, whitelist, &mut record);

        if is_update {
            if let (Some(_), Some(existing)) = (&options.primary_key_column, &options.existing_row) {
                for pair in whitelist.iter() {
                    let value = match submitted(raw, &pair.ui_field) {
                        Some(v) => v.clone(),
                        None => existing.get(&pair.column).cloned().unwrap_or(Value::Null),
                    };
                    record.insert(pair.column.clone(), value);
                }
            }
            if let Some(pk) = &options.primary_key_column {
                record.remove(pk);
            }
            // Reconciliation may have backfilled the code from the stored row.
            if code_is_immutable {
                record.remove(ASSIGNMENT_CODE_COLUMN);
            }
        }

        if table == ASSIGNMENTS_TABLE && !is_update && is_unset(record.get(ASSIGNMENT_CODE_COLUMN)) {
            let code = format!(
                "{}{}",
                ASSIGNMENT_CODE_PREFIX,
                self.random.below(ASSIGNMENT_CODE_BOUND)
            );
            record.insert(ASSIGNMENT_CODE_COLUMN.to_string(), Value::String(code));
        }

        record.retain(|_, v| !is_blank(v));

        tracing::debug!(
            form_id,
            table,
            mode = ?options.mode,
            columns = record.len(),
            "form adapted"
        );

        AdaptedForm {
            table: Some(table.to_string()),
            ui_section,
            record: Some(record),
        }
    }

    fn inject_system_fields(&self, table: &str, whitelist: &FieldMap, record: &mut Record) {
        let defaults = self.rules.defaults();

        if let Some(column) = whitelist.column_for("status") {
            if is_unset(record.get(column)) {
                if let Some(status) = &defaults.status {
                    record.insert(column.to_string(), Value::String(status.clone()));
                }
            }
        }

        if let Some(column) = whitelist.column_for("id") {
            if self.rules.persistence().auto_generates_keys() {
                if record.get(column).and_then(Value::as_str) == Some("") {
                    record.remove(column);
                }
            } else if is_unset(record.get(column)) {
                if let Some(template) = &defaults.id {
                    let token = self.random.below(ID_RANDOM_BOUND).to_string();
                    record.insert(
                        column.to_string(),
                        Value::String(template.replace(RANDOM_TOKEN, &token)),
                    );
                }
            }
        }

        let date_field = match table {
            "students" => Some("enrollmentDate"),
            "notices" => Some("date"),
            _ => None,
        };
        if let Some(column) = date_field.and_then(|f| whitelist.column_for(f)) {
            if is_unset(record.get(column)) {
                let today = self.clock.today().format("%Y-%m-%d").to_string();
                record.insert(column.to_string(), Value::String(today));
            }
        }
    }
}

fn submitted<'r>(raw: &'r Record, ui_field: &str) -> Option<&'r Value> {
    raw.get(ui_field).filter(|v| !v.is_null())
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn is_unset(v: Option<&Value>) -> bool {
    v.map(is_blank).unwrap_or(true)
}
