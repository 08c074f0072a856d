//! The adapter rules document (`adapter.rules.json`): form-to-table routing,
//! per-form field whitelists, default values and the persistence contract,
//! validated once at load time.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const RULES_FILE_NAME: &str = "adapter.rules.json";

/// Tables without a `ui_section_mapping` entry still route here.
pub const ASSIGNMENTS_TABLE: &str = "assignments";
pub const ASSIGNMENTS_FALLBACK_SECTION: &str = "assignmentTable";

#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("failed to read rules document: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed rules document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("form {form} has a field whitelist but no target table")]
    WhitelistWithoutTable { form: String },
    #[error("section {section} maps to unknown form {form}")]
    DanglingSection { section: String, form: String },
    #[error("form {form} maps both {first} and {second} to column {column}")]
    DuplicateColumn {
        form: String,
        first: String,
        second: String,
        column: String,
    },
    #[error("form {form} whitelists an id but the id template has no {{random}} token")]
    MissingIdTemplate { form: String },
}

/// Whether the backing store assigns primary keys itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceContract {
    SupabaseRemoteState,
    LocalState,
}

impl PersistenceContract {
    pub fn auto_generates_keys(self) -> bool {
        match self {
            Self::SupabaseRemoteState => true,
            Self::LocalState => false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultValues {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPair {
    pub ui_field: String,
    pub column: String,
}

/// The whitelist for one form: the only UI fields that may produce columns.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    pairs: Vec<FieldPair>,
}

impl FieldMap {
    pub fn iter(&self) -> impl Iterator<Item = &FieldPair> {
        self.pairs.iter()
    }

    pub fn column_for(&self, ui_field: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|p| p.ui_field == ui_field)
            .map(|p| p.column.as_str())
    }

    pub fn contains_ui_field(&self, ui_field: &str) -> bool {
        self.column_for(ui_field).is_some()
    }
}

#[derive(Debug, Deserialize)]
struct RawRules {
    adapter_logic: RawAdapterLogic,
    system_contract: RawSystemContract,
}

#[derive(Debug, Deserialize)]
struct RawAdapterLogic {
    target_table_resolution: BTreeMap<String, String>,
    #[serde(default)]
    section_to_form: BTreeMap<String, String>,
    #[serde(default)]
    ui_section_mapping: BTreeMap<String, String>,
    #[serde(default)]
    field_name_normalization: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    default_value_injection: DefaultValues,
}

#[derive(Debug, Deserialize)]
struct RawSystemContract {
    persistence: PersistenceContract,
}

#[derive(Debug, Clone)]
pub struct RulesDocument {
    target_tables: BTreeMap<String, String>,
    section_to_form: BTreeMap<String, String>,
    ui_sections: BTreeMap<String, String>,
    whitelists: BTreeMap<String, FieldMap>,
    defaults: DefaultValues,
    persistence: PersistenceContract,
}

impl RulesDocument {
    pub fn load(path: &Path) -> Result<Self, RulesError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, RulesError> {
        let raw: RawRules = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawRules) -> Result<Self, RulesError> {
        let logic = raw.adapter_logic;
        let persistence = raw.system_contract.persistence;

        for (section, form) in &logic.section_to_form {
            if !logic.target_table_resolution.contains_key(form) {
                return Err(RulesError::DanglingSection {
                    section: section.clone(),
                    form: form.clone(),
                });
            }
        }

        let id_template_ok = logic
            .default_value_injection
            .id
            .as_deref()
            .map(|t| t.contains("{random}"))
            .unwrap_or(false);

        let mut whitelists = BTreeMap::new();
        for (form, fields) in logic.field_name_normalization {
            if !logic.target_table_resolution.contains_key(&form) {
                return Err(RulesError::WhitelistWithoutTable { form });
            }

            let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
            for (ui_field, column) in &fields {
                if let Some(first) = seen.insert(column.as_str(), ui_field.as_str()) {
                    return Err(RulesError::DuplicateColumn {
                        form: form.clone(),
                        first: first.to_string(),
                        second: ui_field.clone(),
                        column: column.clone(),
                    });
                }
            }

            if fields.contains_key("id") && !persistence.auto_generates_keys() && !id_template_ok {
                return Err(RulesError::MissingIdTemplate { form });
            }

            let pairs = fields
                .into_iter()
                .map(|(ui_field, column)| FieldPair { ui_field, column })
                .collect();
            whitelists.insert(form, FieldMap { pairs });
        }

        Ok(Self {
            target_tables: logic.target_table_resolution,
            section_to_form: logic.section_to_form,
            ui_sections: logic.ui_section_mapping,
            whitelists,
            defaults: logic.default_value_injection,
            persistence,
        })
    }

    /// Canonical form id for a form id or a UI section id.
    pub fn resolve_form<'a>(&'a self, form_or_section_id: &str) -> Option<&'a str> {
        if let Some((form, _)) = self.target_tables.get_key_value(form_or_section_id) {
            return Some(form.as_str());
        }
        self.section_to_form
            .get(form_or_section_id)
            .map(|s| s.as_str())
    }

    pub fn table_for_form(&self, form_id: &str) -> Option<&str> {
        self.target_tables.get(form_id).map(|s| s.as_str())
    }

    pub fn ui_section_for_table(&self, table: &str) -> Option<&str> {
        match self.ui_sections.get(table) {
            Some(s) => Some(s.as_str()),
            None if table == ASSIGNMENTS_TABLE => Some(ASSIGNMENTS_FALLBACK_SECTION),
            None => None,
        }
    }

    pub fn table_for_ui_section(&self, ui_section: &str) -> Option<&str> {
        if let Some((table, _)) = self.ui_sections.iter().find(|(_, s)| *s == ui_section) {
            return Some(table.as_str());
        }
        if ui_section == ASSIGNMENTS_FALLBACK_SECTION {
            return Some(ASSIGNMENTS_TABLE);
        }
        None
    }

    /// Forms without a whitelist get an empty one: nothing is forwarded.
    pub fn whitelist(&self, form_id: &str) -> &FieldMap {
        static EMPTY: FieldMap = FieldMap { pairs: Vec::new() };
        self.whitelists.get(form_id).unwrap_or(&EMPTY)
    }

    pub fn defaults(&self) -> &DefaultValues {
        &self.defaults
    }

    pub fn persistence(&self) -> PersistenceContract {
        self.persistence
    }

    pub fn tables(&self) -> BTreeSet<&str> {
        self.target_tables.values().map(|s| s.as_str()).collect()
    }

    pub fn summary(&self) -> serde_json::Value {
        let forms: Vec<serde_json::Value> = self
            .target_tables
            .iter()
            .map(|(form, table)| {
                let fields: Vec<serde_json::Value> = self
                    .whitelist(form)
                    .iter()
                    .map(|p| json!({ "uiField": p.ui_field, "column": p.column }))
                    .collect();
                json!({
                    "formId": form,
                    "table": table,
                    "uiSection": self.ui_section_for_table(table),
                    "fields": fields,
                })
            })
            .collect();
        json!({
            "persistence": self.persistence,
            "autoGeneratesKeys": self.persistence.auto_generates_keys(),
            "forms": forms,
            "sections": self.section_to_form,
            "tables": self.tables(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../fixtures/adapter.rules.json");

    #[test]
    fn fixture_rules_load() {
        let rules = RulesDocument::from_json_str(FIXTURE).expect("load rules");
        assert_eq!(rules.persistence(), PersistenceContract::SupabaseRemoteState);
        assert_eq!(rules.table_for_form("addStudentForm"), Some("students"));
        assert_eq!(
            rules.whitelist("addStudentForm").column_for("fullName"),
            Some("name")
        );
    }

    #[test]
    fn section_ids_resolve_through_section_to_form() {
        let rules = RulesDocument::from_json_str(FIXTURE).expect("load rules");
        assert_eq!(rules.resolve_form("studentTable"), Some("addStudentForm"));
        assert_eq!(rules.resolve_form("addStudentForm"), Some("addStudentForm"));
        assert_eq!(rules.resolve_form("nope"), None);
    }

    #[test]
    fn assignments_fall_back_to_fixed_section() {
        let rules = RulesDocument::from_json_str(FIXTURE).expect("load rules");
        assert_eq!(
            rules.ui_section_for_table("assignments"),
            Some("assignmentTable")
        );
        assert_eq!(rules.table_for_ui_section("assignmentTable"), Some("assignments"));
        assert_eq!(rules.ui_section_for_table("lockers"), None);
    }

    #[test]
    fn unknown_persistence_contract_is_rejected() {
        let text = r#"{
            "adapter_logic": { "target_table_resolution": {} },
            "system_contract": { "persistence": "supabase_remote" }
        }"#;
        assert!(matches!(
            RulesDocument::from_json_str(text),
            Err(RulesError::Json(_))
        ));
    }

    #[test]
    fn whitelist_for_unknown_form_is_rejected() {
        let text = r#"{
            "adapter_logic": {
                "target_table_resolution": { "addClassForm": "classes" },
                "field_name_normalization": { "addGhostForm": { "a": "b" } }
            },
            "system_contract": { "persistence": "supabase_remote_state" }
        }"#;
        match RulesDocument::from_json_str(text) {
            Err(RulesError::WhitelistWithoutTable { form }) => assert_eq!(form, "addGhostForm"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn dangling_section_is_rejected() {
        let text = r#"{
            "adapter_logic": {
                "target_table_resolution": { "addClassForm": "classes" },
                "section_to_form": { "classTable": "addClassesForm" }
            },
            "system_contract": { "persistence": "supabase_remote_state" }
        }"#;
        assert!(matches!(
            RulesDocument::from_json_str(text),
            Err(RulesError::DanglingSection { .. })
        ));
    }

    #[test]
    fn two_fields_on_one_column_are_rejected() {
        let text = r#"{
            "adapter_logic": {
                "target_table_resolution": { "addTeacherForm": "teachers" },
                "field_name_normalization": {
                    "addTeacherForm": { "tName": "name", "fullName": "name" }
                }
            },
            "system_contract": { "persistence": "supabase_remote_state" }
        }"#;
        assert!(matches!(
            RulesDocument::from_json_str(text),
            Err(RulesError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn local_contract_requires_random_id_template() {
        let text = r#"{
            "adapter_logic": {
                "target_table_resolution": { "addNoticeForm": "notices" },
                "field_name_normalization": { "addNoticeForm": { "id": "id" } },
                "default_value_injection": { "id": "NTC-1", "status": "Active" }
            },
            "system_contract": { "persistence": "local_state" }
        }"#;
        assert!(matches!(
            RulesDocument::from_json_str(text),
            Err(RulesError::MissingIdTemplate { .. })
        ));
    }
}
