//! Portal page/section configuration: loading, validation against the rules
//! document, and hydration of sections with live store data.

use crate::adapter::Record;
use crate::rules::RulesDocument;
use crate::store::{Filter, RecordStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const PORTALS_DIR_NAME: &str = "portals";
const DEFAULT_ICON: &str = "circle";

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed portal config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalConfig {
    pub portal_title: String,
    #[serde(default)]
    pub navigation: Vec<NavItem>,
    #[serde(default)]
    pub pages: BTreeMap<String, Page>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NavItem {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Page {
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Section {
    Stats(StatsSection),
    Table(TableSection),
    Form(FormSection),
}

impl Section {
    pub fn id(&self) -> &str {
        match self {
            Self::Stats(s) => &s.id,
            Self::Table(s) => &s.id,
            Self::Form(s) => &s.id,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub data: Vec<StatCard>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatCard {
    pub label: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub trend: Option<String>,
    /// When set, `value` is replaced by the live row count of this table.
    #[serde(default)]
    pub count_table: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub data: Vec<Record>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Column {
    pub key: String,
    pub header: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type", default = "default_field_kind")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Read-only when editing an existing row.
    #[serde(default)]
    pub locked: bool,
}

fn default_field_kind() -> String {
    "text".to_string()
}

impl PortalConfig {
    pub fn load(path: &Path) -> Result<Self, PortalError> {
        let text = std::fs::read_to_string(path).map_err(|source| PortalError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| PortalError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Page ids in navigation order, then any pages the navigation omits.
    pub fn page_order(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .navigation
            .iter()
            .filter(|n| self.pages.contains_key(&n.id))
            .map(|n| n.id.as_str())
            .collect();
        for id in self.pages.keys() {
            if !out.contains(&id.as_str()) {
                out.push(id.as_str());
            }
        }
        out
    }

    /// Locked field names across every form section that resolves to the
    /// same canonical form as `form_or_section_id`.
    pub fn locked_fields<'a>(&'a self, rules: &RulesDocument, form_or_section_id: &str) -> Vec<&'a str> {
        let Some(target) = rules.resolve_form(form_or_section_id) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = Vec::new();
        for section in self.pages.values().flat_map(|p| p.sections.iter()) {
            let Section::Form(form) = section else {
                continue;
            };
            if rules.resolve_form(&form.id) != Some(target) {
                continue;
            }
            for field in form.fields.iter().filter(|f| f.locked) {
                if !out.contains(&field.name.as_str()) {
                    out.push(field.name.as_str());
                }
            }
        }
        out
    }
}

/// Loads `<workspace>/portals/*.json`, keyed by file stem.
pub fn load_portals(workspace: &Path) -> Result<BTreeMap<String, PortalConfig>, PortalError> {
    let dir = workspace.join(PORTALS_DIR_NAME);
    let mut out = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    let entries = std::fs::read_dir(&dir).map_err(|source| PortalError::Io {
        path: dir.clone(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for ent in entries {
        let ent = ent.map_err(|source| PortalError::Io {
            path: dir.clone(),
            source,
        })?;
        let p = ent.path();
        let is_json = p
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if p.is_file() && is_json {
            paths.push(p);
        }
    }
    paths.sort();

    for p in paths {
        let Some(stem) = p.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        let cfg = PortalConfig::load(&p)?;
        out.insert(stem, cfg);
    }
    Ok(out)
}

/// Icon-font identifier for a component-style icon name:
/// `GraduationCap` -> `graduation-cap`, `Edit3` -> `edit-3`.
pub fn icon_name(name: Option<&str>) -> String {
    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return DEFAULT_ICON.to_string();
    };

    let mut cased = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if prev.map(|p| p.is_ascii_lowercase()).unwrap_or(false) && c.is_ascii_uppercase() {
            cased.push('-');
        }
        cased.push(c);
        prev = Some(c);
    }

    let mut out = String::with_capacity(cased.len() + 2);
    let mut prev: Option<char> = None;
    for c in cased.chars() {
        if prev.map(|p| !p.is_ascii_digit()).unwrap_or(false) && c.is_ascii_digit() {
            out.push('-');
        }
        out.push(c);
        prev = Some(c);
    }
    out.to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    UnresolvedForm,
    FieldNotWhitelisted,
    UnmappedTable,
    NavigationWithoutPage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigIssue {
    pub kind: IssueKind,
    pub page: Option<String>,
    pub section_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// Cross-checks a portal against the rules document. Every issue is a
/// warning: the portal still renders, but affected submissions lose data.
pub fn validate(portal: &PortalConfig, rules: &RulesDocument) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();

    for nav in &portal.navigation {
        if !portal.pages.contains_key(&nav.id) {
            issues.push(ConfigIssue {
                kind: IssueKind::NavigationWithoutPage,
                page: Some(nav.id.clone()),
                section_id: None,
                field: None,
                message: format!("navigation entry {} has no page", nav.id),
            });
        }
    }

    for (page_id, page) in &portal.pages {
        for section in &page.sections {
            match section {
                Section::Form(form) => {
                    let Some(form_id) = rules.resolve_form(&form.id) else {
                        issues.push(ConfigIssue {
                            kind: IssueKind::UnresolvedForm,
                            page: Some(page_id.clone()),
                            section_id: Some(form.id.clone()),
                            field: None,
                            message: format!("form {} does not resolve to a table", form.id),
                        });
                        continue;
                    };
                    let whitelist = rules.whitelist(form_id);
                    for field in &form.fields {
                        if !whitelist.contains_ui_field(&field.name) {
                            issues.push(ConfigIssue {
                                kind: IssueKind::FieldNotWhitelisted,
                                page: Some(page_id.clone()),
                                section_id: Some(form.id.clone()),
                                field: Some(field.name.clone()),
                                message: format!(
                                    "field {} is not whitelisted for {} and will be dropped",
                                    field.name, form_id
                                ),
                            });
                        }
                    }
                }
                Section::Table(table) => {
                    if rules.table_for_ui_section(&table.id).is_none() {
                        issues.push(ConfigIssue {
                            kind: IssueKind::UnmappedTable,
                            page: Some(page_id.clone()),
                            section_id: Some(table.id.clone()),
                            field: None,
                            message: format!(
                                "table section {} has no backing table; static data only",
                                table.id
                            ),
                        });
                    }
                }
                Section::Stats(_) => {}
            }
        }
    }

    issues
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Neutral,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedStat {
    pub label: String,
    pub value: Value,
    pub trend: Option<String>,
    pub trend_direction: TrendDirection,
    pub live: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedStats {
    pub id: String,
    pub title: String,
    pub data: Vec<HydratedStat>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedTable {
    pub id: String,
    pub title: String,
    pub table: Option<String>,
    pub columns: Vec<Column>,
    pub rows: Vec<Record>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedForm {
    pub id: String,
    pub title: String,
    pub form_id: Option<String>,
    pub table: Option<String>,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HydratedSection {
    Stats(HydratedStats),
    Table(HydratedTable),
    Form(HydratedForm),
}

impl HydratedSection {
    pub fn id(&self) -> &str {
        match self {
            Self::Stats(s) => &s.id,
            Self::Table(t) => &t.id,
            Self::Form(f) => &f.id,
        }
    }
}

pub fn hydrate_page(
    page: &Page,
    rules: &RulesDocument,
    store: &dyn RecordStore,
    search: Option<&str>,
) -> Result<Vec<HydratedSection>, StoreError> {
    let needle = search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut out = Vec::with_capacity(page.sections.len());
    for section in &page.sections {
        let hydrated = match section {
            Section::Stats(stats) => {
                let mut data = Vec::with_capacity(stats.data.len());
                for card in &stats.data {
                    let (value, live) = match &card.count_table {
                        Some(table) => (Value::from(store.count(table, &Filter::all())?), true),
                        None => (card.value.clone(), false),
                    };
                    let trend_direction = if card.trend.as_deref().unwrap_or("").contains('+') {
                        TrendDirection::Up
                    } else {
                        TrendDirection::Neutral
                    };
                    data.push(HydratedStat {
                        label: card.label.clone(),
                        value,
                        trend: card.trend.clone(),
                        trend_direction,
                        live,
                    });
                }
                HydratedSection::Stats(HydratedStats {
                    id: stats.id.clone(),
                    title: stats.title.clone(),
                    data,
                })
            }
            Section::Table(table) => {
                let backing = rules.table_for_ui_section(&table.id);
                let mut rows = match backing {
                    Some(t) => store.select(t, &Filter::all())?,
                    None => table.data.clone(),
                };
                if let Some(needle) = &needle {
                    rows.retain(|row| {
                        table.columns.iter().any(|col| {
                            row.get(&col.key)
                                .map(|v| cell_text(v).to_lowercase().contains(needle.as_str()))
                                .unwrap_or(false)
                        })
                    });
                }
                HydratedSection::Table(HydratedTable {
                    id: table.id.clone(),
                    title: table.title.clone(),
                    table: backing.map(str::to_string),
                    columns: table.columns.clone(),
                    rows,
                })
            }
            Section::Form(form) => {
                let form_id = rules.resolve_form(&form.id);
                HydratedSection::Form(HydratedForm {
                    id: form.id.clone(),
                    title: form.title.clone(),
                    form_id: form_id.map(str::to_string),
                    table: form_id
                        .and_then(|f| rules.table_for_form(f))
                        .map(str::to_string),
                    fields: form.fields.clone(),
                })
            }
        };
        out.push(hydrated);
    }
    Ok(out)
}

/// Display text of a cell value; strings are rendered without quotes.
pub fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::store::SqliteStore;
    use serde_json::json;

    const RULES: &str = include_str!("../fixtures/adapter.rules.json");
    const TEACHER_PORTAL: &str = include_str!("../fixtures/portals/teacher.json");

    fn rules() -> RulesDocument {
        RulesDocument::from_json_str(RULES).expect("load rules")
    }

    fn teacher() -> PortalConfig {
        serde_json::from_str(TEACHER_PORTAL).expect("parse portal")
    }

    #[test]
    fn icon_names_become_kebab_case() {
        assert_eq!(icon_name(Some("GraduationCap")), "graduation-cap");
        assert_eq!(icon_name(Some("Edit3")), "edit-3");
        assert_eq!(icon_name(Some("BarChart2")), "bar-chart-2");
        assert_eq!(icon_name(Some("Menu")), "menu");
        assert_eq!(icon_name(Some("")), "circle");
        assert_eq!(icon_name(None), "circle");
    }

    #[test]
    fn fixture_portal_is_clean() {
        let issues = validate(&teacher(), &rules());
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
    }

    #[test]
    fn validation_reports_unresolved_forms_and_dropped_fields() {
        let portal: PortalConfig = serde_json::from_value(json!({
            "portalTitle": "Broken",
            "navigation": [{ "id": "home", "label": "Home" }, { "id": "ghost", "label": "Ghost" }],
            "pages": {
                "home": {
                    "title": "Home",
                    "sections": [
                        { "type": "form", "id": "addLockerForm", "title": "Lockers", "fields": [] },
                        {
                            "type": "form", "id": "addStudentForm", "title": "Students",
                            "fields": [
                                { "name": "fullName", "label": "Name" },
                                { "name": "nickname", "label": "Nickname" }
                            ]
                        },
                        { "type": "table", "id": "lockerTable", "title": "Lockers", "columns": [] }
                    ]
                }
            }
        }))
        .expect("parse portal");

        let kinds: Vec<IssueKind> = validate(&portal, &rules()).into_iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                IssueKind::NavigationWithoutPage,
                IssueKind::UnresolvedForm,
                IssueKind::FieldNotWhitelisted,
                IssueKind::UnmappedTable,
            ]
        );
    }

    #[test]
    fn locked_fields_match_through_canonical_form() {
        let rules = rules();
        let portal = teacher();
        assert_eq!(portal.locked_fields(&rules, "assignmentTable"), vec!["assignmentCode"]);
        assert_eq!(portal.locked_fields(&rules, "addAssignmentForm"), vec!["assignmentCode"]);
        assert!(portal.locked_fields(&rules, "classTable").is_empty());
        assert!(portal.locked_fields(&rules, "addLockerForm").is_empty());

        let aliased: PortalConfig = serde_json::from_value(json!({
            "portalTitle": "Staff",
            "pages": {
                "profile": {
                    "title": "Profile",
                    "sections": [{
                        "type": "form", "id": "teacherProfileForm", "title": "Profile",
                        "fields": [
                            { "name": "tName", "label": "Name", "locked": true },
                            { "name": "email", "label": "Email" }
                        ]
                    }]
                }
            }
        }))
        .expect("parse portal");
        assert_eq!(aliased.locked_fields(&rules, "addTeacherForm"), vec!["tName"]);
        assert_eq!(aliased.locked_fields(&rules, "teacherTable"), vec!["tName"]);
    }

    #[test]
    fn page_order_follows_navigation() {
        let portal = teacher();
        let order = portal.page_order();
        assert_eq!(order.first().copied(), Some("overview"));
        assert_eq!(order.len(), portal.pages.len());
    }

    #[test]
    fn hydration_counts_rows_and_filters_tables() {
        let rules = rules();
        let store = SqliteStore::new(db::open_in_memory().expect("open db"));
        for (name, grade) in [("Ada", "7"), ("Grace", "8"), ("Alan", "7")] {
            let mut row = Record::new();
            row.insert("name".into(), json!(name));
            row.insert("grade".into(), json!(grade));
            store.insert("students", row).expect("insert");
        }

        let portal = teacher();
        let page = portal.pages.get("overview").expect("overview page");
        let sections = hydrate_page(page, &rules, &store, None).expect("hydrate");
        let stats = sections
            .iter()
            .find_map(|s| match s {
                HydratedSection::Stats(s) => Some(s),
                _ => None,
            })
            .expect("stats section");
        let students = stats.data.iter().find(|d| d.live).expect("live stat");
        assert_eq!(students.value, json!(3));

        let searched = hydrate_page(page, &rules, &store, Some("  AL ")).expect("hydrate");
        let table = searched
            .iter()
            .find_map(|s| match s {
                HydratedSection::Table(t) if t.id == "studentTable" => Some(t),
                _ => None,
            })
            .expect("student table");
        assert_eq!(table.table.as_deref(), Some("students"));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].get("name"), Some(&json!("Alan")));
    }
}
