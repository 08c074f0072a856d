use crate::adapter::{FormAdapter, FormOptions, SubmitMode};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::adapter::parse_submission;
use crate::ipc::helpers::{required_str, str_param, workspace};
use crate::ipc::types::{AppState, Request};
use crate::store::{Filter, RecordStore, PRIMARY_KEY};
use serde_json::{json, Value};

fn read_filter(req: &Request) -> Result<Filter, Value> {
    Filter::from_json(req.params.get("filter")).map_err(|m| err(&req.id, "bad_params", m, None))
}

/// `table` wins; otherwise a UI section id is mapped back to its table.
fn read_table(state: &AppState, req: &Request) -> Result<String, Value> {
    if let Some(t) = str_param(req, "table") {
        return Ok(t.to_string());
    }
    let Some(section) = str_param(req, "uiSection") else {
        return Err(err(&req.id, "bad_params", "missing table", None));
    };
    state
        .rules
        .as_ref()
        .and_then(|r| r.table_for_ui_section(section))
        .map(str::to_string)
        .ok_or_else(|| {
            err(
                &req.id,
                "not_found",
                "no table behind section",
                Some(json!({ "uiSection": section })),
            )
        })
}

fn handle_records_list(state: &mut AppState, req: &Request) -> Value {
    let (store, _) = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let table = match read_table(state, req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let filter = match read_filter(req) {
        Ok(f) => f,
        Err(e) => return e,
    };
    match store.select(&table, &filter) {
        Ok(rows) => ok(&req.id, json!({ "table": table, "rows": rows })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_records_count(state: &mut AppState, req: &Request) -> Value {
    let (store, _) = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let table = match read_table(state, req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let filter = match read_filter(req) {
        Ok(f) => f,
        Err(e) => return e,
    };
    match store.count(&table, &filter) {
        Ok(n) => ok(&req.id, json!({ "table": table, "count": n })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_records_submit(state: &mut AppState, req: &Request) -> Value {
    let (store, rules) = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut sub = match parse_submission(req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    // Locked fields are read-only on edit; dropping them lets backfill keep
    // the stored value.
    if sub.mode == SubmitMode::Update {
        if let Some(cfg) = str_param(req, "portal").and_then(|p| state.portals.get(p)) {
            for name in cfg.locked_fields(rules, &sub.form_id) {
                sub.values.remove(name);
            }
        }
    }

    let adapter = FormAdapter::new(rules, state.clock.as_ref(), state.random.as_ref());

    match sub.mode {
        SubmitMode::Create => {
            let options = FormOptions::default();
            let out = adapter.process(&sub.form_id, &sub.values, &options);
            let (Some(table), Some(record)) = (out.table, out.record) else {
                return err(
                    &req.id,
                    "unresolved_form",
                    "form or section does not resolve to a table",
                    Some(json!({ "formId": sub.form_id })),
                );
            };
            match store.insert(&table, record.clone()) {
                Ok(row) => {
                    tracing::info!(table = %table, form = %sub.form_id, "record created");
                    ok(
                        &req.id,
                        json!({
                            "table": table,
                            "uiSection": out.ui_section,
                            "record": record,
                            "row": row,
                        }),
                    )
                }
                Err(e) => err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "table": table })),
                ),
            }
        }
        SubmitMode::Update => {
            let Some(match_value) = req.params.get("matchValue").filter(|v| !v.is_null()) else {
                return err(&req.id, "bad_params", "missing matchValue", None);
            };
            let primary_key = sub
                .primary_key
                .clone()
                .unwrap_or_else(|| PRIMARY_KEY.to_string());

            let Some(table) = rules
                .resolve_form(&sub.form_id)
                .and_then(|f| rules.table_for_form(f))
            else {
                tracing::error!(form = %sub.form_id, "unresolved form context");
                return err(
                    &req.id,
                    "unresolved_form",
                    "form or section does not resolve to a table",
                    Some(json!({ "formId": sub.form_id })),
                );
            };

            let existing = match store.select(table, &Filter::equals(primary_key.as_str(), match_value.clone())) {
                Ok(rows) => rows.into_iter().next(),
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            let Some(existing) = existing else {
                return err(
                    &req.id,
                    "not_found",
                    "record not found",
                    Some(json!({ "table": table, "matchColumn": primary_key, "matchValue": match_value })),
                );
            };

            let options = FormOptions::update(primary_key.clone(), Some(existing));
            let out = adapter.process(&sub.form_id, &sub.values, &options);
            let Some(record) = out.record else {
                return err(&req.id, "unresolved_form", "form did not resolve", None);
            };

            match store.update(table, &record, &primary_key, match_value) {
                Ok(n) => {
                    tracing::info!(table, form = %sub.form_id, rows = n, "record updated");
                    ok(
                        &req.id,
                        json!({
                            "table": table,
                            "uiSection": out.ui_section,
                            "record": record,
                            "rowsUpdated": n,
                        }),
                    )
                }
                Err(e) => err(
                    &req.id,
                    "db_update_failed",
                    e.to_string(),
                    Some(json!({ "table": table })),
                ),
            }
        }
    }
}

fn handle_records_delete(state: &mut AppState, req: &Request) -> Value {
    let (store, _) = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let table = match read_table(state, req) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let match_column = str_param(req, "matchColumn").unwrap_or(PRIMARY_KEY);
    let match_value = match req.params.get("matchValue").filter(|v| !v.is_null()) {
        Some(v) => v.clone(),
        None => match required_str(req, "uid") {
            Ok(uid) => Value::String(uid.to_string()),
            Err(_) => return err(&req.id, "bad_params", "missing matchValue", None),
        },
    };

    match store.delete(&table, match_column, &match_value) {
        Ok(0) => err(
            &req.id,
            "not_found",
            "record not found",
            Some(json!({ "table": table, "matchColumn": match_column })),
        ),
        Ok(n) => {
            tracing::info!(table = %table, rows = n, "records deleted");
            ok(&req.id, json!({ "table": table, "rowsDeleted": n }))
        }
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": table })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "records.list" => Some(handle_records_list(state, req)),
        "records.count" => Some(handle_records_count(state, req)),
        "records.submit" => Some(handle_records_submit(state, req)),
        "records.delete" => Some(handle_records_delete(state, req)),
        _ => None,
    }
}
