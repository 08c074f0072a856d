use crate::adapter::{FormAdapter, FormOptions, Record, SubmitMode};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{object_param, required_str, str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

pub struct Submission {
    pub form_id: String,
    pub values: Record,
    pub mode: SubmitMode,
    pub primary_key: Option<String>,
    pub existing_row: Option<Record>,
}

pub fn parse_submission(req: &Request) -> Result<Submission, Value> {
    let form_id = required_str(req, "formId")?.to_string();
    let values = object_param(req, "values")?;
    let mode = match req.params.get("mode") {
        None | Some(Value::Null) => SubmitMode::default(),
        Some(v) => match serde_json::from_value::<SubmitMode>(v.clone()) {
            Ok(m) => m,
            Err(_) => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "mode must be one of: create, update",
                    None,
                ))
            }
        },
    };
    let primary_key = str_param(req, "primaryKey").map(str::to_string);
    let existing_row = match req.params.get("existingRow") {
        None | Some(Value::Null) => None,
        Some(_) => Some(object_param(req, "existingRow")?),
    };
    Ok(Submission {
        form_id,
        values,
        mode,
        primary_key,
        existing_row,
    })
}

fn handle_adapter_process(state: &mut AppState, req: &Request) -> Value {
    let Some(rules) = state.rules.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let sub = match parse_submission(req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let options = FormOptions {
        mode: sub.mode,
        primary_key_column: sub.primary_key,
        existing_row: sub.existing_row,
    };
    let adapter = FormAdapter::new(rules, state.clock.as_ref(), state.random.as_ref());
    let out = adapter.process(&sub.form_id, &sub.values, &options);

    // The sentinel is data here, not a failure: callers inspect `table`.
    ok(
        &req.id,
        json!({
            "resolved": out.is_resolved(),
            "table": out.table,
            "uiSection": out.ui_section,
            "record": out.record,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "adapter.process" => Some(handle_adapter_process(state, req)),
        _ => None,
    }
}
