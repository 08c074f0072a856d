use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::portal::PortalConfig;
use crate::rules::RulesDocument;
use crate::store::SqliteStore;
use serde_json::{Map, Value};

/// Trimmed, non-empty string parameter.
pub fn str_param<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn required_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, Value> {
    str_param(req, key).ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Object parameter; absent or null yields an empty map.
pub fn object_param(req: &Request, key: &str) -> Result<Map<String, Value>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(m)) => Ok(m.clone()),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be an object", key),
            None,
        )),
    }
}

pub fn workspace<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<(&'a SqliteStore, &'a RulesDocument), Value> {
    match (state.store.as_ref(), state.rules.as_ref()) {
        (Some(store), Some(rules)) => Ok((store, rules)),
        _ => Err(err(&req.id, "no_workspace", "select a workspace first", None)),
    }
}

pub fn portal<'a>(state: &'a AppState, req: &Request) -> Result<(&'a str, &'a PortalConfig), Value> {
    let id = required_str(req, "portal")?;
    match state.portals.get_key_value(id) {
        Some((k, p)) => Ok((k.as_str(), p)),
        None => Err(err(
            &req.id,
            "not_found",
            "portal not found",
            Some(serde_json::json!({ "portal": id })),
        )),
    }
}
