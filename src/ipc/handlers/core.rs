use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::portal;
use crate::rules::{RulesDocument, RULES_FILE_NAME};
use crate::store::SqliteStore;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "rulesLoaded": state.rules.is_some(),
            "portals": state.portals.keys().collect::<Vec<_>>(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };

    let rules_path = path.join(RULES_FILE_NAME);
    let rules = match RulesDocument::load(&rules_path) {
        Ok(r) => r,
        Err(e) => {
            return err(
                &req.id,
                "rules_load_failed",
                e.to_string(),
                Some(json!({ "path": rules_path.to_string_lossy() })),
            )
        }
    };

    let portals = match portal::load_portals(&path) {
        Ok(p) => p,
        Err(e) => return err(&req.id, "portal_load_failed", e.to_string(), None),
    };

    // Misconfigured portals still open; submissions through them just lose fields.
    let mut issue_count = 0usize;
    for (portal_id, cfg) in &portals {
        for issue in portal::validate(cfg, &rules) {
            issue_count += 1;
            tracing::warn!(portal = %portal_id, kind = ?issue.kind, "{}", issue.message);
        }
    }

    tracing::info!(
        workspace = %path.display(),
        portals = portals.len(),
        issues = issue_count,
        "workspace opened"
    );

    let portal_ids: Vec<String> = portals.keys().cloned().collect();
    state.workspace = Some(path.clone());
    state.store = Some(SqliteStore::new(conn));
    state.rules = Some(rules);
    state.portals = portals;

    ok(
        &req.id,
        json!({
            "workspacePath": path.to_string_lossy(),
            "portals": portal_ids,
            "configIssues": issue_count,
        }),
    )
}

fn handle_rules_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(rules) = state.rules.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    ok(&req.id, rules.summary())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "rules.get" => Some(handle_rules_get(state, req)),
        _ => None,
    }
}
