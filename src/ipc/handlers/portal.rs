use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{portal, str_param, workspace};
use crate::ipc::types::{AppState, Request};
use crate::portal::{hydrate_page, icon_name, validate};
use serde_json::json;

fn handle_portal_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let portals: Vec<serde_json::Value> = state
        .portals
        .iter()
        .map(|(id, p)| {
            json!({
                "id": id,
                "title": p.portal_title,
                "pageCount": p.pages.len(),
            })
        })
        .collect();
    ok(&req.id, json!({ "portals": portals }))
}

fn handle_portal_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (portal_id, cfg) = match portal(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let navigation: Vec<serde_json::Value> = cfg
        .navigation
        .iter()
        .map(|n| {
            json!({
                "id": n.id,
                "label": n.label,
                "icon": n.icon,
                "iconName": icon_name(n.icon.as_deref()),
            })
        })
        .collect();
    let pages: Vec<serde_json::Value> = cfg
        .page_order()
        .into_iter()
        .filter_map(|id| cfg.pages.get(id).map(|p| json!({ "id": id, "title": p.title })))
        .collect();

    ok(
        &req.id,
        json!({
            "portal": portal_id,
            "portalTitle": cfg.portal_title,
            "navigation": navigation,
            "pages": pages,
            "defaultPage": pages.first().and_then(|p| p.get("id").cloned()),
        }),
    )
}

fn handle_portal_page(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, rules) = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (portal_id, cfg) = match portal(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let page_id = match str_param(req, "page") {
        Some(p) => p,
        None => match cfg.page_order().first() {
            Some(p) => *p,
            None => return err(&req.id, "not_found", "portal has no pages", None),
        },
    };
    let Some(page) = cfg.pages.get(page_id) else {
        return err(
            &req.id,
            "not_found",
            "page not found",
            Some(json!({ "portal": portal_id, "page": page_id })),
        );
    };

    match hydrate_page(page, rules, store, str_param(req, "search")) {
        Ok(sections) => ok(
            &req.id,
            json!({
                "portal": portal_id,
                "pageId": page_id,
                "title": page.title,
                "sections": sections,
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_portal_validate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(rules) = state.rules.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (portal_id, cfg) = match portal(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let issues = validate(cfg, rules);
    ok(
        &req.id,
        json!({ "portal": portal_id, "ok": issues.is_empty(), "issues": issues }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "portal.list" => Some(handle_portal_list(state, req)),
        "portal.open" => Some(handle_portal_open(state, req)),
        "portal.page" => Some(handle_portal_page(state, req)),
        "portal.validate" => Some(handle_portal_validate(state, req)),
        _ => None,
    }
}
