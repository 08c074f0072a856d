use crate::export::{section_table, write_csv, write_portal_export};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{portal, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::portal::{hydrate_page, HydratedSection};
use serde_json::json;
use std::path::PathBuf;

fn handle_export_section_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, rules) = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (portal_id, cfg) = match portal(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let section_id = match required_str(req, "sectionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v.to_string(),
        Err(e) => return e,
    };

    let Some(page) = cfg
        .pages
        .values()
        .find(|p| p.sections.iter().any(|s| s.id() == section_id))
    else {
        return err(
            &req.id,
            "not_found",
            "section not found",
            Some(json!({ "portal": portal_id, "sectionId": section_id })),
        );
    };

    let sections = match hydrate_page(page, rules, store, None) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(section) = sections.iter().find(|s| s.id() == section_id) else {
        return err(&req.id, "not_found", "section not found", None);
    };

    let table = section_table(section);
    if let Err(e) = write_csv(&PathBuf::from(&out_path), &table) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        );
    }

    ok(
        &req.id,
        json!({ "ok": true, "rowsExported": table.rows.len(), "path": out_path }),
    )
}

fn handle_export_portal_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, rules) = match workspace(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (portal_id, cfg) = match portal(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_dir = match required_str(req, "outDir") {
        Ok(v) => v.to_string(),
        Err(e) => return e,
    };

    let mut sections: Vec<HydratedSection> = Vec::new();
    for page_id in cfg.page_order() {
        let Some(page) = cfg.pages.get(page_id) else {
            continue;
        };
        match hydrate_page(page, rules, store, None) {
            Ok(s) => sections.extend(s),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    match write_portal_export(&PathBuf::from(&out_dir), &sections) {
        Ok(files) => {
            tracing::info!(portal = %portal_id, files = files.len(), "portal exported");
            let files: Vec<String> = files
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect();
            ok(
                &req.id,
                json!({ "ok": true, "sections": sections.len(), "files": files }),
            )
        }
        Err(e) => err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_dir })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "export.sectionCsv" => Some(handle_export_section_csv(state, req)),
        "export.portalCsv" => Some(handle_export_portal_csv(state, req)),
        _ => None,
    }
}
