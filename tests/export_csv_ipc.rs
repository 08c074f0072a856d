mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, seed_workspace, spawn_sidecar};

#[test]
fn section_csv_writes_headers_quoted_cells_and_placeholders() {
    let workspace = seed_workspace("portald-export-section");
    let out = workspace.join("out").join("notices.csv");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "records.submit",
        json!({
            "formId": "addNoticeForm",
            "values": { "nTitle": "Sports day, rescheduled", "date": "2026-10-01" }
        }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "export.sectionCsv",
        json!({
            "portal": "teacher",
            "sectionId": "noticeTable",
            "outPath": out.to_string_lossy()
        }),
    );
    assert_eq!(exported["rowsExported"], 1);

    let text = std::fs::read_to_string(&out).expect("read csv");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Title,Audience,Date,Section");
    assert_eq!(lines[1], "\"Sports day, rescheduled\",-,2026-10-01,Notices");
    assert_eq!(lines.len(), 2);

    let missing = request(
        &mut stdin,
        &mut reader,
        "4",
        "export.sectionCsv",
        json!({
            "portal": "teacher",
            "sectionId": "gradebook",
            "outPath": out.to_string_lossy()
        }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));
}

#[test]
fn portal_csv_writes_one_file_per_section_plus_combined() {
    let workspace = seed_workspace("portald-export-portal");
    let out_dir = workspace.join("dashboard");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "records.submit",
        json!({ "formId": "addTeacherForm", "values": { "tName": "Ms. Noether", "tDept": "Maths" } }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "export.portalCsv",
        json!({ "portal": "admin", "outDir": out_dir.to_string_lossy() }),
    );
    let files = exported["files"].as_array().expect("files");
    assert_eq!(exported["sections"].as_u64(), Some(files.len() as u64 - 1));
    assert!(files
        .last()
        .and_then(|f| f.as_str())
        .map(|f| f.ends_with("full_dashboard_export.csv"))
        .unwrap_or(false));

    let stats = std::fs::read_to_string(out_dir.join("adminStats.csv")).expect("stats csv");
    let stat_lines: Vec<&str> = stats.lines().collect();
    assert_eq!(stat_lines[0], "Label,Value,Trend,Section");
    assert_eq!(stat_lines[2], "Teachers,1,stable,School Summary");

    let combined =
        std::fs::read_to_string(out_dir.join("full_dashboard_export.csv")).expect("combined csv");
    let header = combined.lines().next().expect("header");
    assert!(header.starts_with("Label,Value,Trend,Section"));
    assert!(combined.contains("Ms. Noether"));
}
