use crate::portal::{cell_text, HydratedSection};
use std::path::{Path, PathBuf};

pub const COMBINED_FILE_NAME: &str = "full_dashboard_export.csv";
const MISSING_CELL: &str = "-";
const SECTION_HEADER: &str = "Section";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    pub section_id: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_record(&mut out, &self.headers);
        for row in &self.rows {
            push_record(&mut out, row);
        }
        out
    }
}

fn push_record(out: &mut String, cells: &[String]) {
    let line: Vec<String> = cells.iter().map(|c| csv_quote(c)).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn or_missing(s: String) -> String {
    if s.is_empty() {
        MISSING_CELL.to_string()
    } else {
        s
    }
}

pub fn section_table(section: &HydratedSection) -> CsvTable {
    match section {
        HydratedSection::Table(t) => {
            let mut headers: Vec<String> = t.columns.iter().map(|c| c.header.clone()).collect();
            headers.push(SECTION_HEADER.to_string());
            let rows = t
                .rows
                .iter()
                .map(|row| {
                    let mut cells: Vec<String> = t
                        .columns
                        .iter()
                        .map(|c| or_missing(row.get(&c.key).map(cell_text).unwrap_or_default()))
                        .collect();
                    cells.push(t.title.clone());
                    cells
                })
                .collect();
            CsvTable {
                section_id: t.id.clone(),
                headers,
                rows,
            }
        }
        HydratedSection::Stats(s) => {
            let headers = ["Label", "Value", "Trend", SECTION_HEADER]
                .iter()
                .map(|h| h.to_string())
                .collect();
            let rows = s
                .data
                .iter()
                .map(|stat| {
                    vec![
                        or_missing(stat.label.clone()),
                        or_missing(cell_text(&stat.value)),
                        or_missing(stat.trend.clone().unwrap_or_default()),
                        s.title.clone(),
                    ]
                })
                .collect();
            CsvTable {
                section_id: s.id.clone(),
                headers,
                rows,
            }
        }
        HydratedSection::Form(f) => CsvTable {
            section_id: f.id.clone(),
            headers: vec![SECTION_HEADER.to_string()],
            rows: vec![vec![f.title.clone()]],
        },
    }
}

/// Union of all section tables; headers keep first-seen order and cells a
/// section does not have render as `-`.
pub fn combined_table(tables: &[CsvTable]) -> CsvTable {
    let mut headers: Vec<String> = Vec::new();
    for t in tables {
        for h in &t.headers {
            if !headers.contains(h) {
                headers.push(h.clone());
            }
        }
    }

    let mut rows = Vec::new();
    for t in tables {
        for row in &t.rows {
            let cells = headers
                .iter()
                .map(|h| {
                    t.headers
                        .iter()
                        .position(|x| x == h)
                        .and_then(|i| row.get(i).cloned())
                        .unwrap_or_else(|| MISSING_CELL.to_string())
                })
                .collect();
            rows.push(cells);
        }
    }

    CsvTable {
        section_id: "full_dashboard_export".to_string(),
        headers,
        rows,
    }
}

pub fn write_csv(path: &Path, table: &CsvTable) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, table.to_csv())
}

/// Writes one `<sectionId>.csv` per section plus the combined file.
/// Returns every path written, combined file last.
pub fn write_portal_export(out_dir: &Path, sections: &[HydratedSection]) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;
    let tables: Vec<CsvTable> = sections.iter().map(section_table).collect();

    let mut written = Vec::with_capacity(tables.len() + 1);
    for t in &tables {
        let p = out_dir.join(format!("{}.csv", t.section_id));
        write_csv(&p, t)?;
        written.push(p);
    }

    let combined = out_dir.join(COMBINED_FILE_NAME);
    write_csv(&combined, &combined_table(&tables))?;
    written.push(combined);
    Ok(written)
}
