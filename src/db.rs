use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "portal.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("create workspace {}", workspace.display()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("open {}", db_path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    // Every portal table shares one physical table; rows are JSON documents
    // keyed by the store-assigned uid.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records(
            table_name TEXT NOT NULL,
            uid TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(table_name, uid)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_table ON records(table_name)",
        [],
    )?;

    Ok(())
}
