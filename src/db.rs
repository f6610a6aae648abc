use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "resultsd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    migrate(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    migrate(&conn)?;
    Ok(conn)
}

/// Lock waits longer than this fail the statement instead of blocking forever.
pub fn set_store_timeout(conn: &Connection, timeout: Duration) -> anyhow::Result<()> {
    conn.busy_timeout(timeout)?;
    Ok(())
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            address TEXT NOT NULL,
            phone TEXT,
            email TEXT,
            website TEXT,
            description TEXT,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            username TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL,
            tenant_id TEXT,
            class_name TEXT,
            subject TEXT,
            created_at TEXT NOT NULL,
            created_by TEXT NOT NULL
        )",
        [],
    )?;
    // Workspaces created before login-by-email have no email column.
    ensure_accounts_email(conn)?;

    // Usernames are unique per tenant; accounts without a tenant share one scope.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_tenant_username
         ON accounts(COALESCE(tenant_id, ''), username)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_accounts_username ON accounts(username)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_accounts_email ON accounts(email)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_accounts_role ON accounts(role)",
        [],
    )?;

    Ok(())
}

fn ensure_accounts_email(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "accounts", "email")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE accounts ADD COLUMN email TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("settings {} is not valid JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, raw),
    )?;
    Ok(())
}
