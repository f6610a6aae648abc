//! The school (tenant) profile for a workspace.

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: String,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct SchoolInput {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SchoolError {
    #[error("school name and address are required")]
    MissingRequired,
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

fn optional(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

const SCHOOL_ID_MAX_CHARS: usize = 10;

/// Tenant id for a school name: lowercased, whitespace runs become `_`,
/// cut to ten characters. "Hillside Secondary" gives `hillside_s`.
pub fn school_id_from_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(SCHOOL_ID_MAX_CHARS)
        .collect()
}

pub fn load(conn: &Connection) -> rusqlite::Result<Option<School>> {
    conn.query_row(
        "SELECT id, name, address, phone, email, website, description, updated_at
         FROM schools ORDER BY rowid LIMIT 1",
        [],
        |r| {
            Ok(School {
                id: r.get(0)?,
                name: r.get(1)?,
                address: r.get(2)?,
                phone: r.get(3)?,
                email: r.get(4)?,
                website: r.get(5)?,
                description: r.get(6)?,
                updated_at: r.get(7)?,
            })
        },
    )
    .optional()
}

/// Creates the workspace school, or updates it in place keeping its id.
///
/// A new school takes `tenant_id` when given (the administrator's school),
/// otherwise an id derived from its name. Renames never change the id.
pub fn save(
    conn: &Connection,
    input: SchoolInput,
    tenant_id: Option<&str>,
) -> Result<School, SchoolError> {
    let name = input.name.trim().to_string();
    let address = input.address.trim().to_string();
    if name.is_empty() || address.is_empty() {
        return Err(SchoolError::MissingRequired);
    }
    let school = School {
        id: match load(conn)? {
            Some(existing) => existing.id,
            None => tenant_id
                .map(str::to_string)
                .unwrap_or_else(|| school_id_from_name(&name)),
        },
        name,
        address,
        phone: optional(input.phone),
        email: optional(input.email),
        website: optional(input.website),
        description: optional(input.description),
        updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    conn.execute(
        "INSERT INTO schools(id, name, address, phone, email, website, description, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           address = excluded.address,
           phone = excluded.phone,
           email = excluded.email,
           website = excluded.website,
           description = excluded.description,
           updated_at = excluded.updated_at",
        rusqlite::params![
            school.id,
            school.name,
            school.address,
            school.phone,
            school.email,
            school.website,
            school.description,
            school.updated_at,
        ],
    )?;
    Ok(school)
}
