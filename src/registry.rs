//! Durable collection of provisioned accounts.
//!
//! The workflow and the login check talk to [`AccountRegistry`]; the SQLite
//! implementation is the only one the sidecar uses.

use crate::password;
use crate::role::Role;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, Row};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("username {username} already exists in this school")]
    UsernameTaken { username: String },
    #[error("stored account is malformed: {0}")]
    Corrupt(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

pub trait AccountRegistry {
    /// Adds a new record. Never overwrites an existing one.
    fn append(&self, account: &Account) -> Result<(), RegistryError>;

    /// First account, in creation order, whose username or email equals
    /// `identifier`, whose role equals `role` and whose hash verifies `password`.
    fn find_match(
        &self,
        identifier: &str,
        password: &str,
        role: Role,
    ) -> Result<Option<Account>, RegistryError>;

    fn list_all(&self) -> Result<Vec<Account>, RegistryError>;

    fn count_by_role(&self, role: Role) -> Result<usize, RegistryError>;
}

pub struct SqliteRegistry<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRegistry<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

const SELECT_COLUMNS: &str = "id, name, username, password_hash, role, tenant_id, class_name,
    subject, email, created_at, created_by";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Result<Account, RegistryError>> {
    let role_raw: String = row.get(4)?;
    let created_raw: String = row.get(9)?;
    let Some(role) = Role::parse(&role_raw) else {
        return Ok(Err(RegistryError::Corrupt(format!("unknown role {}", role_raw))));
    };
    let created_at = match DateTime::parse_from_rfc3339(&created_raw) {
        Ok(t) => t.with_timezone(&Utc),
        Err(e) => {
            return Ok(Err(RegistryError::Corrupt(format!(
                "bad createdAt {}: {}",
                created_raw, e
            ))))
        }
    };
    Ok(Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        role,
        tenant_id: row.get(5)?,
        class_name: row.get(6)?,
        subject: row.get(7)?,
        email: row.get(8)?,
        created_at,
        created_by: row.get(10)?,
    }))
}

impl SqliteRegistry<'_> {
    fn query_accounts(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Account>, RegistryError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }
}

impl AccountRegistry for SqliteRegistry<'_> {
    fn append(&self, account: &Account) -> Result<(), RegistryError> {
        let res = self.conn.execute(
            "INSERT INTO accounts(
               id, name, username, password_hash, role, tenant_id, class_name,
               subject, email, created_at, created_by
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                account.id,
                account.name,
                account.username,
                account.password_hash,
                account.role.as_str(),
                account.tenant_id,
                account.class_name,
                account.subject,
                account.email,
                account
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
                account.created_by,
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation
                    && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(RegistryError::UsernameTaken {
                    username: account.username.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn find_match(
        &self,
        identifier: &str,
        password: &str,
        role: Role,
    ) -> Result<Option<Account>, RegistryError> {
        let sql = format!(
            "SELECT {} FROM accounts
             WHERE (username = ?1 OR email = ?1) AND role = ?2
             ORDER BY rowid",
            SELECT_COLUMNS
        );
        let candidates = self.query_accounts(&sql, (identifier, role.as_str()))?;
        if candidates.is_empty() {
            password::verify_dummy(password);
            return Ok(None);
        }
        Ok(candidates
            .into_iter()
            .find(|a| password::verify_password(password, &a.password_hash)))
    }

    fn list_all(&self) -> Result<Vec<Account>, RegistryError> {
        let sql = format!("SELECT {} FROM accounts ORDER BY rowid", SELECT_COLUMNS);
        self.query_accounts(&sql, [])
    }

    fn count_by_role(&self, role: Role) -> Result<usize, RegistryError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE role = ?",
            [role.as_str()],
            |r| r.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}
