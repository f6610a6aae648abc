pub mod accounts;
pub mod auth;
pub mod core;
pub mod nav;
pub mod school;
pub mod setup;

use crate::auth::Session;
use crate::ipc::error::err;
use crate::ipc::types::Request;
use crate::registry::{Account, AccountRegistry, RegistryError, SqliteRegistry};
use crate::role::Role;
use rusqlite::Connection;
use serde_json::Value;

pub(crate) fn param_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

pub(crate) fn param_opt_string(req: &Request, key: &str) -> Option<String> {
    param_str(req, key)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum AccessError {
    #[error("sign in first")]
    SignInRequired,
    #[error("administrator role required")]
    NotProvisioner,
    #[error("create the first administrator first")]
    NoAdministrator,
    #[error(transparent)]
    Storage(#[from] RegistryError),
}

/// Who is allowed to provision right now.
pub(crate) enum Provisioner<'a> {
    /// No administrator exists yet; only the first one may be created.
    Bootstrap,
    Account(&'a Account),
}

pub(crate) fn provisioner<'a>(
    conn: &Connection,
    session: &'a Session,
) -> Result<Provisioner<'a>, AccessError> {
    if SqliteRegistry::new(conn).count_by_role(Role::Administrator)? == 0 {
        return Ok(Provisioner::Bootstrap);
    }
    match session.current() {
        Some(acct) if acct.role.profile().can_provision => Ok(Provisioner::Account(acct)),
        Some(_) => Err(AccessError::NotProvisioner),
        None => Err(AccessError::SignInRequired),
    }
}

pub(crate) fn access_denied(req: &Request, e: AccessError) -> Value {
    match e {
        AccessError::Storage(e) => err(&req.id, "db_query_failed", e.to_string(), None),
        other => err(&req.id, "forbidden", other.to_string(), None),
    }
}

/// Administrative methods other than creating the first administrator need
/// a signed-in account whose role may provision.
pub(crate) fn require_administrator<'a>(
    conn: &Connection,
    session: &'a Session,
    req: &Request,
) -> Result<&'a Account, Value> {
    match provisioner(conn, session) {
        Ok(Provisioner::Account(acct)) => Ok(acct),
        Ok(Provisioner::Bootstrap) => Err(access_denied(req, AccessError::NoAdministrator)),
        Err(e) => Err(access_denied(req, e)),
    }
}
