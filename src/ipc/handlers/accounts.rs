use crate::config::ProvisioningConfig;
use crate::credentials::format_for_display;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{
    access_denied, param_opt_string, param_str, provisioner, require_administrator, AccessError,
    Provisioner,
};
use crate::ipc::types::{AppState, Request};
use crate::provisioning::{AccountProfile, ProvisionContext, ProvisionError, ValidationError};
use crate::registry::{AccountRegistry, SqliteRegistry};
use crate::role::{self, Role};
use crate::school;
use chrono::Utc;
use serde_json::json;
use tracing::warn;

/// `createdBy` for accounts made before any administrator exists.
const BOOTSTRAP_CREATOR: &str = "system";

const CREATION_FAILED: &str = "account creation failed; please try again";

fn parse_role(req: &Request) -> Result<Option<Role>, serde_json::Value> {
    match param_str(req, "role").map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => Role::parse(raw).map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("role must be one of: {}", role::allowed_values()),
                None,
            )
        }),
    }
}

/// Storage trouble anywhere in account creation, including a store lock held
/// past `storeTimeoutMs`, reaches the operator as one generic failure.
fn creation_failed(req: &Request, cause: &dyn std::fmt::Display) -> serde_json::Value {
    warn!(error = %cause, "account creation failed");
    err(&req.id, "creation_failed", CREATION_FAILED, None)
}

fn handle_accounts_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let access = match provisioner(conn, &state.session) {
        Ok(a) => a,
        Err(AccessError::Storage(e)) => return creation_failed(req, &e),
        Err(e) => return access_denied(req, e),
    };
    let role = match parse_role(req) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let actor = match access {
        Provisioner::Account(acct) => Some(acct),
        Provisioner::Bootstrap if role == Some(Role::Administrator) => None,
        Provisioner::Bootstrap => {
            return err(
                &req.id,
                "forbidden",
                "only the first administrator can be created before sign-in",
                None,
            )
        }
    };

    // An explicit tenant wins, then the school named at sign-up. Top-level
    // administrators otherwise have no school.
    let named_school = param_opt_string(req, "schoolName").map(|n| school::school_id_from_name(&n));
    let tenant_id = match param_opt_string(req, "tenantId").or(named_school) {
        Some(t) => Some(t),
        None if role == Some(Role::Administrator) => None,
        None => match actor.and_then(|a| a.tenant_id.clone()) {
            Some(t) => Some(t),
            None => match school::load(conn) {
                Ok(s) => s.map(|s| s.id),
                Err(e) => return creation_failed(req, &e),
            },
        },
    };
    let ctx = ProvisionContext {
        tenant_id,
        created_by: actor
            .map(|a| a.id.clone())
            .unwrap_or_else(|| BOOTSTRAP_CREATOR.to_string()),
        now: Utc::now(),
    };
    let config = match ProvisioningConfig::load(conn) {
        Ok(c) => c,
        Err(e) => return creation_failed(req, &e),
    };
    let profile = AccountProfile {
        name: param_str(req, "name").unwrap_or_default().to_string(),
        role,
        class_name: param_opt_string(req, "className"),
        subject: param_opt_string(req, "subject"),
        email: param_opt_string(req, "email"),
    };

    let registry = SqliteRegistry::new(conn);
    let mut rng = rand::thread_rng();
    match state
        .provisioning
        .submit(profile, &ctx, &config, &registry, &mut rng)
    {
        Ok(issued) => {
            let creds = &issued.credentials;
            ok(
                &req.id,
                json!({
                    "accountId": issued.account.id,
                    "account": issued.account,
                    "credentials": {
                        "username": creds.username,
                        "password": creds.password.as_str(),
                        "role": creds.role,
                        "tenantId": creds.tenant_id,
                    },
                    "display": format_for_display(creds),
                }),
            )
        }
        Err(ProvisionError::Validation(e)) => {
            let field = match &e {
                ValidationError::MissingName => "name",
                ValidationError::MissingRole => "role",
                ValidationError::MissingField { field, .. } => field.key(),
            };
            err(
                &req.id,
                "validation_failed",
                e.to_string(),
                Some(json!({ "field": field })),
            )
        }
        Err(e @ ProvisionError::CredentialsPending) => {
            err(&req.id, "credentials_pending", e.to_string(), None)
        }
        // The workflow already logged the cause.
        Err(ProvisionError::Creation(_)) => err(&req.id, "creation_failed", CREATION_FAILED, None),
    }
}

fn handle_accounts_acknowledge(state: &mut AppState, req: &Request) -> serde_json::Value {
    let discarded = state.provisioning.acknowledge();
    ok(&req.id, json!({ "discarded": discarded }))
}

/// Where the operator's form stands: the retained profile after a failure, and
/// whether credentials are still waiting to be acknowledged.
fn handle_accounts_workflow(state: &mut AppState, req: &Request) -> serde_json::Value {
    let wf = &state.provisioning;
    ok(
        &req.id,
        json!({
            "state": wf.state(),
            "draft": wf.draft(),
            "credentialsPending": wf.presented().is_some(),
        }),
    )
}

fn handle_accounts_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(resp) = require_administrator(conn, &state.session, req) {
        return resp;
    }
    let role = match parse_role(req) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match SqliteRegistry::new(conn).list_all() {
        Ok(all) => {
            let accounts: Vec<_> = all
                .into_iter()
                .filter(|a| role.map_or(true, |r| a.role == r))
                .collect();
            ok(&req.id, json!({ "accounts": accounts }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "accounts.create" => Some(handle_accounts_create(state, req)),
        "accounts.acknowledge" => Some(handle_accounts_acknowledge(state, req)),
        "accounts.list" => Some(handle_accounts_list(state, req)),
        "accounts.workflow" => Some(handle_accounts_workflow(state, req)),
        _ => None,
    }
}
