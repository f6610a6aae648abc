use crate::auth::{self, LoginCredentials, LoginError};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::param_str;
use crate::ipc::types::{AppState, Request};
use crate::registry::SqliteRegistry;
use crate::role::Role;
use serde_json::json;

const LOGIN_FAILED: &str = "invalid credentials";

fn handle_auth_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    // "email" and "username" are accepted as aliases of the identifier.
    let identifier = param_str(req, "identifier")
        .or_else(|| param_str(req, "username"))
        .or_else(|| param_str(req, "email"))
        .unwrap_or_default();
    let password = param_str(req, "password").unwrap_or_default();
    let Some(role) = param_str(req, "role").and_then(Role::parse) else {
        return err(&req.id, "bad_params", "role is required", None);
    };
    let creds = match LoginCredentials::try_from_parts(identifier, password, role) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    match auth::login(&SqliteRegistry::new(conn), &creds) {
        Ok(account) => {
            let result = json!({
                "account": account,
                "roleLabel": account.role.label(),
                "navigation": account.role.navigation(),
            });
            state.session.sign_in(account);
            ok(&req.id, result)
        }
        Err(LoginError::InvalidCredentials | LoginError::Registry(_)) => {
            err(&req.id, "login_failed", LOGIN_FAILED, None)
        }
    }
}

fn handle_auth_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let signed_out = state.session.sign_out();
    ok(&req.id, json!({ "signedOut": signed_out }))
}

fn handle_auth_session(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "account": state.session.current() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_auth_login(state, req)),
        "auth.logout" => Some(handle_auth_logout(state, req)),
        "auth.session" => Some(handle_auth_session(state, req)),
        _ => None,
    }
}
