use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{param_opt_string, param_str, require_administrator};
use crate::ipc::types::{AppState, Request};
use crate::school::{self, SchoolError, SchoolInput};
use serde_json::json;
use tracing::info;

fn handle_school_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "school": null }));
    };
    match school::load(conn) {
        Ok(s) => ok(&req.id, json!({ "school": s })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_school_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let actor = match require_administrator(conn, &state.session, req) {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let input = SchoolInput {
        name: param_str(req, "name").unwrap_or_default().to_string(),
        address: param_str(req, "address").unwrap_or_default().to_string(),
        phone: param_opt_string(req, "phone"),
        email: param_opt_string(req, "email"),
        website: param_opt_string(req, "website"),
        description: param_opt_string(req, "description"),
    };
    match school::save(conn, input, actor.tenant_id.as_deref()) {
        Ok(s) => {
            info!(school_id = %s.id, "school profile saved");
            ok(&req.id, json!({ "school": s }))
        }
        Err(e @ SchoolError::MissingRequired) => {
            err(&req.id, "validation_failed", e.to_string(), None)
        }
        Err(SchoolError::Storage(e)) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "schools" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "school.get" => Some(handle_school_get(state, req)),
        "school.save" => Some(handle_school_save(state, req)),
        _ => None,
    }
}
