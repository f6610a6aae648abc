use crate::config::{self, ConfigSection, SecurityConfig};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::require_administrator;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for section in ConfigSection::ALL {
        match config::load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Err(resp) = require_administrator(conn, &state.session, req) {
        return resp;
    }
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = ConfigSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let updated = match config::update_section(conn, section, patch_obj) {
        Ok(Ok(v)) => v,
        Ok(Err(msg)) => return err(&req.id, "bad_params", msg, None),
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if section == ConfigSection::Security {
        let applied = SecurityConfig::load(conn)
            .and_then(|sec| db::set_store_timeout(conn, sec.store_timeout));
        if let Err(e) = applied {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    ok(&req.id, json!({ "section": section.name(), "value": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
