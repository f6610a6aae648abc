use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use crate::role::NavItem;
use serde_json::json;

const SIGNED_OUT: &[NavItem] = &[NavItem {
    label: "Dashboard",
    href: "/dashboard",
}];

fn handle_nav_items(state: &mut AppState, req: &Request) -> serde_json::Value {
    let role = state.session.current().map(|a| a.role);
    let items = role.map_or(SIGNED_OUT, |r| r.navigation());
    ok(
        &req.id,
        json!({ "roleLabel": role.map(|r| r.label()), "items": items }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "nav.items" => Some(handle_nav_items(state, req)),
        _ => None,
    }
}
